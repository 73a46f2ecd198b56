use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use pdmlink_frame::{
    Address, Command, ProtocolVersion, Register, RegisterSpec, RegisterValue, Request,
    BROADCAST_ADDRESS,
};
use tracing::{debug, warn};

use crate::error::{PdmError, Result};
use crate::limits;
use crate::link::{Link, LinkConfig, LinkState};
use crate::types::{ControlMode, CurrentSource, DelayLineType, Mode, SyncSource};

/// Handle on one module of a chain.
///
/// Getters always query the module. Setters only stage a value; nothing is
/// sent until [`apply`](Pdm::apply).
///
/// Dropping the handle switches the laser off whenever the link is still
/// connected, whatever state the module was last seen in. Failures at that
/// point are logged and otherwise ignored.
#[derive(Debug)]
pub struct Pdm {
    address: Address,
    link: Arc<Link>,
    version: ProtocolVersion,
    /// Values staged by the caller, in write order.
    pending: BTreeMap<Register, RegisterValue>,
    /// Last value read from or written to the module.
    confirmed: HashMap<Register, RegisterValue>,
    maximum_current: Option<f32>,
    /// Writes sent since the last apply-all command.
    unapplied: bool,
}

impl Pdm {
    /// Open a new link on `locator` with default settings.
    pub fn open(address: Address, locator: &str) -> Result<Self> {
        Self::with_link(
            address,
            Arc::new(Link::open(locator, LinkConfig::default())),
        )
    }

    /// Attach to an existing link, connecting it if needed.
    pub fn with_link(address: Address, link: Arc<Link>) -> Result<Self> {
        let version = link.connect(address)?;
        debug!(address, %version, locator = link.locator(), "session opened");
        Ok(Self {
            address,
            link,
            version,
            pending: BTreeMap::new(),
            confirmed: HashMap::new(),
            maximum_current: None,
            unapplied: false,
        })
    }

    /// Another module on the same chain as `other`.
    pub fn chained(address: Address, other: &Pdm) -> Result<Self> {
        Self::with_link(address, Arc::clone(&other.link))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Protocol version negotiated by the link.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn link(&self) -> &Arc<Link> {
        &self.link
    }

    /// Registers that exist at the negotiated version.
    pub fn registers(&self) -> impl Iterator<Item = Register> + '_ {
        Register::ALL
            .into_iter()
            .filter(move |register| register.spec(self.version).is_some())
    }

    fn spec(&self, register: Register) -> Result<&'static RegisterSpec> {
        register.spec(self.version).ok_or_else(|| {
            let needs = register
                .introduced_in()
                .map(|version| format!(", needs {version}"))
                .unwrap_or_default();
            PdmError::Protocol(format!(
                "{register} not available in protocol {}{needs}",
                self.version
            ))
        })
    }

    fn command(&self, address: Address, command: Command) -> Result<Bytes> {
        let response = self.link.exchange(&Request::command(address, command))?;
        Ok(response.payload)
    }

    /// Query the module's protocol version directly.
    pub fn read_protocol_version(&self) -> Result<ProtocolVersion> {
        let payload = self.command(self.address, Command::ReadProtocolVersion)?;
        Ok(ProtocolVersion::from_payload(&payload)?)
    }

    /// Ask the chain which address answers the broadcast address.
    pub fn read_address(&self) -> Result<Address> {
        let payload = self.command(BROADCAST_ADDRESS, Command::ReadAddress)?;
        match payload.as_ref() {
            [address] => Ok(*address),
            other => Err(PdmError::Protocol(format!(
                "address reply must be 1 byte, got {}",
                other.len()
            ))),
        }
    }

    /// Pulsed or continuous operation, as reported by the module.
    pub fn mode(&self) -> Result<Mode> {
        let payload = self.command(self.address, Command::ReadCwPulse)?;
        match payload.as_ref() {
            [code] => Mode::from_code(*code)
                .ok_or_else(|| PdmError::Protocol(format!("unknown mode {code}"))),
            other => Err(PdmError::Protocol(format!(
                "mode reply must be 1 byte, got {}",
                other.len()
            ))),
        }
    }

    /// Read a register from the module.
    pub fn read_register(&mut self, register: Register) -> Result<RegisterValue> {
        let spec = self.spec(register)?;
        let response = self.link.exchange(&Request::read(self.address, spec))?;
        let value = RegisterValue::decode(spec.kind, &response.payload)
            .map_err(|err| PdmError::Protocol(format!("{register}: {err}")))?;
        limits::check_read(register, value)?;

        self.confirmed.insert(register, value);
        Ok(value)
    }

    /// Stage a raw register value for the next [`apply`](Pdm::apply).
    pub fn stage(&mut self, register: Register, value: RegisterValue) -> Result<()> {
        let spec = self.spec(register)?;
        if !spec.is_writable() {
            return Err(PdmError::invalid(register, "register is read-only"));
        }
        if value.kind() != spec.kind {
            return Err(PdmError::invalid(
                register,
                format!("expected a {} value, got {}", spec.kind, value.kind()),
            ));
        }
        limits::check_write(register, value)?;

        self.pending.insert(register, value);
        Ok(())
    }

    /// Staged values, in the order `apply` writes them.
    pub fn pending(&self) -> impl Iterator<Item = (Register, RegisterValue)> + '_ {
        self.pending.iter().map(|(register, value)| (*register, *value))
    }

    pub fn discard_pending(&mut self) {
        self.pending.clear();
    }

    /// Write every staged value the module doesn't already hold, then make
    /// the changes effective.
    ///
    /// Registers go out in [`Register`] declaration order. The first failing
    /// write stops the sequence: registers written before it stay written,
    /// it and everything after it stay pending. Returns the number of
    /// registers written.
    pub fn apply(&mut self) -> Result<usize> {
        let staged: Vec<(Register, RegisterValue)> = self.pending().collect();
        let mut written = 0;

        for (register, value) in staged {
            if self.confirmed.get(&register) == Some(&value) {
                self.pending.remove(&register);
                continue;
            }

            let request = Request::write(self.address, self.spec(register)?, value)?;
            if let Err(err) = self.link.exchange(&request) {
                // The module may or may not hold the new value now.
                self.confirmed.remove(&register);
                return Err(err);
            }
            debug!(address = self.address, %register, %value, "register written");
            self.confirmed.insert(register, value);
            self.pending.remove(&register);
            self.unapplied = true;
            written += 1;
        }

        if self.unapplied {
            self.command(self.address, Command::ApplyAllInstructions)?;
            self.unapplied = false;
        }
        Ok(written)
    }

    /// Switch the laser off right away, bypassing the pending values.
    pub fn deactivate(&mut self) -> Result<()> {
        self.pending.remove(&Register::LaserActivation);
        self.link.deactivate(self.address)?;
        self.confirmed
            .insert(Register::LaserActivation, RegisterValue::U8(0));
        self.unapplied = false;
        Ok(())
    }

    fn read_u8(&mut self, register: Register) -> Result<u8> {
        let value = self.read_register(register)?;
        value.as_u8().ok_or_else(|| kind_mismatch(register, value))
    }

    fn read_u32(&mut self, register: Register) -> Result<u32> {
        let value = self.read_register(register)?;
        value.as_u32().ok_or_else(|| kind_mismatch(register, value))
    }

    fn read_f32(&mut self, register: Register) -> Result<f32> {
        let value = self.read_register(register)?;
        value.as_f32().ok_or_else(|| kind_mismatch(register, value))
    }

    fn read_enum<T>(&mut self, register: Register, from_code: fn(u8) -> Option<T>) -> Result<T> {
        let code = self.read_u8(register)?;
        from_code(code)
            .ok_or_else(|| PdmError::Protocol(format!("module reported {code} for {register}")))
    }

    pub fn sync_source(&mut self) -> Result<SyncSource> {
        self.read_enum(Register::SyncSource, SyncSource::from_code)
    }

    pub fn set_sync_source(&mut self, source: SyncSource) -> Result<()> {
        self.stage(Register::SyncSource, RegisterValue::U8(source.code()))
    }

    pub fn delay_line_type(&mut self) -> Result<DelayLineType> {
        self.read_enum(Register::DelayLineType, DelayLineType::from_code)
    }

    pub fn set_delay_line_type(&mut self, kind: DelayLineType) -> Result<()> {
        self.stage(Register::DelayLineType, RegisterValue::U8(kind.code()))
    }

    /// Pulse frequency in Hz.
    pub fn frequency(&mut self) -> Result<u32> {
        self.read_u32(Register::Frequency)
    }

    /// Pulse width in picoseconds.
    pub fn pulse_width(&mut self) -> Result<u32> {
        self.read_u32(Register::PulseWidth)
    }

    pub fn set_pulse_width(&mut self, ps: u32) -> Result<()> {
        self.stage(Register::PulseWidth, RegisterValue::U32(ps))
    }

    /// Delay in picoseconds.
    pub fn delay(&mut self) -> Result<u32> {
        self.read_u32(Register::Delay)
    }

    pub fn set_delay(&mut self, ps: u32) -> Result<()> {
        self.stage(Register::Delay, RegisterValue::U32(ps))
    }

    /// Offset current in mA.
    pub fn offset_current(&mut self) -> Result<f32> {
        self.read_f32(Register::OffsetCurrent)
    }

    pub fn set_offset_current(&mut self, ma: f32) -> Result<()> {
        self.stage(Register::OffsetCurrent, RegisterValue::F32(ma))
    }

    /// Pulse current as a percentage of [`maximum_current`](Pdm::maximum_current).
    pub fn current_percentage(&mut self) -> Result<f32> {
        self.read_f32(Register::Current)
    }

    pub fn set_current_percentage(&mut self, percent: f32) -> Result<()> {
        self.stage(Register::Current, RegisterValue::F32(percent))
    }

    /// Pulse current in mA.
    pub fn current(&mut self) -> Result<f32> {
        let percent = self.current_percentage()?;
        Ok(percent * self.maximum_current()? / 100.0)
    }

    /// Stage the pulse current in mA. Reads the maximum current once if it
    /// isn't cached yet.
    pub fn set_current(&mut self, ma: f32) -> Result<()> {
        if ma.is_nan() || ma < 0.0 {
            return Err(PdmError::invalid(
                Register::Current,
                format!("{ma} mA is not a valid current"),
            ));
        }
        let maximum = self.maximum_current()?;
        if ma > maximum {
            return Err(PdmError::invalid(
                Register::Current,
                format!("{ma} mA exceeds the diode maximum of {maximum} mA"),
            ));
        }
        let percent = if maximum > 0.0 {
            ma / maximum * 100.0
        } else {
            0.0
        };
        self.set_current_percentage(percent)
    }

    /// Driver temperature in °C.
    pub fn temperature(&mut self) -> Result<f32> {
        self.read_f32(Register::Temperature)
    }

    /// Highest diode current in mA. Read once, then cached.
    pub fn maximum_current(&mut self) -> Result<f32> {
        if let Some(maximum) = self.maximum_current {
            return Ok(maximum);
        }
        let maximum = self.read_f32(Register::MaximumCurrent)?;
        self.maximum_current = Some(maximum);
        Ok(maximum)
    }

    pub fn current_source(&mut self) -> Result<CurrentSource> {
        self.read_enum(Register::CurrentSource, CurrentSource::from_code)
    }

    pub fn set_current_source(&mut self, source: CurrentSource) -> Result<()> {
        self.stage(Register::CurrentSource, RegisterValue::U8(source.code()))
    }

    /// True when the interlock is closed.
    pub fn interlock_status(&mut self) -> Result<bool> {
        Ok(self.read_u8(Register::InterlockStatus)? == 1)
    }

    /// True when laser output is enabled.
    pub fn activation(&mut self) -> Result<bool> {
        Ok(self.read_u8(Register::LaserActivation)? == 1)
    }

    pub fn set_activation(&mut self, on: bool) -> Result<()> {
        self.stage(Register::LaserActivation, RegisterValue::U8(u8::from(on)))
    }

    /// Operating mode used under software control (protocol 3.7).
    pub fn software_control_mode(&mut self) -> Result<Mode> {
        self.read_enum(Register::SoftwareControlMode, Mode::from_code)
    }

    pub fn set_software_control_mode(&mut self, mode: Mode) -> Result<()> {
        self.stage(Register::SoftwareControlMode, RegisterValue::U8(mode.code()))
    }

    /// Whether the hardware selector or software picks the mode (protocol 3.7).
    pub fn control_mode_selection(&mut self) -> Result<ControlMode> {
        self.read_enum(Register::ControlModeSelection, ControlMode::from_code)
    }

    pub fn set_control_mode_selection(&mut self, mode: ControlMode) -> Result<()> {
        self.stage(Register::ControlModeSelection, RegisterValue::U8(mode.code()))
    }
}

fn kind_mismatch(register: Register, value: RegisterValue) -> PdmError {
    PdmError::Protocol(format!(
        "{register} decoded as {}, not its table type",
        value.kind()
    ))
}

impl Drop for Pdm {
    fn drop(&mut self) {
        // Never open a transport just to tear down.
        if !matches!(self.link.state(), LinkState::Ready(_)) {
            return;
        }
        if let Err(err) = self.link.deactivate(self.address) {
            warn!(address = self.address, error = %err, "failed to deactivate laser");
        }
    }
}

#[cfg(test)]
mod tests {
    use pdmlink_frame::{FrameFormat, Status};

    use super::*;
    use crate::testing::{FakeChain, Reply};

    fn session(chain: &FakeChain, address: Address) -> Pdm {
        let pdm = Pdm::with_link(address, chain.link()).unwrap();
        chain.clear_log();
        pdm
    }

    fn write_data(register: Register, value: RegisterValue) -> Vec<u8> {
        let code = register.spec(ProtocolVersion::V3_7).unwrap().code;
        let mut data = code.to_be_bytes().to_vec();
        value.put(&mut data);
        data
    }

    #[test]
    fn offset_current_write_is_one_frame_and_no_reads() {
        let chain = FakeChain::standard();
        let mut pdm = session(&chain, 1);

        pdm.set_offset_current(30.0).unwrap();
        assert!(chain.frames().is_empty(), "setters never touch the wire");
        assert_eq!(pdm.apply().unwrap(), 1);

        let requests = chain.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].address, 1);
        assert_eq!(requests[0].command, Command::WriteInstruction);
        let mut expected = vec![0x00, 0x0F];
        expected.extend_from_slice(&30.0f32.to_be_bytes());
        assert_eq!(requests[0].data.as_ref(), expected.as_slice());
        assert_eq!(requests[1].command, Command::ApplyAllInstructions);
        assert!(requests
            .iter()
            .all(|request| request.command != Command::ReadInstruction));
        assert_eq!(pdm.pending().count(), 0);
    }

    #[test]
    fn construction_negotiates_and_chained_sessions_share_the_link() {
        let chain = FakeChain::new(FrameFormat::STANDARD, ProtocolVersion::V3_7);
        let first = Pdm::with_link(1, chain.link()).unwrap();
        assert_eq!(first.version(), ProtocolVersion::V3_7);
        assert_eq!(chain.requests()[0].command, Command::ReadProtocolVersion);

        let second = Pdm::chained(2, &first).unwrap();
        assert!(Arc::ptr_eq(first.link(), second.link()));
        assert_eq!(second.version(), ProtocolVersion::V3_7);
        assert_eq!(chain.connects(), 1);
        assert_eq!(chain.requests().len(), 1, "no second identify");
    }

    #[test]
    fn open_reports_missing_device() {
        let err = Pdm::open(1, "/dev/pdmlink-does-not-exist").unwrap_err();
        assert!(matches!(err, PdmError::ConnectionFailure { .. }), "{err}");
    }

    #[test]
    fn reads_always_hit_the_module() {
        let chain = FakeChain::standard();
        chain.set(1, Register::PulseWidth, RegisterValue::U32(2_000));
        let mut pdm = session(&chain, 1);

        assert_eq!(pdm.pulse_width().unwrap(), 2_000);
        chain.set(1, Register::PulseWidth, RegisterValue::U32(3_000));
        assert_eq!(pdm.pulse_width().unwrap(), 3_000);
        assert_eq!(chain.requests().len(), 2);

        // A staged value is not what the module holds.
        pdm.set_pulse_width(5_000).unwrap();
        assert_eq!(pdm.pulse_width().unwrap(), 3_000);
    }

    #[test]
    fn partial_apply_stops_at_first_failure() {
        let chain = FakeChain::standard();
        let mut pdm = session(&chain, 1);

        pdm.set_sync_source(SyncSource::Internal).unwrap();
        pdm.set_pulse_width(10_000).unwrap();
        pdm.set_current_percentage(40.0).unwrap();

        chain.script([Reply::Emulate, Reply::Status(Status::QUERY_ERROR)]);
        let err = pdm.apply().unwrap_err();
        assert_eq!(
            err,
            PdmError::Status {
                address: 1,
                status: Status::QUERY_ERROR
            }
        );

        let requests = chain.requests();
        assert_eq!(requests.len(), 2, "current never sent, no apply-all");
        assert_eq!(
            requests[0].data.as_ref(),
            write_data(Register::SyncSource, RegisterValue::U8(2)).as_slice()
        );
        assert_eq!(requests[1].register_code(), Some(13));

        let pending: Vec<Register> = pdm.pending().map(|(register, _)| register).collect();
        assert_eq!(pending, vec![Register::PulseWidth, Register::Current]);

        // Retrying finishes the job and applies everything, sync source too.
        chain.clear_log();
        assert_eq!(pdm.apply().unwrap(), 2);
        let commands: Vec<Command> = chain.requests().iter().map(|r| r.command).collect();
        assert_eq!(
            commands,
            vec![
                Command::WriteInstruction,
                Command::WriteInstruction,
                Command::ApplyAllInstructions
            ]
        );
    }

    #[test]
    fn apply_writes_in_register_order() {
        let chain = FakeChain::standard();
        let mut pdm = session(&chain, 1);

        pdm.set_activation(true).unwrap();
        pdm.set_current_percentage(10.0).unwrap();
        pdm.set_current_source(CurrentSource::Numeric).unwrap();
        pdm.apply().unwrap();

        let codes: Vec<Option<u16>> = chain
            .requests()
            .iter()
            .map(Request::register_code)
            .collect();
        assert_eq!(codes, vec![Some(21), Some(16), Some(27), None]);
        assert!(pdm.link().is_activated(1));
    }

    #[test]
    fn apply_skips_values_the_module_already_holds() {
        let chain = FakeChain::standard();
        chain.set(1, Register::Delay, RegisterValue::U32(1_000));
        let mut pdm = session(&chain, 1);

        pdm.delay().unwrap();
        chain.clear_log();
        pdm.set_delay(1_000).unwrap();
        assert_eq!(pdm.apply().unwrap(), 0);
        assert!(chain.frames().is_empty());
        assert_eq!(pdm.pending().count(), 0);
    }

    #[test]
    fn version_gated_registers_are_rejected_locally() {
        let chain = FakeChain::new(FrameFormat::STANDARD, ProtocolVersion::new(3, 6));
        let mut pdm = session(&chain, 1);

        assert!(matches!(
            pdm.software_control_mode(),
            Err(PdmError::Protocol(_))
        ));
        assert!(matches!(
            pdm.set_control_mode_selection(ControlMode::Software),
            Err(PdmError::Protocol(_))
        ));
        assert!(!pdm.registers().any(|r| r == Register::SoftwareControlMode));
        assert!(chain.frames().is_empty());
    }

    #[test]
    fn control_mode_registers_on_3_7() {
        let chain = FakeChain::new(FrameFormat::STANDARD, ProtocolVersion::V3_7);
        chain.set(1, Register::SoftwareControlMode, RegisterValue::U8(1));
        chain.set(1, Register::ControlModeSelection, RegisterValue::U8(1));
        let mut pdm = session(&chain, 1);

        assert_eq!(pdm.software_control_mode().unwrap(), Mode::Continuous);
        assert_eq!(pdm.control_mode_selection().unwrap(), ControlMode::Software);

        pdm.set_control_mode_selection(ControlMode::Hardware).unwrap();
        pdm.apply().unwrap();
        let write = &chain.requests()[2];
        assert_eq!(write.command, Command::WriteInstruction);
        assert_eq!(write.data.as_ref(), &[0x00, 32, 0]);
        assert_eq!(
            chain.register(1, Register::ControlModeSelection),
            Some(vec![0])
        );
    }

    #[test]
    fn read_address_goes_to_broadcast() {
        let chain = FakeChain::standard();
        let pdm = session(&chain, 1);

        assert_eq!(pdm.read_address().unwrap(), 1);
        let request = &chain.requests()[0];
        assert_eq!(request.address, BROADCAST_ADDRESS);
        assert_eq!(request.command, Command::ReadAddress);
    }

    #[test]
    fn read_protocol_version_and_mode() {
        let chain = FakeChain::new(FrameFormat::STANDARD, ProtocolVersion::new(3, 5));
        chain.set_mode(1);
        let pdm = session(&chain, 4);

        assert_eq!(pdm.read_protocol_version().unwrap(), ProtocolVersion::new(3, 5));
        assert_eq!(pdm.mode().unwrap(), Mode::Continuous);

        chain.set_mode(9);
        assert!(matches!(pdm.mode(), Err(PdmError::Protocol(_))));
    }

    #[test]
    fn setters_check_ranges() {
        let chain = FakeChain::standard();
        let mut pdm = session(&chain, 1);

        for result in [
            pdm.set_offset_current(150.5),
            pdm.set_offset_current(f32::NAN),
            pdm.set_current_percentage(-1.0),
            pdm.set_pulse_width(limits::MAX_PULSE_WIDTH + 1),
            pdm.set_delay(limits::MAX_DELAY + 1),
            pdm.stage(Register::Temperature, RegisterValue::F32(1.0)),
            pdm.stage(Register::Delay, RegisterValue::U8(1)),
        ] {
            assert!(
                matches!(result, Err(PdmError::InvalidValue { .. })),
                "{result:?}"
            );
        }
        assert_eq!(pdm.pending().count(), 0);

        pdm.set_offset_current(150.0).unwrap();
        pdm.set_delay(limits::MAX_DELAY).unwrap();
        assert_eq!(pdm.pending().count(), 2);
        pdm.discard_pending();
        assert_eq!(pdm.pending().count(), 0);
    }

    #[test]
    fn implausible_reads_are_protocol_errors() {
        let chain = FakeChain::standard();
        chain.set(1, Register::OffsetCurrent, RegisterValue::F32(-3.0));
        chain.set(1, Register::InterlockStatus, RegisterValue::U8(2));
        chain.set(1, Register::SyncSource, RegisterValue::U8(7));
        chain.set(1, Register::Current, RegisterValue::F32(120.0));
        let mut pdm = session(&chain, 1);

        assert!(matches!(pdm.offset_current(), Err(PdmError::Protocol(_))));
        assert!(matches!(pdm.interlock_status(), Err(PdmError::Protocol(_))));
        assert!(matches!(pdm.sync_source(), Err(PdmError::Protocol(_))));
        assert!(matches!(pdm.current_percentage(), Err(PdmError::Protocol(_))));
    }

    #[test]
    fn wrong_payload_width_is_a_protocol_error() {
        let chain = FakeChain::standard();
        chain.set(1, Register::Frequency, RegisterValue::U8(1));
        let mut pdm = session(&chain, 1);
        assert!(matches!(pdm.frequency(), Err(PdmError::Protocol(_))));
    }

    #[test]
    fn current_in_milliamps_uses_cached_maximum() {
        let chain = FakeChain::standard();
        chain.set(1, Register::MaximumCurrent, RegisterValue::F32(200.0));
        chain.set(1, Register::Current, RegisterValue::F32(25.0));
        let mut pdm = session(&chain, 1);

        assert_eq!(pdm.current().unwrap(), 50.0);
        pdm.set_current(100.0).unwrap();
        pdm.set_current(80.0).unwrap();
        let reads_of_maximum = chain
            .requests()
            .iter()
            .filter(|request| request.register_code() == Some(20))
            .count();
        assert_eq!(reads_of_maximum, 1);
        assert_eq!(
            pdm.pending().collect::<Vec<_>>(),
            vec![(Register::Current, RegisterValue::F32(40.0))]
        );

        assert!(matches!(
            pdm.set_current(250.0),
            Err(PdmError::InvalidValue { .. })
        ));
        assert!(matches!(
            pdm.set_current(-1.0),
            Err(PdmError::InvalidValue { .. })
        ));
    }

    #[test]
    fn drop_switches_off_an_active_laser() {
        let chain = FakeChain::standard();
        let mut pdm = session(&chain, 1);
        pdm.set_activation(true).unwrap();
        pdm.apply().unwrap();
        chain.clear_log();

        drop(pdm);
        let requests = chain.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0].data.as_ref(),
            write_data(Register::LaserActivation, RegisterValue::U8(0)).as_slice()
        );
        assert_eq!(requests[1].command, Command::ApplyAllInstructions);
    }

    #[test]
    fn drop_switches_off_a_laser_it_never_saw_turned_on() {
        let chain = FakeChain::standard();
        chain.set(1, Register::LaserActivation, RegisterValue::U8(1));
        let pdm = session(&chain, 1);
        assert!(!pdm.link().is_activated(1));

        drop(pdm);
        let requests = chain.requests();
        assert_eq!(requests.len(), 2, "laser left on after drop");
        assert_eq!(
            requests[0].data.as_ref(),
            write_data(Register::LaserActivation, RegisterValue::U8(0)).as_slice()
        );
        assert_eq!(requests[1].command, Command::ApplyAllInstructions);
        assert_eq!(chain.register(1, Register::LaserActivation), Some(vec![0]));
    }

    #[test]
    fn drop_after_link_close_sends_nothing() {
        let chain = FakeChain::standard();
        let pdm = session(&chain, 1);
        pdm.link().close().unwrap();
        assert_eq!(pdm.link().state(), LinkState::Closed);

        drop(pdm);
        assert!(chain.frames().is_empty());
    }

    #[test]
    fn drop_swallows_deactivation_failures() {
        let chain = FakeChain::standard();
        let mut pdm = session(&chain, 1);
        pdm.set_activation(true).unwrap();
        pdm.apply().unwrap();

        chain.script([Reply::Status(Status::TIMEOUT)]);
        drop(pdm);
    }

    #[test]
    fn deactivate_cancels_staged_activation() {
        let chain = FakeChain::standard();
        let mut pdm = session(&chain, 1);
        pdm.set_activation(true).unwrap();

        pdm.deactivate().unwrap();
        assert_eq!(pdm.pending().count(), 0);
        assert_eq!(chain.requests().len(), 2);
        assert_eq!(
            chain.register(1, Register::LaserActivation),
            Some(vec![0])
        );
    }
}
