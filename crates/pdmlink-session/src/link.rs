//! The shared connection to a chain of modules.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use pdmlink_frame::{
    Address, Command, FrameFormat, ProtocolVersion, Register, RegisterValue, Request, Response,
    VersionRange,
};
use pdmlink_transport::{Connector, SerialConnector, SerialSettings};
use tracing::{debug, info, warn};

use crate::error::{PdmError, Result};
use crate::handshake;
use crate::wire::Wire;

/// Default per-attempt read timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Default number of extra attempts after a corrupted or missing response.
pub const DEFAULT_RETRIES: u32 = 2;

/// Connection-level settings, fixed for a link's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// How long one attempt waits for a complete response.
    pub timeout: Duration,
    /// Extra attempts after a checksum error or timeout.
    pub retries: u32,
    /// Protocol versions accepted at connect time.
    pub versions: VersionRange,
    pub format: FrameFormat,
    /// Where the identify request goes. `None` uses the address of the
    /// exchange that triggered the connection.
    pub identify_address: Option<Address>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            versions: VersionRange::default(),
            format: FrameFormat::STANDARD,
            identify_address: None,
        }
    }
}

impl LinkConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_versions(mut self, versions: VersionRange) -> Self {
        self.versions = versions;
        self
    }

    pub fn with_format(mut self, format: FrameFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_identify_address(mut self, address: Address) -> Self {
        self.identify_address = Some(address);
        self
    }
}

/// Where a link stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    /// No transport open yet, or the last connection attempt did not get
    /// far enough to rule the chain out.
    Unconnected,
    /// Transport open and the version negotiated.
    Ready(ProtocolVersion),
    /// Unusable until recreated.
    Failed(String),
    Closed,
}

struct Inner {
    state: LinkState,
    wire: Option<Wire>,
    /// Addresses whose laser output was last seen switched on.
    activated: BTreeSet<Address>,
}

/// One physical connection shared by every module on a chain.
///
/// The transport opens on first use, followed by version negotiation. All
/// exchanges are serialized: a request and its response (including retries)
/// complete before the next request reaches the wire.
///
/// Share a link between [`Pdm`](crate::Pdm) handles through an `Arc`.
/// Closing it, explicitly or by dropping the last reference, switches off any
/// laser the link knows to be on before the transport is released.
pub struct Link {
    connector: Box<dyn Connector>,
    config: LinkConfig,
    inner: Mutex<Inner>,
}

impl Link {
    /// Create an unconnected link. No I/O happens until the first exchange.
    pub fn new(connector: impl Connector + 'static, config: LinkConfig) -> Self {
        Self {
            connector: Box::new(connector),
            config,
            inner: Mutex::new(Inner {
                state: LinkState::Unconnected,
                wire: None,
                activated: BTreeSet::new(),
            }),
        }
    }

    /// Create an unconnected link to a serial device at the default baud
    /// rate.
    pub fn open(locator: &str, config: LinkConfig) -> Self {
        let settings = SerialSettings {
            timeout: config.timeout,
            ..SerialSettings::default()
        };
        Self::new(SerialConnector::with_settings(locator, settings), config)
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn locator(&self) -> &str {
        self.connector.locator()
    }

    pub fn state(&self) -> LinkState {
        match self.lock() {
            Ok(inner) => inner.state.clone(),
            Err(err) => LinkState::Failed(err.to_string()),
        }
    }

    /// The negotiated version, once connected.
    pub fn version(&self) -> Option<ProtocolVersion> {
        match self.state() {
            LinkState::Ready(version) => Some(version),
            _ => None,
        }
    }

    /// Connect if needed and return the negotiated version.
    ///
    /// `address` receives the identify request unless the configuration names
    /// another one.
    pub fn connect(&self, address: Address) -> Result<ProtocolVersion> {
        let mut inner = self.lock()?;
        self.ensure_ready(&mut inner, address)
    }

    /// Send one request and wait for its OK response.
    pub fn exchange(&self, request: &Request) -> Result<Response> {
        let mut inner = self.lock()?;
        self.exchange_locked(&mut inner, request)
    }

    /// True when the last activation write or read for `address` was "on".
    pub fn is_activated(&self, address: Address) -> bool {
        self.lock()
            .map(|inner| inner.activated.contains(&address))
            .unwrap_or(false)
    }

    /// Addresses currently believed to have their laser on.
    pub fn activated(&self) -> Vec<Address> {
        self.lock()
            .map(|inner| inner.activated.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Switch off laser output on `address` and apply immediately.
    pub fn deactivate(&self, address: Address) -> Result<()> {
        let mut inner = self.lock()?;
        self.deactivate_locked(&mut inner, address)
    }

    /// Deactivate every known-activated address, then release the transport.
    ///
    /// Every step runs even if an earlier one fails; the first error is
    /// returned. The link is closed afterwards either way.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.lock()?;
        self.shutdown(&mut inner)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| PdmError::connection("link lock poisoned"))
    }

    fn ensure_ready(&self, inner: &mut Inner, address: Address) -> Result<ProtocolVersion> {
        match &inner.state {
            LinkState::Ready(version) => return Ok(*version),
            LinkState::Failed(reason) => {
                return Err(PdmError::connection(format!(
                    "link to {} failed: {reason}",
                    self.locator()
                )))
            }
            LinkState::Closed => {
                return Err(PdmError::connection(format!(
                    "link to {} is closed",
                    self.locator()
                )))
            }
            LinkState::Unconnected => {}
        }

        let transport = self.connector.connect().map_err(|err| {
            PdmError::connection(format!("cannot open {}: {err}", self.locator()))
        })?;
        info!(
            locator = self.locator(),
            transport = transport.transport_name(),
            "transport opened"
        );

        let mut wire = Wire::new(
            transport,
            self.config.format,
            self.config.timeout,
            self.config.retries,
        );
        let target = self.config.identify_address.unwrap_or(address);
        match handshake::negotiate(&mut wire, target, &self.config.versions) {
            Ok(version) => {
                inner.wire = Some(wire);
                inner.state = LinkState::Ready(version);
                Ok(version)
            }
            Err(err) => {
                if let Err(close_err) = wire.close() {
                    debug!(error = %close_err, "transport close failed");
                }
                // A wrong version or a garbled identify won't fix itself;
                // transient faults leave the door open for another attempt.
                if matches!(
                    err,
                    PdmError::ProtocolVersionNotSupported { .. } | PdmError::Protocol(_)
                ) {
                    inner.state = LinkState::Failed(err.to_string());
                }
                warn!(locator = self.locator(), error = %err, "connection failed");
                Err(err)
            }
        }
    }

    fn exchange_locked(&self, inner: &mut Inner, request: &Request) -> Result<Response> {
        let version = self.ensure_ready(inner, request.address)?;
        let Some(wire) = inner.wire.as_mut() else {
            return Err(PdmError::connection("link has no transport"));
        };

        match wire.exchange(request) {
            Ok(response) => {
                track_activation(inner, version, request, &response);
                Ok(response)
            }
            Err(fault) => {
                let breaks_link = fault.breaks_link();
                let err = fault.into_error(request.address);
                if breaks_link {
                    self.fail(inner, &err);
                }
                Err(err)
            }
        }
    }

    fn deactivate_locked(&self, inner: &mut Inner, address: Address) -> Result<()> {
        let version = self.ensure_ready(inner, address)?;
        let spec = Register::LaserActivation.spec(version).ok_or_else(|| {
            PdmError::Protocol(format!("no laser_activation register in protocol {version}"))
        })?;

        let off = Request::write(address, spec, RegisterValue::U8(0))?;
        self.exchange_locked(inner, &off)?;
        self.exchange_locked(
            inner,
            &Request::command(address, Command::ApplyAllInstructions),
        )?;
        info!(address, "laser deactivated");
        Ok(())
    }

    fn fail(&self, inner: &mut Inner, err: &PdmError) {
        warn!(locator = self.locator(), error = %err, "link failed");
        if let Some(mut wire) = inner.wire.take() {
            if let Err(close_err) = wire.close() {
                debug!(error = %close_err, "transport close failed");
            }
        }
        inner.state = LinkState::Failed(err.to_string());
    }

    fn shutdown(&self, inner: &mut Inner) -> Result<()> {
        let mut first_error = None;

        if matches!(inner.state, LinkState::Ready(_)) {
            let addresses: Vec<Address> = inner.activated.iter().copied().collect();
            for address in addresses {
                if let Err(err) = self.deactivate_locked(inner, address) {
                    warn!(address, error = %err, "failed to deactivate laser on close");
                    first_error.get_or_insert(err);
                }
            }
        }

        if let Some(mut wire) = inner.wire.take() {
            if let Err(err) = wire.close() {
                warn!(error = %err, "transport close failed");
                first_error.get_or_insert(PdmError::connection(err.to_string()));
            }
        }

        inner.activated.clear();
        if inner.state != LinkState::Closed {
            info!(locator = self.locator(), "link closed");
        }
        inner.state = LinkState::Closed;

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Follow laser activation writes and reads so teardown knows what to
/// switch off.
fn track_activation(
    inner: &mut Inner,
    version: ProtocolVersion,
    request: &Request,
    response: &Response,
) {
    let Some(spec) = Register::LaserActivation.spec(version) else {
        return;
    };
    if request.register_code() != Some(spec.code) {
        return;
    }

    let value = match request.command {
        Command::WriteInstruction => request.data.get(2).copied(),
        Command::ReadInstruction => response.payload.first().copied(),
        _ => None,
    };
    match value {
        Some(0) => {
            inner.activated.remove(&request.address);
        }
        Some(_) => {
            inner.activated.insert(request.address);
        }
        None => {}
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        if inner.state == LinkState::Closed {
            return;
        }
        if let Err(err) = self.shutdown(&mut inner) {
            warn!(locator = self.locator(), error = %err, "errors while closing link");
        }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("locator", &self.locator())
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}
