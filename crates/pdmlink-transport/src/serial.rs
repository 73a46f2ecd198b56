use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{Connector, Transport};

/// Line rate used by PDM modules.
pub const DEFAULT_BAUD_RATE: u32 = 125_000;

/// Serial line settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// Baud rate. Default: 125000.
    pub baud_rate: u32,
    /// Initial read timeout, replaced per read by the caller's timeout.
    pub timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_millis(500),
        }
    }
}

/// Serial-port transport (8N1, no flow control).
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    locator: String,
    current_timeout: Duration,
}

impl SerialTransport {
    /// Open a serial device such as `/dev/ttyUSB0` or `COM3`.
    pub fn open(locator: &str, settings: &SerialSettings) -> Result<Self> {
        let port = serialport::new(locator, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(settings.timeout)
            .open()
            .map_err(|source| TransportError::Open {
                locator: locator.to_string(),
                source,
            })?;

        info!(locator, baud_rate = settings.baud_rate, "opened serial port");

        Ok(Self {
            port: Some(port),
            locator: locator.to_string(),
            current_timeout: settings.timeout,
        })
    }

    /// The locator this transport was opened from.
    pub fn locator(&self) -> &str {
        &self.locator
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(TransportError::Closed)
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port_mut()?;
        port.write_all(data)?;
        port.flush()?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if timeout != self.current_timeout {
            let locator = self.locator.clone();
            self.port_mut()?
                .set_timeout(timeout)
                .map_err(|source| TransportError::Configure { locator, source })?;
            self.current_timeout = timeout;
        }

        let port = self.port_mut()?;
        loop {
            match port.read(buf) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::TimedOut => return Ok(0),
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn discard_input(&mut self) -> Result<()> {
        let locator = self.locator.clone();
        self.port_mut()?
            .clear(ClearBuffer::Input)
            .map_err(|source| TransportError::Configure { locator, source })
    }

    fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            debug!(locator = %self.locator, "closed serial port");
        }
        Ok(())
    }

    fn transport_name(&self) -> &'static str {
        "serial"
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("locator", &self.locator)
            .field("open", &self.port.is_some())
            .finish()
    }
}

/// Opens [`SerialTransport`]s for one device path.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    locator: String,
    settings: SerialSettings,
}

impl SerialConnector {
    /// Connector with default line settings.
    pub fn new(locator: impl Into<String>) -> Self {
        Self::with_settings(locator, SerialSettings::default())
    }

    /// Connector with explicit line settings.
    pub fn with_settings(locator: impl Into<String>, settings: SerialSettings) -> Self {
        Self {
            locator: locator.into(),
            settings,
        }
    }

    /// Line settings used for every open.
    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }
}

impl Connector for SerialConnector {
    fn connect(&self) -> Result<Box<dyn Transport>> {
        let transport = SerialTransport::open(&self.locator, &self.settings)?;
        Ok(Box::new(transport))
    }

    fn locator(&self) -> &str {
        &self.locator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_match_module_line_rate() {
        let settings = SerialSettings::default();
        assert_eq!(settings.baud_rate, 125_000);
        assert_eq!(settings.timeout, Duration::from_millis(500));
    }

    #[test]
    fn open_missing_device_reports_locator() {
        let locator = "/dev/pdmlink-test-missing-device";
        let err = SerialTransport::open(locator, &SerialSettings::default()).unwrap_err();
        assert!(matches!(&err, TransportError::Open { locator: l, .. } if l == locator));
        assert!(err.to_string().contains(locator));
    }

    #[test]
    fn connector_exposes_locator_and_settings() {
        let settings = SerialSettings {
            baud_rate: 9600,
            ..SerialSettings::default()
        };
        let connector = SerialConnector::with_settings("/dev/ttyUSB7", settings.clone());
        assert_eq!(Connector::locator(&connector), "/dev/ttyUSB7");
        assert_eq!(connector.settings(), &settings);
    }

    #[test]
    fn connector_propagates_open_failure() {
        let connector = SerialConnector::new("/dev/pdmlink-test-missing-device");
        assert!(matches!(
            connector.connect(),
            Err(TransportError::Open { .. })
        ));
    }

    #[test]
    fn closure_connector() {
        let connector = || -> Result<Box<dyn Transport>> { Err(TransportError::Closed) };
        assert_eq!(connector.locator(), "<custom>");
        assert!(matches!(connector.connect(), Err(TransportError::Closed)));
    }
}
