//! Byte-stream transport abstraction for PDM chains.
//!
//! Every module on a daisy chain shares one physical connection. This crate
//! models that connection as a [`Transport`]: blocking writes, reads bounded
//! by a timeout, and an explicit close. A [`Connector`] knows how to open one
//! from an opaque locator string.
//!
//! This is the lowest layer of pdmlink. The serial-port implementation lives
//! in [`serial`].

pub mod error;
pub mod serial;
pub mod traits;

pub use error::{Result, TransportError};
pub use serial::{SerialConnector, SerialSettings, SerialTransport, DEFAULT_BAUD_RATE};
pub use traits::{Connector, Transport};
