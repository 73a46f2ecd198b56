//! Protocol version negotiation.

use pdmlink_frame::{Address, Command, ProtocolVersion, Request, VersionRange};
use tracing::{debug, info};

use crate::error::{PdmError, Result};
use crate::wire::Wire;

/// Ask the module at `address` for its protocol version and check it against
/// `supported`.
pub(crate) fn negotiate(
    wire: &mut Wire,
    address: Address,
    supported: &VersionRange,
) -> Result<ProtocolVersion> {
    let version = identify(wire, address)?;
    if !supported.contains(version) {
        return Err(PdmError::ProtocolVersionNotSupported {
            version,
            supported: *supported,
        });
    }
    info!(address, %version, "protocol version negotiated");
    Ok(version)
}

/// Send the identify command and decode the `(major, minor)` reply.
fn identify(wire: &mut Wire, address: Address) -> Result<ProtocolVersion> {
    let request = Request::command(address, Command::ReadProtocolVersion);
    let response = wire
        .exchange(&request)
        .map_err(|fault| fault.into_error(address))?;
    let version = ProtocolVersion::from_payload(&response.payload)?;
    debug!(address, %version, "module identified");
    Ok(version)
}
