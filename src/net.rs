//! Local network helpers

use std::net::IpAddr;

use tracing::debug;

use crate::client::{Error, Result};

/// Resolve the address of a named network interface.
///
/// IPv4 addresses win over IPv6 when the interface carries both.
pub fn interface_address(name: &str) -> Result<IpAddr> {
    let interfaces = if_addrs::get_if_addrs().map_err(|e| Error::InterfaceAddress {
        interface: name.to_string(),
        reason: e.to_string(),
    })?;

    let addresses: Vec<IpAddr> = interfaces
        .iter()
        .filter(|iface| iface.name == name)
        .map(|iface| iface.ip())
        .collect();

    let address = addresses
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addresses.first())
        .copied()
        .ok_or_else(|| Error::InterfaceAddress {
            interface: name.to_string(),
            reason: "no such interface or it has no address".to_string(),
        })?;

    debug!("Interface {} resolved to {}", name, address);
    Ok(address)
}
