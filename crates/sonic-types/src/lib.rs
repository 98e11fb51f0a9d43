//! Value types shared by every layer of the hardware sync agent.
//!
//! - [`IpPrefix`]: a masked, totally ordered route prefix
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`PortId`], [`AggregatePortId`], [`RouterId`], [`ClientId`],
//!   [`InterfaceId`]: software identifiers assigned by the switch state
//! - [`VlanId`]: IEEE 802.1Q VLAN identifiers

mod ids;
mod ip;
mod mac;

pub use ids::{AggregatePortId, ClientId, InterfaceId, PortId, RouterId, VlanId};
pub use ip::IpPrefix;
pub use mac::MacAddress;
pub use std::net::IpAddr as IpAddress;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(u16),
}
