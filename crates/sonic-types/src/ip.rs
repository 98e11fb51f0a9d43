//! Route prefixes.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// An IP prefix in CIDR notation (e.g., 10.0.0.0/24 or 2001:db8::/32).
///
/// Host bits are always cleared on construction, so `10.0.0.1/24` and
/// `10.0.0.0/24` compare equal. Prefixes order IPv4 before IPv6, then by
/// network address, then by length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IpPrefix {
    network: IpAddr,
    prefix_len: u8,
}

impl IpPrefix {
    /// Creates a new prefix, masking off host bits.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix length exceeds 32 (IPv4) or 128 (IPv6).
    pub fn new(address: IpAddr, prefix_len: u8) -> Result<Self, ParseError> {
        let network = match address {
            IpAddr::V4(v4) => {
                if prefix_len > 32 {
                    return Err(ParseError::InvalidIpPrefix(format!("{}/{}", address, prefix_len)));
                }
                let mask = u32::MAX.checked_shl(32 - u32::from(prefix_len)).unwrap_or(0);
                IpAddr::V4(Ipv4Addr::from(u32::from(v4) & mask))
            }
            IpAddr::V6(v6) => {
                if prefix_len > 128 {
                    return Err(ParseError::InvalidIpPrefix(format!("{}/{}", address, prefix_len)));
                }
                let mask = u128::MAX.checked_shl(128 - u32::from(prefix_len)).unwrap_or(0);
                IpAddr::V6(Ipv6Addr::from(u128::from(v6) & mask))
            }
        };

        Ok(IpPrefix {
            network,
            prefix_len,
        })
    }

    /// Host route covering exactly `address`.
    pub fn host(address: IpAddr) -> Self {
        let prefix_len = if address.is_ipv4() { 32 } else { 128 };
        IpPrefix {
            network: address,
            prefix_len,
        }
    }

    pub const fn network(&self) -> IpAddr {
        self.network
    }

    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub const fn is_ipv4(&self) -> bool {
        self.network.is_ipv4()
    }

    pub fn is_default(&self) -> bool {
        self.prefix_len == 0
    }

    /// Returns true if `address` falls inside this prefix.
    pub fn contains(&self, address: IpAddr) -> bool {
        match IpPrefix::new(address, self.prefix_len) {
            Ok(masked) => masked.network == self.network,
            Err(_) => false,
        }
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl FromStr for IpPrefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_str, len_str) = s
            .rsplit_once('/')
            .ok_or_else(|| ParseError::InvalidIpPrefix(s.to_string()))?;

        let address: IpAddr = addr_str
            .parse()
            .map_err(|_| ParseError::InvalidIpAddress(addr_str.to_string()))?;
        let prefix_len: u8 = len_str
            .parse()
            .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;

        IpPrefix::new(address, prefix_len)
    }
}

impl TryFrom<String> for IpPrefix {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IpPrefix> for String {
    fn from(prefix: IpPrefix) -> String {
        prefix.to_string()
    }
}
