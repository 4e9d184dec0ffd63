//! Hardware (MAC) address of this machine

use crate::error::{ProbeError, ProbeResult};
use pnet::datalink::{self, MacAddr};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 48-bit hardware address, rendered as `aa:bb:cc:dd:ee:ff`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// `00:00:00:00:00:00`, returned when no address can be found
    pub const ZERO: MacAddress = MacAddress([0; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

/// Low 48 bits, most significant octet first.
impl From<u64> for MacAddress {
    fn from(node: u64) -> Self {
        let bytes = node.to_be_bytes();
        let mut octets = [0u8; 6];
        octets.copy_from_slice(&bytes[2..]);
        Self(octets)
    }
}

impl From<MacAddress> for u64 {
    fn from(mac: MacAddress) -> Self {
        mac.0.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
    }
}

impl From<MacAddr> for MacAddress {
    fn from(mac: MacAddr) -> Self {
        let MacAddr(a, b, c, d, e, f) = mac;
        Self([a, b, c, d, e, f])
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d, e, g)
    }
}

impl FromStr for MacAddress {
    type Err = ProbeError;

    /// Accepts `:` or `-` separators in either case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProbeError::Parse(format!("{:?} is not a MAC address", s));

        let parts: Vec<&str> = s.trim().split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(invalid());
        }

        let mut octets = [0u8; 6];
        for (octet, part) in octets.iter_mut().zip(&parts) {
            if part.len() != 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        Ok(Self(octets))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// What address selection needs to know about an interface
#[derive(Debug, Clone)]
struct InterfaceCandidate {
    name: String,
    up: bool,
    loopback: bool,
    mac: Option<MacAddress>,
}

/// First non-loopback interface with a real address, preferring ones that are up.
fn select_hardware_address(interfaces: &[InterfaceCandidate]) -> Option<&InterfaceCandidate> {
    let usable = |iface: &&InterfaceCandidate| {
        !iface.loopback && iface.mac.is_some_and(|mac| !mac.is_zero())
    };

    interfaces
        .iter()
        .filter(usable)
        .find(|iface| iface.up)
        .or_else(|| interfaces.iter().find(usable))
}

/// Hardware address of the primary network interface.
pub fn try_get_mac_address() -> ProbeResult<MacAddress> {
    let candidates: Vec<InterfaceCandidate> = datalink::interfaces()
        .into_iter()
        .map(|iface| InterfaceCandidate {
            up: iface.is_up(),
            loopback: iface.is_loopback(),
            mac: iface.mac.map(MacAddress::from),
            name: iface.name,
        })
        .collect();

    let chosen = select_hardware_address(&candidates).ok_or_else(|| {
        ProbeError::Parse(format!(
            "none of {} interfaces has a hardware address",
            candidates.len()
        ))
    })?;

    tracing::debug!("Hardware address taken from {}", chosen.name);
    chosen
        .mac
        .ok_or_else(|| ProbeError::Parse(format!("{} has no hardware address", chosen.name)))
}

/// Hardware address of this machine, or [`MacAddress::ZERO`].
pub fn get_mac_address() -> MacAddress {
    try_get_mac_address().unwrap_or_else(|e| {
        tracing::debug!("MAC address lookup failed: {}", e);
        MacAddress::ZERO
    })
}
