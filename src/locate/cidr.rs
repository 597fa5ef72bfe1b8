//! CIDR networks and a longest-prefix lookup table.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CidrError {
    #[error("malformed network '{0}'")]
    Malformed(String),

    #[error("prefix length {prefix} too long for '{network}'")]
    PrefixTooLong { network: String, prefix: u8 },
}

/// An IPv4 or IPv6 network. Host bits are cleared on parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cidr {
    bits: u128,
    prefix: u8,
    v6: bool,
}

impl Cidr {
    pub fn prefix_len(&self) -> u8 {
        self.prefix
    }

    pub fn is_ipv6(&self) -> bool {
        self.v6
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match to_bits(ip) {
            (bits, v6) if v6 == self.v6 => mask(bits, self.prefix, v6) == self.bits,
            _ => false,
        }
    }
}

fn to_bits(ip: IpAddr) -> (u128, bool) {
    match ip {
        IpAddr::V4(v4) => (u128::from(u32::from(v4)), false),
        IpAddr::V6(v6) => (u128::from(v6), true),
    }
}

fn width(v6: bool) -> u8 {
    if v6 {
        128
    } else {
        32
    }
}

fn mask(bits: u128, prefix: u8, v6: bool) -> u128 {
    let host_bits = u32::from(width(v6) - prefix);
    if host_bits >= 128 {
        0
    } else {
        (bits >> host_bits) << host_bits
    }
}

impl FromStr for Cidr {
    type Err = CidrError;

    /// Parses `addr/len`. A bare address is a host route.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, len)) => (addr, Some(len)),
            None => (s, None),
        };
        let ip: IpAddr = addr.parse().map_err(|_| CidrError::Malformed(s.to_string()))?;
        let (bits, v6) = to_bits(ip);
        let prefix = match prefix {
            Some(len) => len.parse::<u8>().map_err(|_| CidrError::Malformed(s.to_string()))?,
            None => width(v6),
        };
        if prefix > width(v6) {
            return Err(CidrError::PrefixTooLong {
                network: s.to_string(),
                prefix,
            });
        }
        Ok(Self {
            bits: mask(bits, prefix, v6),
            prefix,
            v6,
        })
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addr = if self.v6 {
            IpAddr::from(self.bits.to_be_bytes())
        } else {
            IpAddr::from((self.bits as u32).to_be_bytes())
        };
        write!(f, "{addr}/{}", self.prefix)
    }
}

/// Longest-prefix match over a set of networks.
///
/// Each family keeps one map per prefix length; lookups walk lengths from
/// longest to shortest.
#[derive(Debug, Clone)]
pub struct CidrTable<T> {
    v4: BTreeMap<u8, HashMap<u128, T>>,
    v6: BTreeMap<u8, HashMap<u128, T>>,
    len: usize,
}

impl<T> Default for CidrTable<T> {
    fn default() -> Self {
        Self {
            v4: BTreeMap::new(),
            v6: BTreeMap::new(),
            len: 0,
        }
    }
}

impl<T> CidrTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a network, replacing any value already stored for it.
    pub fn insert(&mut self, network: Cidr, value: T) {
        let family = if network.v6 { &mut self.v6 } else { &mut self.v4 };
        if family.entry(network.prefix).or_default().insert(network.bits, value).is_none() {
            self.len += 1;
        }
    }

    pub fn lookup(&self, ip: IpAddr) -> Option<&T> {
        let (bits, v6) = to_bits(ip);
        let family = if v6 { &self.v6 } else { &self.v4 };
        family
            .iter()
            .rev()
            .find_map(|(prefix, nets)| nets.get(&mask(bits, *prefix, v6)))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
