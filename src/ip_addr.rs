use std::cmp::Ordering;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// `::ffff:0:0/96`, the IPv4-mapped-IPv6 prefix.
const V4_MAPPED_PREFIX: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff];

/// Unified IPv4/IPv6 address value, always stored as 16 octets in network
/// byte order. IPv4 addresses live in IPv4-mapped-IPv6 form; the address
/// kind is inferred from the prefix rather than tagged separately.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct IpAddr {
    octets: [u8; 16],
}

impl IpAddr {
    pub const UNSPECIFIED: IpAddr = IpAddr { octets: [0; 16] };

    pub fn from_v4(addr: Ipv4Addr) -> Self {
        let mut octets = [0u8; 16];
        octets[..12].copy_from_slice(&V4_MAPPED_PREFIX);
        octets[12..].copy_from_slice(&addr.octets());
        IpAddr { octets }
    }

    pub fn from_v6(addr: Ipv6Addr) -> Self {
        IpAddr {
            octets: addr.octets(),
        }
    }

    pub fn from_v4_octets(bytes: [u8; 4]) -> Self {
        Self::from_v4(Ipv4Addr::from(bytes))
    }

    pub fn from_v6_octets(bytes: [u8; 16]) -> Self {
        IpAddr { octets: bytes }
    }

    /// True when the address carries the IPv4-mapped-IPv6 prefix.
    pub fn is_ip4(&self) -> bool {
        self.octets[..12] == V4_MAPPED_PREFIX
    }

    /// Defined as "not `is_ip4`", per spec.
    pub fn is_ip6(&self) -> bool {
        !self.is_ip4()
    }

    pub fn octets(&self) -> &[u8; 16] {
        &self.octets
    }

    /// Panics (debug) if the address isn't in IPv4-mapped form; callers
    /// must check `is_ip4` first.
    pub fn as_v4_octets(&self) -> [u8; 4] {
        debug_assert!(self.is_ip4());
        let mut out = [0u8; 4];
        out.copy_from_slice(&self.octets[12..]);
        out
    }

    pub fn as_v6_octets(&self) -> [u8; 16] {
        self.octets
    }

    pub fn to_v4(&self) -> Option<Ipv4Addr> {
        self.is_ip4().then(|| Ipv4Addr::from(self.as_v4_octets()))
    }

    pub fn to_v6(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.octets)
    }
}

impl Ord for IpAddr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.octets.cmp(&other.octets)
    }
}

impl PartialOrd for IpAddr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for IpAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_v4() {
            Some(v4) => write!(f, "{}", v4),
            None => write!(f, "{}", self.to_v6()),
        }
    }
}

impl fmt::Debug for IpAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IpAddr({})", self)
    }
}

impl From<Ipv4Addr> for IpAddr {
    fn from(addr: Ipv4Addr) -> Self {
        IpAddr::from_v4(addr)
    }
}

impl From<Ipv6Addr> for IpAddr {
    fn from(addr: Ipv6Addr) -> Self {
        IpAddr::from_v6(addr)
    }
}
