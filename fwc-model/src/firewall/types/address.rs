use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::ops::Deref;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Error};

use crate::Id;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ipv4Cidr {
    address: Ipv4Addr,
    mask: u8,
}

impl Ipv4Cidr {
    pub fn new(address: Ipv4Addr, mask: u8) -> Result<Self, Error> {
        if mask > 32 {
            bail!("invalid IPv4 mask {mask}");
        }
        Ok(Self { address, mask })
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn mask(&self) -> u8 {
        self.mask
    }

    /// Numeric `[first, last]` range of this network, for range-inclusion
    /// based containment checks.
    pub fn range(&self) -> (u32, u32) {
        let base = u32::from(self.address);
        if self.mask == 0 {
            return (0, u32::MAX);
        }
        let host_bits = 32 - self.mask as u32;
        let mask_bits = if host_bits == 32 {
            0
        } else {
            u32::MAX << host_bits
        };
        let network = base & mask_bits;
        (network, network | !mask_bits)
    }

    pub fn contains_address(&self, addr: &Ipv4Addr) -> bool {
        let (lo, hi) = self.range();
        let val = u32::from(*addr);
        lo <= val && val <= hi
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.mask)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ipv6Cidr {
    address: Ipv6Addr,
    mask: u8,
}

impl Ipv6Cidr {
    pub fn new(address: Ipv6Addr, mask: u8) -> Result<Self, Error> {
        if mask > 128 {
            bail!("invalid IPv6 mask {mask}");
        }
        Ok(Self { address, mask })
    }

    pub fn address(&self) -> Ipv6Addr {
        self.address
    }

    pub fn mask(&self) -> u8 {
        self.mask
    }

    pub fn range(&self) -> (u128, u128) {
        let base = u128::from(self.address);
        if self.mask == 0 {
            return (0, u128::MAX);
        }
        let host_bits = 128 - self.mask as u32;
        let mask_bits = if host_bits == 128 {
            0
        } else {
            u128::MAX << host_bits
        };
        let network = base & mask_bits;
        (network, network | !mask_bits)
    }

    pub fn contains_address(&self, addr: &Ipv6Addr) -> bool {
        let (lo, hi) = self.range();
        let val = u128::from(*addr);
        lo <= val && val <= hi
    }
}

impl fmt::Display for Ipv6Cidr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.mask)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cidr {
    Ipv4(Ipv4Cidr),
    Ipv6(Ipv6Cidr),
}

impl Cidr {
    pub fn family(&self) -> Family {
        match self {
            Cidr::Ipv4(_) => Family::V4,
            Cidr::Ipv6(_) => Family::V6,
        }
    }

    /// Numeric `[first, last]` range, widened to `u128` so IPv4 and IPv6
    /// ranges can be compared with the same machinery.
    pub fn range128(&self) -> (u128, u128) {
        match self {
            Cidr::Ipv4(c) => {
                let (lo, hi) = c.range();
                (lo as u128, hi as u128)
            }
            Cidr::Ipv6(c) => c.range(),
        }
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Cidr::Ipv4(c) => c.fmt(f),
            Cidr::Ipv6(c) => c.fmt(f),
        }
    }
}

impl FromStr for Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let (addr, mask) = s
            .split_once('/')
            .ok_or_else(|| anyhow::format_err!("expected address/mask, found {s:?}"))?;
        let mask: u8 = mask.parse()?;
        match addr.parse::<IpAddr>()? {
            IpAddr::V4(a) => Ok(Cidr::Ipv4(Ipv4Cidr::new(a, mask)?)),
            IpAddr::V6(a) => Ok(Cidr::Ipv6(Ipv6Cidr::new(a, mask)?)),
        }
    }
}

/// A single slot-list entry: either a CIDR network/host, or an explicit
/// first-last range (the `Range` address variant).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IpEntry {
    Cidr(Cidr),
    Range(IpAddr, IpAddr),
}

impl IpEntry {
    pub fn family(&self) -> Family {
        match self {
            IpEntry::Cidr(c) => c.family(),
            IpEntry::Range(a, _) => Family::of(a),
        }
    }

    pub fn range128(&self) -> (u128, u128) {
        match self {
            IpEntry::Cidr(c) => c.range128(),
            IpEntry::Range(a, b) => (ip_to_u128(a), ip_to_u128(b)),
        }
    }

    /// Numeric range inclusion per spec §4.6: first <= first, last >= last.
    pub fn contains(&self, other: &IpEntry) -> bool {
        if self.family() != other.family() {
            return false;
        }
        let (self_lo, self_hi) = self.range128();
        let (other_lo, other_hi) = other.range128();
        self_lo <= other_lo && self_hi >= other_hi
    }
}

fn ip_to_u128(addr: &IpAddr) -> u128 {
    match addr {
        IpAddr::V4(a) => u32::from(*a) as u128,
        IpAddr::V6(a) => u128::from(*a),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IpList(pub Vec<IpEntry>);

impl Deref for IpList {
    type Target = Vec<IpEntry>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromIterator<IpEntry> for IpList {
    fn from_iter<T: IntoIterator<Item = IpEntry>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DnsScope {
    CompileTime,
    RunTime,
}

/// A network-layer object. One variant per concrete kind named in the
/// domain model (§3.1): deep inheritance in the original is replaced by a
/// flat tagged union, dispatch by `match` instead of virtual calls.
#[derive(Clone, Debug, PartialEq)]
pub enum Address {
    HostV4(Ipv4Addr),
    HostV6(Ipv6Addr),
    NetworkV4(Ipv4Cidr),
    NetworkV6(Ipv6Cidr),
    Range(IpAddr, IpAddr),
    Mac([u8; 6]),
    DnsName { name: String, scope: DnsScope },
    AddressTable { path: PathBuf },
    AttachedNetworks { interface: Id },
    DynamicGroup,
    MultiAddressRunTime,
}

impl Address {
    /// An "any" slot is represented by an empty slot list upstream, never by
    /// a sentinel `Address` variant — this only tells whether the variant is
    /// resolved to a concrete network-layer value yet.
    pub fn family(&self) -> Option<Family> {
        match self {
            Address::HostV4(_) | Address::NetworkV4(_) => Some(Family::V4),
            Address::HostV6(_) | Address::NetworkV6(_) => Some(Family::V6),
            Address::Range(a, _) => Some(Family::of(a)),
            _ => None,
        }
    }

    /// True for variants that must be resolved to concrete addresses before
    /// the atomization stages can run (§4.2 stage 6: resolve-multi-address).
    pub fn is_compile_time_multi(&self) -> bool {
        matches!(
            self,
            Address::DnsName {
                scope: DnsScope::CompileTime,
                ..
            } | Address::AddressTable { .. }
        )
    }

    pub fn is_run_time(&self) -> bool {
        matches!(
            self,
            Address::DnsName {
                scope: DnsScope::RunTime,
                ..
            } | Address::MultiAddressRunTime
        )
    }

    pub fn as_ip_entry(&self) -> Option<IpEntry> {
        match self {
            Address::HostV4(a) => Ipv4Cidr::new(*a, 32).ok().map(Cidr::Ipv4).map(IpEntry::Cidr),
            Address::HostV6(a) => Ipv6Cidr::new(*a, 128)
                .ok()
                .map(Cidr::Ipv6)
                .map(IpEntry::Cidr),
            Address::NetworkV4(c) => Some(IpEntry::Cidr(Cidr::Ipv4(*c))),
            Address::NetworkV6(c) => Some(IpEntry::Cidr(Cidr::Ipv6(*c))),
            Address::Range(a, b) => Some(IpEntry::Range(*a, *b)),
            _ => None,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Address::HostV4(a) => write!(f, "{a}"),
            Address::HostV6(a) => write!(f, "{a}"),
            Address::NetworkV4(c) => write!(f, "{c}"),
            Address::NetworkV6(c) => write!(f, "{c}"),
            Address::Range(a, b) => write!(f, "{a}-{b}"),
            Address::Mac(m) => write!(
                f,
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                m[0], m[1], m[2], m[3], m[4], m[5]
            ),
            Address::DnsName { name, .. } => write!(f, "{name}"),
            Address::AddressTable { path } => write!(f, "table:{}", path.display()),
            Address::AttachedNetworks { interface } => write!(f, "attached-networks:{interface}"),
            Address::DynamicGroup => write!(f, "dynamic-group"),
            Address::MultiAddressRunTime => write!(f, "multi-address-runtime"),
        }
    }
}

/// Reads an address-table file: one entry per line, keeping only
/// `0-9a-f:/.` characters per line (truncating at the first other
/// character), skipping blank/`#` lines, and filtering by address family.
/// Preserves the original loader's exact (possibly overly-permissive)
/// behavior per the pinned open question in SPEC_FULL.md §9.2.
pub fn load_address_table(contents: &str, family: Family) -> Vec<IpEntry> {
    let mut out = Vec::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let filtered: String = line
            .chars()
            .take_while(|c| c.is_ascii_hexdigit() || *c == ':' || *c == '/' || *c == '.')
            .collect();

        if filtered.is_empty() {
            continue;
        }

        let entry = if let Ok(cidr) = filtered.parse::<Cidr>() {
            IpEntry::Cidr(cidr)
        } else if let Ok(addr) = filtered.parse::<IpAddr>() {
            match addr {
                IpAddr::V4(a) => IpEntry::Cidr(Cidr::Ipv4(Ipv4Cidr::new(a, 32).unwrap())),
                IpAddr::V6(a) => IpEntry::Cidr(Cidr::Ipv6(Ipv6Cidr::new(a, 128).unwrap())),
            }
        } else {
            continue;
        };

        if entry.family() == family {
            out.push(entry);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cidr_range_containment() {
        let big: Cidr = "10.0.0.0/8".parse().unwrap();
        let small: Cidr = "10.1.2.0/24".parse().unwrap();
        let big_entry = IpEntry::Cidr(big);
        let small_entry = IpEntry::Cidr(small);

        assert!(big_entry.contains(&small_entry));
        assert!(!small_entry.contains(&big_entry));
    }

    #[test]
    fn test_address_table_filter_truncates() {
        let contents = "10.0.0.0/8 garbage-after-space\n# comment\n\nfe80::1/64\nnothex!\n";
        let v4 = load_address_table(contents, Family::V4);
        assert_eq!(v4.len(), 1);
        let v6 = load_address_table(contents, Family::V6);
        assert_eq!(v6.len(), 1);
    }
}
