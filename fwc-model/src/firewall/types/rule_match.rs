use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Error};
use proxmox_sortable_macro::sortable;

use crate::firewall::types::port::{PortEntry, PortList};

/// A transport-layer match (§3.1 Service). Distinguishing-field wildcards
/// make a service "any"; see [`Service::is_any`].
#[derive(Clone, Debug, PartialEq)]
pub enum Service {
    Tcp(Ports),
    Udp(Ports),
    Icmpv4(Icmp),
    Icmpv6(Icmpv6),
    IpProtocol(IpProtocolMatch),
    Custom { platform: Platform, code: String },
    User(String),
    Tag(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Platform {
    Ipt,
    Nft,
}

impl Service {
    pub fn is_any(&self) -> bool {
        match self {
            Service::Tcp(p) | Service::Udp(p) => p.is_any(),
            Service::Icmpv4(m) => m.ty().is_none() && m.code().is_none(),
            Service::Icmpv6(m) => m.ty.is_none() && m.code.is_none(),
            Service::IpProtocol(m) => m.is_any(),
            Service::Custom { .. } | Service::User(_) | Service::Tag(_) => false,
        }
    }

    pub fn ip_protocol_number(&self) -> Option<u8> {
        match self {
            Service::Tcp(_) => Some(6),
            Service::Udp(_) => Some(17),
            Service::Icmpv4(_) => Some(1),
            Service::Icmpv6(_) => Some(58),
            Service::IpProtocol(m) => Some(m.protocol),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub fin: bool,
    pub syn: bool,
    pub rst: bool,
    pub psh: bool,
    pub ack: bool,
    pub urg: bool,
}

impl TcpFlags {
    /// All flags and masks zero means "no flag match", distinct from
    /// "match flags == 0" (§8.3).
    pub fn is_unset(&self) -> bool {
        *self == TcpFlags::default()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ports {
    pub sport: Option<PortList>,
    pub dport: Option<PortList>,
    pub flags: TcpFlags,
    pub mask: TcpFlags,
    pub established: bool,
}

impl Ports {
    pub fn is_any(&self) -> bool {
        port_is_any(&self.sport)
            && port_is_any(&self.dport)
            && self.flags.is_unset()
            && self.mask.is_unset()
            && !self.established
    }
}

fn port_is_any(p: &Option<PortList>) -> bool {
    match p {
        None => true,
        Some(list) => list.is_any(),
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct IpProtocolMatch {
    pub protocol: u8,
    pub flags: [bool; 6],
    pub tos: Option<u8>,
    pub dscp: Option<u8>,
}

impl IpProtocolMatch {
    /// A fully-open protocol-0 match shadows any specific service (§4.6
    /// cross-kind rule).
    pub fn is_any(&self) -> bool {
        self.protocol == 0 && self.flags == [false; 6] && self.tos.is_none() && self.dscp.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Icmp {
    ty: Option<IcmpType>,
    code: Option<IcmpCode>,
}

impl Icmp {
    pub fn new(ty: Option<IcmpType>, code: Option<IcmpCode>) -> Result<Self, Error> {
        // Type `-1` (i.e. unset/"any") with a specific code is an error (§8.3).
        if ty.is_none() && code.is_some() {
            bail!("ICMP code given without a type");
        }
        Ok(Self { ty, code })
    }

    pub fn ty(&self) -> Option<&IcmpType> {
        self.ty.as_ref()
    }

    pub fn code(&self) -> Option<&IcmpCode> {
        self.code.as_ref()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IcmpType {
    Numeric(u8),
    Named(&'static str),
}

#[sortable]
const ICMP_TYPES: [(&str, u8); 15] = sorted!([
    ("address-mask-reply", 18),
    ("address-mask-request", 17),
    ("destination-unreachable", 3),
    ("echo-reply", 0),
    ("echo-request", 8),
    ("info-reply", 16),
    ("info-request", 15),
    ("parameter-problem", 12),
    ("redirect", 5),
    ("router-advertisement", 9),
    ("router-solicitation", 10),
    ("source-quench", 4),
    ("time-exceeded", 11),
    ("timestamp-reply", 14),
    ("timestamp-request", 13),
]);

impl FromStr for IcmpType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if let Ok(ty) = s.trim().parse::<u8>() {
            return Ok(Self::Numeric(ty));
        }

        if let Ok(index) = ICMP_TYPES.binary_search_by(|v| v.0.cmp(s)) {
            return Ok(Self::Named(ICMP_TYPES[index].0));
        }

        bail!("{s:?} is not a valid icmp type");
    }
}

impl fmt::Display for IcmpType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IcmpType::Numeric(ty) => write!(f, "{ty}"),
            IcmpType::Named(ty) => write!(f, "{ty}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IcmpCode {
    Numeric(u8),
    Named(&'static str),
}

#[sortable]
const ICMP_CODES: [(&str, u8); 7] = sorted!([
    ("admin-prohibited", 13),
    ("host-prohibited", 10),
    ("host-unreachable", 1),
    ("net-prohibited", 9),
    ("net-unreachable", 0),
    ("port-unreachable", 3),
    ("prot-unreachable", 2),
]);

impl FromStr for IcmpCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if let Ok(code) = s.trim().parse::<u8>() {
            return Ok(Self::Numeric(code));
        }

        if let Ok(index) = ICMP_CODES.binary_search_by(|v| v.0.cmp(s)) {
            return Ok(Self::Named(ICMP_CODES[index].0));
        }

        bail!("{s:?} is not a valid icmp code");
    }
}

impl fmt::Display for IcmpCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IcmpCode::Numeric(code) => write!(f, "{code}"),
            IcmpCode::Named(code) => write!(f, "{code}"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Icmpv6 {
    pub ty: Option<Icmpv6Type>,
    pub code: Option<Icmpv6Code>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Icmpv6Type {
    Numeric(u8),
    Named(&'static str),
}

#[sortable]
const ICMPV6_TYPES: [(&str, u8); 9] = sorted!([
    ("destination-unreachable", 1),
    ("echo-reply", 129),
    ("echo-request", 128),
    ("nd-neighbor-advert", 136),
    ("nd-neighbor-solicit", 135),
    ("nd-router-advert", 134),
    ("nd-router-solicit", 133),
    ("packet-too-big", 2),
    ("time-exceeded", 3),
]);

impl FromStr for Icmpv6Type {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if let Ok(ty) = s.trim().parse::<u8>() {
            return Ok(Self::Numeric(ty));
        }
        if let Ok(index) = ICMPV6_TYPES.binary_search_by(|v| v.0.cmp(s)) {
            return Ok(Self::Named(ICMPV6_TYPES[index].0));
        }
        bail!("{s:?} is not a valid icmpv6 type");
    }
}

impl fmt::Display for Icmpv6Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Icmpv6Type::Numeric(ty) => write!(f, "{ty}"),
            Icmpv6Type::Named(ty) => write!(f, "{ty}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Icmpv6Code {
    Numeric(u8),
    Named(&'static str),
}

#[sortable]
const ICMPV6_CODES: [(&str, u8); 2] = sorted!([("no-route", 0), ("port-unreachable", 4)]);

impl FromStr for Icmpv6Code {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if let Ok(code) = s.trim().parse::<u8>() {
            return Ok(Self::Numeric(code));
        }
        if let Ok(index) = ICMPV6_CODES.binary_search_by(|v| v.0.cmp(s)) {
            return Ok(Self::Named(ICMPV6_CODES[index].0));
        }
        bail!("{s:?} is not a valid icmpv6 code");
    }
}

impl fmt::Display for Icmpv6Code {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Icmpv6Code::Numeric(code) => write!(f, "{code}"),
            Icmpv6Code::Named(code) => write!(f, "{code}"),
        }
    }
}

/// Per-kind containment used by shadow detection (§4.6). `self` is the
/// earlier (potentially shadowing) rule's service, `other` the later one.
pub fn service_contains(shadowing: &Service, shadowed: &Service) -> bool {
    use Service::*;

    // Cross-kind: a fully-open IP-Protocol service shadows any specific service.
    if let IpProtocol(m) = shadowing {
        if m.is_any() {
            return true;
        }
    }

    match (shadowing, shadowed) {
        (IpProtocol(a), IpProtocol(b)) => {
            a.protocol == b.protocol && a.flags == b.flags && a.tos == b.tos && a.dscp == b.dscp
        }
        (Tcp(a), Tcp(b)) | (Udp(a), Udp(b)) => {
            a.flags == b.flags
                && a.mask == b.mask
                && port_range_contains(&a.sport, &b.sport)
                && port_range_contains(&a.dport, &b.dport)
        }
        (Icmpv4(a), Icmpv4(b)) => {
            icmp_contains(a.ty().is_none(), a.code().is_none(), b.ty().is_none())
                || (a.ty() == b.ty() && a.code() == b.code())
        }
        (Icmpv6(a), Icmpv6(b)) => {
            icmp_contains(a.ty.is_none(), a.code.is_none(), b.ty.is_none())
                || (a.ty == b.ty && a.code == b.code)
        }
        _ => false,
    }
}

/// A superset match (type `-1`, i.e. "any") shadows any specific-typed
/// match (§4.6). A shadowing match with a specific type never shadows a
/// different specific type; that case is handled by the exact-match
/// fallback in [`service_contains`].
fn icmp_contains(shadowing_ty_any: bool, shadowing_code_any: bool, shadowed_ty_any: bool) -> bool {
    shadowing_ty_any && shadowing_code_any && !shadowed_ty_any
}

fn port_range_contains(a: &Option<PortList>, b: &Option<PortList>) -> bool {
    match (a, b) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(a), Some(b)) => {
            if a.is_any() {
                return true;
            }
            a.iter().any(|ae| b.iter().all(|be| ae.contains(be)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icmp_any_code_error() {
        Icmp::new(None, Some(IcmpCode::Numeric(0))).unwrap_err();
        Icmp::new(None, None).unwrap();
        Icmp::new(Some(IcmpType::Numeric(8)), None).unwrap();
    }

    #[test]
    fn test_tcp_flags_unset() {
        assert!(TcpFlags::default().is_unset());
    }

    #[test]
    fn test_ip_protocol_any_shadows_specific() {
        let any = Service::IpProtocol(IpProtocolMatch::default());
        let specific = Service::Tcp(Ports::default());
        assert!(service_contains(&any, &specific));
    }
}
