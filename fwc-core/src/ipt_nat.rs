//! IPT NAT compiler (spec §4.4): rule-type classification, chain routing,
//! and target-argument synthesis for the `nat` table. Grounded on
//! `_nat_print_rule.py`'s `_build_nat_command`/`_print_target_args` (the
//! translated-port and `--to-source`/`--to-destination` formatting) and on
//! `_nat_compiler.py`'s `get_first_{osrc,odst,osrv,tsrc,tdst,tsrv}` slot
//! accessors.

use std::collections::HashSet;

use fwc_model::firewall::types::address::Address;
use fwc_model::firewall::types::device::Device;
use fwc_model::firewall::types::rule::{NatRuleType, Slot};
use fwc_model::firewall::types::rule_match::Service;
use fwc_model::Id;

use fwc_ipt::rule::{IptRule, Match, Negatable, Protocol, Target};

use crate::comprule::CompRule;
use crate::generic::SharedArena;

pub const STANDARD_NAT_CHAINS: &[&str] = &["PREROUTING", "POSTROUTING", "OUTPUT"];

/// What `classify` needs from the compiling device, pre-extracted the same
/// way `ResolveInterfaceLabel`/`CheckInterfaceAgainstAF` pull a small map out
/// of `Device` rather than holding a borrow across the whole pipeline.
pub struct NatDeviceContext {
    pub firewall: Id,
    pub dynamic_interfaces: HashSet<Id>,
}

impl NatDeviceContext {
    pub fn new(device: &Device) -> Self {
        Self {
            firewall: device.id,
            dynamic_interfaces: device.interfaces.iter().filter(|i| i.dynamic).map(|i| i.id).collect(),
        }
    }
}

fn is_network(arena: &SharedArena, id: Id) -> bool {
    matches!(arena.addresses.get(&id), Some(Address::NetworkV4(_)) | Some(Address::NetworkV6(_)))
}

/// Classifies a NAT rule from its populated translated slots, mirroring
/// `ClassifyNATRule`'s `tsrc`/`tdst`/`tsrv`-driven table rather than a bare
/// "which slots are non-empty" guess: a non-empty `tsrc` is `SNetnat` when it
/// names a `Network`, plain `Snat` otherwise unless it names one of the
/// compiling device's own dynamic interfaces (`Masq`); a non-empty `tdst`
/// is `DNetnat` for a `Network`, `Redirect` when it names the firewall
/// itself, `Dnat` otherwise.
pub fn classify(rule: &CompRule, arena: &SharedArena, ctx: &NatDeviceContext) -> NatRuleType {
    if let Some(existing) = rule.nat_rule_type {
        return existing;
    }

    use fwc_model::firewall::types::rule::Action;
    match &rule.action {
        Action::Branch { .. } => return NatRuleType::NatBranch,
        Action::Return => return NatRuleType::Return,
        Action::Continue => return NatRuleType::Continue,
        _ => {}
    }

    let tsrc = rule.slots.tsrc.first().copied();
    let tdst = rule.slots.tdst.first().copied();
    let tsrv_any = rule.slots.tsrv.is_empty();

    match (tsrc, tdst) {
        (None, None) => {
            if !tsrv_any {
                log::warn!(
                    "rule {}: translated service with no tsrc/tdst has no defined NAT rule type, treating as NONAT",
                    rule.abs_rule_number
                );
            }
            NatRuleType::NoNat
        }
        (Some(src), None) => {
            if is_network(arena, src) {
                NatRuleType::SNetnat
            } else if ctx.dynamic_interfaces.contains(&src) {
                NatRuleType::Masq
            } else {
                NatRuleType::Snat
            }
        }
        (None, Some(dst)) => {
            if is_network(arena, dst) {
                NatRuleType::DNetnat
            } else if dst == ctx.firewall {
                NatRuleType::Redirect
            } else {
                NatRuleType::Dnat
            }
        }
        (Some(_), Some(_)) => NatRuleType::SDNat,
    }
}

/// Which `nat`-table chain a classified rule is installed in, absent an
/// explicit chain assigned upstream by the driver.
pub fn decide_chain(rule_type: NatRuleType) -> &'static str {
    match rule_type {
        NatRuleType::Dnat | NatRuleType::DNetnat | NatRuleType::Redirect | NatRuleType::SDNat => {
            "PREROUTING"
        }
        NatRuleType::Snat | NatRuleType::SNetnat | NatRuleType::Masq | NatRuleType::Lb => {
            "POSTROUTING"
        }
        NatRuleType::NoNat
        | NatRuleType::NatBranch
        | NatRuleType::Return
        | NatRuleType::Continue
        | NatRuleType::Skip => "OUTPUT",
    }
}

fn target_name(rule_type: NatRuleType) -> &'static str {
    match rule_type {
        NatRuleType::Snat => "SNAT",
        NatRuleType::Dnat | NatRuleType::SDNat => "DNAT",
        NatRuleType::SNetnat | NatRuleType::DNetnat => "NETMAP",
        NatRuleType::Masq => "MASQUERADE",
        NatRuleType::Redirect => "REDIRECT",
        NatRuleType::NatBranch => "",
        NatRuleType::Return => "RETURN",
        NatRuleType::Continue | NatRuleType::NoNat | NatRuleType::Skip | NatRuleType::Lb => "",
    }
}

/// Port-range formatting for translated ports: `lo` with `lo == hi`, `:hi`
/// when `lo == 0`, else `lo:hi` (dash for translated, per the original's
/// distinct `_print_o_ports`/`_print_t_ports` separators).
pub(crate) fn port_range(lo: u16, hi: u16, sep: char) -> Option<String> {
    if lo == 0 && hi == 0 {
        return None;
    }
    if lo == hi {
        return Some(lo.to_string());
    }
    if lo == 0 {
        return Some(format!("{sep}{hi}"));
    }
    Some(format!("{lo}{sep}{hi}"))
}

pub(crate) fn service_ports(service: &Service, dst: bool) -> Option<(u16, u16)> {
    match service {
        Service::Tcp(ports) | Service::Udp(ports) => {
            let list = if dst { &ports.dport } else { &ports.sport };
            let list = list.as_ref()?;
            let (lo, hi) = list.iter().fold((u16::MAX, 0u16), |(lo, hi), entry| match entry {
                fwc_model::firewall::types::port::PortEntry::Port(p) => (lo.min(*p), hi.max(*p)),
                fwc_model::firewall::types::port::PortEntry::Range(a, b) => (lo.min(*a), hi.max(*b)),
            });
            if lo > hi {
                None
            } else {
                Some((lo, hi))
            }
        }
        _ => None,
    }
}

fn target_args(rule: &CompRule, rule_type: NatRuleType, arena: &SharedArena) -> Target {
    let tsrc_addr = rule
        .slots
        .tsrc
        .first()
        .and_then(|id| arena.addresses.get(id))
        .map(ToString::to_string);
    let tdst_addr = rule
        .slots
        .tdst
        .first()
        .and_then(|id| arena.addresses.get(id))
        .map(ToString::to_string);
    let tsrv = rule.slots.tsrv.first().and_then(|id| arena.services.get(id));

    let random = rule.options.extra.get("ipt_nat_random").map(|v| v == "1").unwrap_or(false);
    let persistent = rule.options.extra.get("ipt_nat_persistent").map(|v| v == "1").unwrap_or(false);

    match rule_type {
        NatRuleType::Masq => Target::Masquerade { random },
        NatRuleType::Snat => {
            let mut to = tsrc_addr.unwrap_or_default();
            if let Some(srv) = tsrv {
                if let Some((lo, hi)) = service_ports(srv, false) {
                    if let Some(p) = port_range(lo, hi, '-') {
                        to = format!("{to}:{p}");
                    }
                }
            }
            Target::Snat { to, random, persistent }
        }
        NatRuleType::Dnat | NatRuleType::SDNat => {
            let mut to = tdst_addr.unwrap_or_default();
            if let Some(srv) = tsrv {
                if let Some((lo, hi)) = service_ports(srv, true) {
                    if let Some(p) = port_range(lo, hi, '-') {
                        to = format!("{to}:{p}");
                    }
                }
            }
            Target::Dnat { to, random, persistent }
        }
        NatRuleType::SNetnat => Target::Netmap { to: tsrc_addr.unwrap_or_default() },
        NatRuleType::DNetnat => Target::Netmap { to: tdst_addr.unwrap_or_default() },
        NatRuleType::Redirect => {
            let to_ports = tsrv.and_then(|srv| service_ports(srv, true)).and_then(|(lo, hi)| port_range(lo, hi, ':'));
            Target::Redirect { to_ports }
        }
        NatRuleType::Return => Target::Return,
        NatRuleType::NatBranch => Target::Jump(rule.ipt_target.clone().unwrap_or_default()),
        NatRuleType::Continue | NatRuleType::NoNat | NatRuleType::Skip | NatRuleType::Lb => {
            Target::Custom(target_name(rule_type).to_string())
        }
    }
}

pub struct IptNatPrintProcessor {
    pub arena: SharedArena,
    pub device: NatDeviceContext,
    pub table: &'static str,
}

impl IptNatPrintProcessor {
    pub fn new(arena: SharedArena, device: &Device) -> Self {
        Self { arena, device: NatDeviceContext::new(device), table: "nat" }
    }

    fn addr_match(&self, rule: &CompRule, slot: Slot, dst: bool) -> Option<Match> {
        let id = rule.slots.get(slot).first()?;
        let addr = self.arena.addresses.get(id)?;
        let negated = Negatable {
            value: addr.to_string(),
            negate: if dst { rule.dst_single_object_negation } else { rule.src_single_object_negation },
        };
        Some(if dst {
            Match::Destination(negated)
        } else {
            Match::Source(negated)
        })
    }

    pub fn print(&self, rule: &CompRule) -> IptRule {
        let rule_type = classify(rule, &self.arena, &self.device);
        let chain = rule.ipt_chain.clone().unwrap_or_else(|| decide_chain(rule_type).to_string());
        let target = target_args(rule, rule_type, &self.arena);

        let mut ipt = IptRule::new(self.table, chain, target);

        if let Some(id) = rule.slots.osrv.first() {
            if let Some(srv) = self.arena.services.get(id) {
                if let Some(proto) = match srv {
                    Service::Tcp(_) => Some(Protocol::Tcp),
                    Service::Udp(_) => Some(Protocol::Udp),
                    Service::Icmpv4(_) => Some(Protocol::Icmp),
                    Service::Icmpv6(_) => Some(Protocol::Icmpv6),
                    Service::IpProtocol(m) => Some(Protocol::Number(m.protocol)),
                    _ => None,
                } {
                    ipt.matches.push(Match::Protocol(proto));
                }
                if let Some((lo, hi)) = service_ports(srv, false) {
                    if let Some(p) = port_range(lo, hi, ':') {
                        ipt.matches.push(Match::SourcePort(p));
                    }
                }
                if let Some((lo, hi)) = service_ports(srv, true) {
                    if let Some(p) = port_range(lo, hi, ':') {
                        ipt.matches.push(Match::DestPort(p));
                    }
                }
            }
        }

        if let Some(m) = self.addr_match(rule, Slot::OSrc, false) {
            ipt.matches.push(m);
        }
        if let Some(m) = self.addr_match(rule, Slot::ODst, true) {
            ipt.matches.push(m);
        }

        ipt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwc_model::firewall::common::Arena;
    use fwc_model::firewall::types::device::{EngineVersion, FirewallOptions, Kind, Platform};
    use fwc_model::firewall::types::interface::Interface;
    use std::net::Ipv4Addr;

    fn test_device() -> Device {
        Device {
            id: Id::generate(),
            name: "test-fw".to_string(),
            kind: Kind::Firewall,
            interfaces: vec![Interface::new("eth0")],
            rule_sets: Vec::new(),
            platform: Platform::Ipt,
            version: EngineVersion::default(),
            options: FirewallOptions::default(),
        }
    }

    #[test]
    fn classify_picks_snat_from_tsrc_only() {
        let arena: SharedArena = std::rc::Rc::new(Arena::new());
        let device = test_device();
        let ctx = NatDeviceContext::new(&device);
        let mut rule = make_rule();
        rule.slots.tsrc = vec![Id::from_raw(1)];
        assert_eq!(classify(&rule, &arena, &ctx), NatRuleType::Snat);
    }

    #[test]
    fn classify_picks_dnat_from_tdst_only() {
        let arena: SharedArena = std::rc::Rc::new(Arena::new());
        let device = test_device();
        let ctx = NatDeviceContext::new(&device);
        let mut rule = make_rule();
        rule.slots.tdst = vec![Id::from_raw(1)];
        assert_eq!(classify(&rule, &arena, &ctx), NatRuleType::Dnat);
    }

    #[test]
    fn classify_picks_masq_from_dynamic_interface_tsrc() {
        let mut device = test_device();
        device.interfaces[0].dynamic = true;
        let iface_id = device.interfaces[0].id;
        let ctx = NatDeviceContext::new(&device);
        let arena: SharedArena = std::rc::Rc::new(Arena::new());
        let mut rule = make_rule();
        rule.slots.tsrc = vec![iface_id];
        assert_eq!(classify(&rule, &arena, &ctx), NatRuleType::Masq);
    }

    #[test]
    fn classify_picks_snetnat_from_network_tsrc() {
        let device = test_device();
        let ctx = NatDeviceContext::new(&device);
        let mut arena = Arena::new();
        let net = arena.insert_address(Address::NetworkV4(
            fwc_model::firewall::types::address::Ipv4Cidr::new(Ipv4Addr::new(10, 0, 0, 0), 24).unwrap(),
        ));
        let arena: SharedArena = std::rc::Rc::new(arena);
        let mut rule = make_rule();
        rule.slots.tsrc = vec![net];
        assert_eq!(classify(&rule, &arena, &ctx), NatRuleType::SNetnat);
    }

    #[test]
    fn classify_picks_redirect_when_tdst_is_firewall_itself() {
        let device = test_device();
        let ctx = NatDeviceContext::new(&device);
        let arena: SharedArena = std::rc::Rc::new(Arena::new());
        let mut rule = make_rule();
        rule.slots.tdst = vec![device.id];
        assert_eq!(classify(&rule, &arena, &ctx), NatRuleType::Redirect);
    }

    #[test]
    fn decide_chain_routes_dnat_to_prerouting() {
        assert_eq!(decide_chain(NatRuleType::Dnat), "PREROUTING");
        assert_eq!(decide_chain(NatRuleType::Snat), "POSTROUTING");
        assert_eq!(decide_chain(NatRuleType::Masq), "POSTROUTING");
    }

    #[test]
    fn port_range_uses_requested_separator() {
        assert_eq!(port_range(8080, 8080, '-'), Some("8080".to_string()));
        assert_eq!(port_range(0, 8090, '-'), Some("-8090".to_string()));
        assert_eq!(port_range(8080, 8090, ':'), Some("8080:8090".to_string()));
        assert_eq!(port_range(0, 0, ':'), None);
    }

    fn make_rule() -> CompRule {
        use fwc_model::firewall::types::rule::{Action, Direction, Rule, RuleKind, RuleOptions};
        CompRule::from_rule(&Rule {
            kind: RuleKind::Nat,
            position: 1,
            label: String::new(),
            comment: String::new(),
            slots: Default::default(),
            negations: Default::default(),
            action: Action::Translate,
            direction: Direction::Both,
            disabled: false,
            fallback: false,
            hidden: false,
            options: RuleOptions::default(),
        })
    }
}
