//! IPT policy compiler (spec §4.3): chain decision, negation lowering via
//! temporary chains, multiport/state matching, action-to-target mapping,
//! and the final IPT-specific print stage. Grounded on
//! `_policy_compiler.py`'s chain-decision predicates and 3-way negation
//! split, and on `_print_rule.py`'s target/reject-with maps.

use std::collections::HashMap;

use fwc_model::firewall::types::device::{EngineVersion, ENGINE_VERSION_ICMP_ADMIN_PROHIBITED};
use fwc_model::firewall::types::rule::{Action, Direction, Slot};
use fwc_model::firewall::types::rule_match::Service;
use fwc_model::Id;

use fwc_ipt::rule::{IptRule, Match, Negatable, Protocol, StateModule, Target};

use crate::comprule::CompRule;
use crate::generic::SharedArena;
use crate::processor::Stage;

/// Chain a rule belongs to absent an explicit branch target (§4.3's
/// chain-decision predicate table, collapsed to its common case — a rule
/// set's own branch chain, when present, always wins and is assigned
/// upstream by the driver before this stage runs).
pub fn decide_chain(rule: &CompRule) -> &'static str {
    match rule.direction {
        Direction::Inbound => "INPUT",
        Direction::Outbound => "OUTPUT",
        Direction::Both | Direction::Undefined => "FORWARD",
    }
}

/// Deterministic temp-chain name generator: `C<hex-of-id-prefix>.<n>`, a
/// monotonic per-source-rule counter so repeated splits of the same rule
/// never collide (pinned Open Question, SPEC_FULL.md §9.2).
#[derive(Default)]
pub struct TmpChainNamer {
    counters: HashMap<Id, u32>,
}

impl TmpChainNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, source_id: Id) -> String {
        let n = self.counters.entry(source_id).or_insert(0);
        let name = format!("C{:x}.{}", source_id.raw() as u64, n);
        *n += 1;
        name
    }
}

/// Lowers a single-slot negation that couldn't be expressed as an inline
/// `!` match (more than one negated object, or a complex match the
/// iptables `!` syntax can't express) into the 3-rule temp-chain idiom:
/// a jump into a fresh chain with the negated slot cleared, a `RETURN` rule
/// in that chain matching only the negated objects, and an action rule
/// behind it inheriting the original target.
pub struct NegationSplit {
    pub namer: TmpChainNamer,
}

impl NegationSplit {
    fn split_slot(&mut self, rule: &CompRule, slot: Slot, chain: &str, source_id: Id) -> Option<Vec<CompRule>> {
        if !rule.negations.get(slot) || rule.slots.get(slot).len() <= 1 {
            return None;
        }

        let tmp = self.namer.next(source_id);

        let mut jump = rule.clone_fresh();
        jump.ipt_chain = Some(chain.to_string());
        jump.negations.set(slot, false);
        *jump.slots.get_mut(slot) = Vec::new();
        jump.action = Action::Branch { target: tmp.clone() };

        let mut ret = rule.clone_fresh();
        ret.ipt_chain = Some(tmp.clone());
        ret.upstream_rule_chain = Some(chain.to_string());
        ret.negations.set(slot, false);
        ret.action = Action::Return;
        ret.options.stateless = true;
        ret.direction = Direction::Both;

        let mut action_rule = rule.clone_fresh();
        action_rule.ipt_chain = Some(tmp);
        action_rule.upstream_rule_chain = Some(chain.to_string());
        for s in [Slot::Src, Slot::Dst, Slot::Srv, Slot::Itf, Slot::When] {
            *action_rule.slots.get_mut(s) = Vec::new();
        }
        action_rule.direction = Direction::Both;
        action_rule.options.stateless = true;
        action_rule.final_rule = true;

        Some(vec![jump, ret, action_rule])
    }
}

impl Stage for NegationSplit {
    fn name(&self) -> &'static str {
        "NegationSplit"
    }

    fn process(&mut self, rule: CompRule) -> Vec<CompRule> {
        let chain = rule.ipt_chain.clone().unwrap_or_else(|| decide_chain(&rule).to_string());
        let source_id = Id::from_raw(rule.abs_rule_number as u128);

        for slot in [Slot::Src, Slot::Dst, Slot::Srv] {
            if let Some(split) = self.split_slot(&rule, slot, &chain, source_id) {
                return split;
            }
        }
        vec![rule]
    }
}

/// Maps a stored policy action to its iptables target (`_print_rule.py`'s
/// `action_map` plus `_print_action_on_reject`'s `reject_map`, version-gated
/// where `icmp-admin-prohibited` requires iptables >= 1.2.9).
pub fn action_to_target(rule: &CompRule, version: EngineVersion) -> Target {
    match &rule.action {
        Action::Accept => Target::Accept,
        Action::Deny => Target::Drop,
        Action::Reject => Target::Reject {
            with: rule.options.action_on_reject.as_deref().map(|name| reject_with(name, version)),
        },
        Action::Return => Target::Return,
        Action::Continue | Action::Accounting | Action::Modify => Target::Continue,
        Action::Branch { target } => Target::Jump(target.clone()),
        Action::Pipe => Target::Queue,
        Action::Custom(text) => Target::Custom(text.clone()),
        Action::Translate => Target::Continue, // NAT-only action; never reached by the policy printer
    }
}

fn reject_with(name: &str, version: EngineVersion) -> String {
    match name {
        "host-unreachable" => "icmp-host-unreachable".to_string(),
        "net-unreachable" => "icmp-net-unreachable".to_string(),
        "port-unreachable" => "icmp-port-unreachable".to_string(),
        "proto-unreachable" => "icmp-proto-unreachable".to_string(),
        "net-prohibited" => "icmp-net-prohibited".to_string(),
        "host-prohibited" => "icmp-host-prohibited".to_string(),
        "admin-prohibited" if version >= ENGINE_VERSION_ICMP_ADMIN_PROHIBITED => {
            "icmp-admin-prohibited".to_string()
        }
        "admin-prohibited" => "icmp-host-prohibited".to_string(),
        "tcp-reset" => "tcp-reset".to_string(),
        other => other.to_string(),
    }
}

fn state_match(rule: &CompRule, version: EngineVersion) -> Option<Match> {
    if rule.options.stateless || rule.force_state_check {
        return None;
    }
    let states = match rule.options.extra.get("ct_state") {
        Some(states) => states.split(',').map(str::to_string).collect(),
        None => vec!["NEW".to_string()],
    };
    Some(Match::State {
        module: StateModule::gated(version),
        states,
    })
}

fn protocol_for(service: &Service) -> Option<Protocol> {
    match service {
        Service::Tcp(_) => Some(Protocol::Tcp),
        Service::Udp(_) => Some(Protocol::Udp),
        Service::Icmpv4(_) => Some(Protocol::Icmp),
        Service::Icmpv6(_) => Some(Protocol::Icmpv6),
        Service::IpProtocol(m) => Some(Protocol::Number(m.protocol)),
        _ => None,
    }
}

/// Builds the match clauses for one service, returning `None` when the
/// service can't be rendered at all (a tag/user service, out of scope for
/// the IPT backend).
fn service_matches(service: &Service) -> Vec<Match> {
    let mut out = Vec::new();
    if let Some(p) = protocol_for(service) {
        out.push(Match::Protocol(p));
    }
    match service {
        Service::Tcp(ports) | Service::Udp(ports) => {
            if let Some(sport) = &ports.sport {
                if !sport.is_any() {
                    out.push(Match::SourcePort(
                        sport.iter().map(ToString::to_string).collect::<Vec<_>>().join(","),
                    ));
                }
            }
            if let Some(dport) = &ports.dport {
                if !dport.is_any() {
                    out.push(Match::DestPort(
                        dport.iter().map(ToString::to_string).collect::<Vec<_>>().join(","),
                    ));
                }
            }
        }
        Service::Icmpv4(m) => {
            if let Some(ty) = m.ty() {
                let mut s = ty.to_string();
                if let Some(code) = m.code() {
                    s.push('/');
                    s.push_str(&code.to_string());
                }
                out.push(Match::IcmpType(s));
            }
        }
        Service::Icmpv6(m) => {
            if let Some(ty) = &m.ty {
                let mut s = ty.to_string();
                if let Some(code) = &m.code {
                    s.push('/');
                    s.push_str(&code.to_string());
                }
                out.push(Match::Icmpv6Type(s));
            }
        }
        _ => {}
    }
    out
}

/// Attempts the multiport optimization (§4.3): same protocol, <=15
/// services, no port ranges -> one `-m multiport --dports` match instead of
/// N separate rules.
fn try_multiport(services: &[&Service]) -> Option<Match> {
    use fwc_model::firewall::types::port::PortEntry;

    if services.len() <= 1 || services.len() > 15 {
        return None;
    }
    let all_tcp = services.iter().all(|s| matches!(s, Service::Tcp(_)));
    let all_udp = services.iter().all(|s| matches!(s, Service::Udp(_)));
    if !all_tcp && !all_udp {
        return None;
    }

    let mut dports = Vec::new();
    for s in services {
        let ports = match s {
            Service::Tcp(p) | Service::Udp(p) => p,
            _ => unreachable!(),
        };
        if ports.sport.is_some() {
            return None; // multiport can't combine distinct source *and* dest selectors here
        }
        let Some(dport) = &ports.dport else { return None };
        for entry in dport.iter() {
            match entry {
                PortEntry::Port(p) => dports.push(p.to_string()),
                PortEntry::Range(_, _) => return None,
            }
        }
    }
    Some(Match::Multiport { dports })
}

/// Stage 22 for the IPT backend: prints each atomized `CompRule` into one or
/// more physical iptables rules (more than one only when the rule's service
/// set can't be multiport-merged).
pub struct IptPrintProcessor {
    pub arena: SharedArena,
    pub version: EngineVersion,
    pub table: String,
}

impl IptPrintProcessor {
    fn build_common_matches(&self, rule: &CompRule) -> Vec<Match> {
        let mut matches = Vec::new();

        if let Some(id) = rule.slots.src.first() {
            if let Some(addr) = self.arena.addresses.get(id) {
                matches.push(Match::Source(Negatable {
                    value: addr.to_string(),
                    negate: rule.negations.get(Slot::Src),
                }));
            }
        }
        if let Some(id) = rule.slots.dst.first() {
            if let Some(addr) = self.arena.addresses.get(id) {
                matches.push(Match::Destination(Negatable {
                    value: addr.to_string(),
                    negate: rule.negations.get(Slot::Dst),
                }));
            }
        }
        // Interfaces live on `Device`, not `Arena` (they're name-keyed, not
        // `Id`-keyed); the driver resolves `rule.slots.itf` against the
        // compiling device's interface list and stores the rendered name in
        // `rule.iface_label` before handing the rule to this printer.
        if let Some(name) = &rule.iface_label {
            let flag = if rule.direction == Direction::Outbound {
                Match::OutInterface(Negatable { value: name.clone(), negate: rule.negations.get(Slot::Itf) })
            } else {
                Match::InInterface(Negatable { value: name.clone(), negate: rule.negations.get(Slot::Itf) })
            };
            matches.push(flag);
        }

        if let Some(m) = state_match(rule, self.version) {
            matches.push(m);
        }

        matches
    }

    pub fn print(&self, rule: &CompRule) -> Vec<IptRule> {
        let chain = rule.ipt_chain.clone().unwrap_or_else(|| decide_chain(rule).to_string());
        let target = action_to_target(rule, self.version);
        let base_matches = self.build_common_matches(rule);

        let services: Vec<&Service> = rule.slots.srv.iter().filter_map(|id| self.arena.services.get(id)).collect();

        if services.is_empty() {
            let mut r = IptRule::new(self.table.clone(), chain, target);
            r.matches = base_matches;
            return vec![r];
        }

        if let Some(multiport) = try_multiport(&services) {
            let mut r = IptRule::new(self.table.clone(), chain, target);
            r.matches = base_matches;
            if let Some(proto) = protocol_for(services[0]) {
                r.matches.push(Match::Protocol(proto));
            }
            r.matches.push(multiport);
            return vec![r];
        }

        services
            .into_iter()
            .map(|service| {
                let mut r = IptRule::new(self.table.clone(), chain.clone(), target.clone());
                r.matches = base_matches.clone();
                r.matches.extend(service_matches(service));
                r
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwc_model::firewall::types::rule::{Rule, RuleKind, RuleOptions};

    fn base_rule() -> CompRule {
        CompRule::from_rule(&Rule {
            kind: RuleKind::Policy,
            position: 1,
            label: String::new(),
            comment: String::new(),
            slots: Default::default(),
            negations: Default::default(),
            action: Action::Accept,
            direction: Direction::Inbound,
            disabled: false,
            fallback: false,
            hidden: false,
            options: RuleOptions::default(),
        })
    }

    #[test]
    fn decide_chain_follows_direction() {
        let mut r = base_rule();
        assert_eq!(decide_chain(&r), "INPUT");
        r.direction = Direction::Outbound;
        assert_eq!(decide_chain(&r), "OUTPUT");
        r.direction = Direction::Both;
        assert_eq!(decide_chain(&r), "FORWARD");
    }

    #[test]
    fn tmp_chain_names_are_stable_and_monotonic() {
        let mut namer = TmpChainNamer::new();
        let id = Id::from_raw(42);
        assert_eq!(namer.next(id), "C2a.0");
        assert_eq!(namer.next(id), "C2a.1");
    }

    #[test]
    fn negation_split_produces_three_rules() {
        let mut arena_free_rule = base_rule();
        let a = Id::from_raw(1);
        let b = Id::from_raw(2);
        arena_free_rule.slots.src = vec![a, b];
        arena_free_rule.negations.set(Slot::Src, true);

        let mut stage = NegationSplit { namer: TmpChainNamer::new() };
        let out = stage.process(arena_free_rule);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].action, Action::Branch { target: out[1].ipt_chain.clone().unwrap() });
        assert_eq!(out[1].action, Action::Return);
        assert!(out[2].final_rule);
    }

    #[test]
    fn reject_maps_admin_prohibited_by_version() {
        let old = EngineVersion::new(1, 2, 0, 0);
        let new = EngineVersion::new(1, 4, 20, 0);
        assert_eq!(reject_with("admin-prohibited", old), "icmp-host-prohibited");
        assert_eq!(reject_with("admin-prohibited", new), "icmp-admin-prohibited");
    }
}
