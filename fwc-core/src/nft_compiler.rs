//! Terminal pull-pipeline stage for the nftables backend (spec §4.5):
//! converts each atomized `CompRule` into one `fwc_nft::types::AddRule`
//! command. Address and service matches lean on `fwc-nft`'s `config-ext`
//! `From` impls (`IpList`/`PortList` -> `Expression`) instead of
//! hand-rolling payload offsets, since nftables' JSON schema already knows
//! how to express a set or range natively (no multiport-style folding
//! needed, unlike the IPT backend).

use fwc_model::firewall::types::address::{Family as AddrFamily, IpList};
use fwc_model::firewall::types::port::PortList;
use fwc_model::firewall::types::rule::{Action, Direction, Slot};
use fwc_model::firewall::types::rule_match::Service;

use fwc_nft::expression::{Ct, Expression, Meta, Payload};
use fwc_nft::statement::{Log, LogLevel, Match, Operator, Reject, RejectType, Statement};
use fwc_nft::types::{AddChain, AddRule, ChainType, Family, Hook, Policy};

use crate::comprule::CompRule;
use crate::generic::SharedArena;

/// Base chains an inet-family ruleset always declares, mirroring the IPT
/// backend's standard chains but hooked rather than pre-existing.
pub fn base_chains(table: &str) -> Vec<AddChain> {
    vec![
        AddChain::base(Family::Inet, table, "input", ChainType::Filter, Hook::Input, 0, Policy::Drop),
        AddChain::base(Family::Inet, table, "forward", ChainType::Filter, Hook::Forward, 0, Policy::Drop),
        AddChain::base(Family::Inet, table, "output", ChainType::Filter, Hook::Output, 0, Policy::Accept),
    ]
}

pub fn decide_chain(rule: &CompRule) -> &'static str {
    match rule.direction {
        Direction::Inbound => "input",
        Direction::Outbound => "output",
        Direction::Both | Direction::Undefined => "forward",
    }
}

fn ip_payload_field(family_hint: &str, dst: bool) -> Payload {
    Payload::field(family_hint, if dst { "daddr" } else { "saddr" })
}

/// Builds the `ip`/`ip6 saddr`/`daddr` match for one slot, picking the
/// payload protocol from the resolved address family. Mixed-family address
/// lists aren't supported by a single `Match` (nftables requires splitting
/// by family first); the driver is responsible for handing this stage
/// per-family-homogeneous `IpList`s (§4.2's `DropByAddressFamily` already
/// guarantees this upstream).
pub(crate) fn addr_match(list: &IpList, dst: bool, negate: bool) -> Option<Statement> {
    if list.is_empty() {
        return None;
    }
    let family = if list.iter().all(|e| e.family() == AddrFamily::V6) { "ip6" } else { "ip" };
    let left = Expression::from(ip_payload_field(family, dst));
    let right = Expression::from(list);
    let op = if negate { Operator::Ne } else { Operator::Eq };
    Some(Statement::Match(Match::new(op, left, right)))
}

fn port_match(list: &PortList, protocol: &str, dst: bool) -> Statement {
    let left = Expression::from(Payload::field(protocol, if dst { "dport" } else { "sport" }));
    let right = Expression::from(list);
    Statement::Match(Match::new_eq(left, right))
}

/// Builds every match statement a service contributes. The protocol itself
/// needs no separate `meta l4proto` match: the `tcp`/`udp`/`icmp`/`icmpv6`
/// payload prefix on the port/type matches already pins the protocol, and a
/// bare `IpProtocolMatch` with no ports or type selector contributes nothing
/// beyond what the driver's own protocol-split stage already guarantees.
pub(crate) fn service_matches(service: &Service) -> Vec<Statement> {
    let mut out = Vec::new();
    match service {
        Service::Tcp(ports) | Service::Udp(ports) => {
            let proto = if matches!(service, Service::Tcp(_)) { "tcp" } else { "udp" };
            if let Some(sport) = &ports.sport {
                if !sport.is_any() {
                    out.push(port_match(sport, proto, false));
                }
            }
            if let Some(dport) = &ports.dport {
                if !dport.is_any() {
                    out.push(port_match(dport, proto, true));
                }
            }
        }
        Service::Icmpv4(m) => {
            if let Some(ty) = m.ty() {
                let left = Expression::from(Payload::field("icmp", "type"));
                out.push(Statement::Match(Match::new_eq(left, Expression::from(ty))));
                if let Some(code) = m.code() {
                    let left = Expression::from(Payload::field("icmp", "code"));
                    out.push(Statement::Match(Match::new_eq(left, Expression::from(code))));
                }
            }
        }
        Service::Icmpv6(m) => {
            if let Some(ty) = &m.ty {
                let left = Expression::from(Payload::field("icmpv6", "type"));
                out.push(Statement::Match(Match::new_eq(left, Expression::from(ty))));
                if let Some(code) = &m.code {
                    let left = Expression::from(Payload::field("icmpv6", "code"));
                    out.push(Statement::Match(Match::new_eq(left, Expression::from(code))));
                }
            }
        }
        _ => {}
    }
    out
}

fn state_statement(rule: &CompRule) -> Option<Statement> {
    if rule.options.stateless || rule.force_state_check {
        return None;
    }
    let left = Expression::from(Ct::new("state", None::<fwc_nft::expression::IpFamily>));
    let right = match rule.options.extra.get("ct_state") {
        Some(states) => {
            let lowered: Vec<Expression> = states
                .split(',')
                .map(|s| Expression::String(s.trim().to_lowercase()))
                .collect();
            if lowered.len() == 1 {
                lowered.into_iter().next().unwrap()
            } else {
                Expression::Set(lowered)
            }
        }
        None => Expression::String("new".to_string()),
    };
    Some(Statement::Match(Match::new_eq(left, right)))
}

fn iface_match(name: &str, dst: bool, negate: bool) -> Statement {
    let left = Expression::from(Meta::new(if dst { "oifname" } else { "iifname" }));
    let right = Expression::from(name);
    let op = if negate { Operator::Ne } else { Operator::Eq };
    Statement::Match(Match::new(op, left, right))
}

/// Maps a policy's reject-with name (`_print_rule.py`'s `reject_map`) to the
/// nftables `reject` statement's `{type, expr}` pair. Unlike the IPT
/// backend's single rendered string, nftables separates the reject family
/// (`tcp reset`/`icmp`/`icmpv6`) from the specific code expression.
fn reject_type_for(name: Option<&str>) -> (Option<RejectType>, Option<Expression>) {
    match name {
        Some("tcp-reset") => (Some(RejectType::TcpRst), None),
        Some(code) if code.starts_with("host-") || code.starts_with("net-") || code.starts_with("port-")
            || code.starts_with("proto-") || code.starts_with("admin-") =>
        {
            (Some(RejectType::Icmp), Some(Expression::from(code)))
        }
        Some(other) => (Some(RejectType::Icmp), Some(Expression::from(other))),
        None => (Some(RejectType::IcmpX), None),
    }
}

fn action_statements(rule: &CompRule) -> Vec<Statement> {
    match &rule.action {
        Action::Accept | Action::Deny | Action::Return | Action::Continue | Action::Branch { .. } => {
            Statement::try_from(&rule.action).map(|s| vec![s]).unwrap_or_default()
        }
        Action::Reject => {
            let (ty, expr) = reject_type_for(rule.options.action_on_reject.as_deref());
            vec![Statement::from(Reject::new(ty, expr))]
        }
        _ => Vec::new(),
    }
}

fn log_statement(rule: &CompRule, chain: &str) -> Option<Statement> {
    if !rule.options.log {
        return None;
    }
    let level = rule
        .options
        .log_level
        .and_then(|lvl| LogLevel::try_from(lvl).ok())
        .unwrap_or(LogLevel::Warn);
    let prefix = rule.options.log_prefix.clone().unwrap_or_else(|| {
        Log::generate_prefix(None::<fwc_model::Id>, level, chain, &rule.action)
    });
    Some(Statement::from(Log::new_nflog(prefix, 1)))
}

/// Builds the full `AddRule` for one atomized policy `CompRule`.
pub struct NftPolicyPrintProcessor {
    pub arena: SharedArena,
    pub table: String,
}

impl NftPolicyPrintProcessor {
    pub fn print(&self, rule: &CompRule) -> AddRule {
        let chain = rule.ipt_chain.clone().unwrap_or_else(|| decide_chain(rule).to_string());
        let mut statements = Vec::new();

        if let Some(id) = rule.slots.src.first() {
            if let Some(addr) = self.arena.addresses.get(id) {
                let list: IpList = addr.as_ip_entry().into_iter().collect();
                if let Some(stmt) = addr_match(&list, false, rule.negations.get(Slot::Src)) {
                    statements.push(stmt);
                }
            }
        }
        if let Some(id) = rule.slots.dst.first() {
            if let Some(addr) = self.arena.addresses.get(id) {
                let list: IpList = addr.as_ip_entry().into_iter().collect();
                if let Some(stmt) = addr_match(&list, true, rule.negations.get(Slot::Dst)) {
                    statements.push(stmt);
                }
            }
        }
        // Interfaces live on `Device`, not `Arena` (name-keyed, not
        // `Id`-keyed); the driver resolves `rule.slots.itf` and stores the
        // rendered name in `rule.iface_label` before handing off the rule.
        if let Some(name) = &rule.iface_label {
            let dst = rule.direction == Direction::Outbound;
            statements.push(iface_match(name, dst, rule.negations.get(Slot::Itf)));
        }

        for id in &rule.slots.srv {
            if let Some(service) = self.arena.services.get(id) {
                statements.extend(service_matches(service));
            }
        }

        if let Some(stmt) = state_statement(rule) {
            statements.push(stmt);
        }
        if let Some(stmt) = log_statement(rule, &chain) {
            statements.push(stmt);
        }
        if !rule.comment.is_empty() {
            statements.push(Statement::Comment(rule.comment.clone()));
        }

        statements.extend(action_statements(rule));

        AddRule::new(Family::Inet, self.table.clone(), chain, statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decide_chain_follows_direction() {
        use fwc_model::firewall::types::rule::{Action as A, RuleKind, RuleOptions};

        let rule = CompRule::from_rule(&fwc_model::firewall::types::rule::Rule {
            kind: RuleKind::Policy,
            position: 1,
            label: String::new(),
            comment: String::new(),
            slots: Default::default(),
            negations: Default::default(),
            action: A::Accept,
            direction: Direction::Outbound,
            disabled: false,
            fallback: false,
            hidden: false,
            options: RuleOptions::default(),
        });
        assert_eq!(decide_chain(&rule), "output");
    }

    #[test]
    fn base_chains_cover_standard_hooks() {
        let chains = base_chains("filter");
        assert_eq!(chains.len(), 3);
    }

    #[test]
    fn reject_with_tcp_reset_maps_to_tcp_rst() {
        let (ty, expr) = reject_type_for(Some("tcp-reset"));
        assert!(matches!(ty, Some(RejectType::TcpRst)));
        assert!(expr.is_none());
    }

    #[test]
    fn reject_with_no_name_is_icmp_x() {
        let (ty, expr) = reject_type_for(None);
        assert!(matches!(ty, Some(RejectType::IcmpX)));
        assert!(expr.is_none());
    }
}
