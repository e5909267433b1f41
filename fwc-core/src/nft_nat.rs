//! NFT NAT compiler (spec §4.5's "NFT policy + NAT compiler"): reuses
//! [`crate::ipt_nat::classify`]'s platform-agnostic rule-type table -
//! `_nat_compiler.py`'s `ClassifyNATRule` stage derives the same
//! `NatRuleType` from `tsrc`/`tdst`/`tsrv` regardless of backend - and
//! renders each classified rule as an nftables `snat`/`dnat`/`masquerade`/
//! `redirect` statement. No `NATPrintRule_nft` file exists anywhere in the
//! retrieved original sources for this backend, so the match-statement half
//! is built the same way `nft_compiler.rs`'s policy printer does it.

use fwc_model::firewall::types::address::IpList;
use fwc_model::firewall::types::device::Device;
use fwc_model::firewall::types::rule::NatRuleType;
use fwc_model::firewall::types::rule_match::Service;
use fwc_model::Id;

use fwc_nft::expression::Expression;
use fwc_nft::statement::{Nat, Statement};
use fwc_nft::types::{AddChain, AddRule, ChainType, Family, Hook, Policy};

use crate::comprule::CompRule;
use crate::generic::SharedArena;
use crate::ipt_nat::{classify, port_range, service_ports, NatDeviceContext};
use crate::nft_compiler::{addr_match, service_matches};

/// Base chains the `nat` table always declares: `prerouting`/`postrouting`
/// hooked at the priorities nftables reserves for source/destination NAT,
/// plus `output` for locally-generated DNAT, mirroring [`crate::ipt_nat::STANDARD_NAT_CHAINS`].
pub fn nat_base_chains(table: &str) -> Vec<AddChain> {
    vec![
        AddChain::base(Family::Inet, table, "prerouting", ChainType::Nat, Hook::Prerouting, -100, Policy::Accept),
        AddChain::base(Family::Inet, table, "output", ChainType::Nat, Hook::Output, -100, Policy::Accept),
        AddChain::base(Family::Inet, table, "postrouting", ChainType::Nat, Hook::Postrouting, 100, Policy::Accept),
    ]
}

/// Which `nat`-table chain a classified rule is installed in, the nftables
/// analogue of [`crate::ipt_nat::decide_chain`]'s `DecideOnChain` table.
pub fn decide_chain(rule_type: NatRuleType) -> &'static str {
    match rule_type {
        NatRuleType::Dnat | NatRuleType::DNetnat | NatRuleType::Redirect | NatRuleType::SDNat => "prerouting",
        NatRuleType::Snat | NatRuleType::SNetnat | NatRuleType::Masq | NatRuleType::Lb => "postrouting",
        NatRuleType::NoNat
        | NatRuleType::NatBranch
        | NatRuleType::Return
        | NatRuleType::Continue
        | NatRuleType::Skip => "output",
    }
}

fn nat_addr_expr(arena: &SharedArena, id: Option<Id>) -> Option<Expression> {
    let addr = arena.addresses.get(&id?)?;
    let entry = addr.as_ip_entry()?;
    Some(Expression::from(&entry))
}

fn nat_port_expr(srv: Option<&Service>, dst: bool) -> Option<Expression> {
    let (lo, hi) = service_ports(srv?, dst)?;
    port_range(lo, hi, '-')?;
    if lo == hi {
        Some(Expression::from(lo))
    } else {
        Some(Expression::Range(Box::new((Expression::from(lo), Expression::from(hi)))))
    }
}

/// Builds the verdict statement a classified NAT rule contributes - the
/// inline `snat to`/`dnat to`/`masquerade`/`redirect` nftables carries in
/// place of a separate target table entry, per spec.md §4.5.
fn nat_statement(rule: &CompRule, rule_type: NatRuleType, arena: &SharedArena) -> Option<Statement> {
    let tsrc = rule.slots.tsrc.first().copied();
    let tdst = rule.slots.tdst.first().copied();
    let tsrv = rule.slots.tsrv.first().and_then(|id| arena.services.get(id));

    match rule_type {
        NatRuleType::Masq => {
            let mut nat = Nat::default();
            if let Some(port) = nat_port_expr(tsrv, false) {
                nat.port = Some(port);
            }
            Some(Statement::masquerade(nat))
        }
        NatRuleType::Snat | NatRuleType::SNetnat => {
            let mut nat = Nat::to_addr(nat_addr_expr(arena, tsrc)?);
            if let Some(port) = nat_port_expr(tsrv, false) {
                nat.port = Some(port);
            }
            Some(Statement::snat(nat))
        }
        NatRuleType::Dnat | NatRuleType::SDNat | NatRuleType::DNetnat => {
            let mut nat = Nat::to_addr(nat_addr_expr(arena, tdst)?);
            if let Some(port) = nat_port_expr(tsrv, true) {
                nat.port = Some(port);
            }
            Some(Statement::dnat(nat))
        }
        NatRuleType::Redirect => {
            let mut nat = Nat::default();
            if let Some(port) = nat_port_expr(tsrv, true) {
                nat.port = Some(port);
            }
            Some(Statement::redirect(nat))
        }
        NatRuleType::Return => Some(Statement::make_return()),
        NatRuleType::NatBranch => rule.ipt_target.clone().map(Statement::jump),
        NatRuleType::Continue | NatRuleType::NoNat | NatRuleType::Skip | NatRuleType::Lb => None,
    }
}

/// Builds the full `AddRule` for one atomized NAT `CompRule`, matching on
/// `osrc`/`odst`/`osrv` the same way [`crate::ipt_nat::IptNatPrintProcessor`]
/// does, and appending the translated-address verdict statement.
pub struct NftNatPrintProcessor {
    pub arena: SharedArena,
    pub device: NatDeviceContext,
    pub table: String,
}

impl NftNatPrintProcessor {
    pub fn new(arena: SharedArena, device: &Device, table: impl Into<String>) -> Self {
        Self { arena, device: NatDeviceContext::new(device), table: table.into() }
    }

    pub fn print(&self, rule: &CompRule) -> AddRule {
        let rule_type = classify(rule, &self.arena, &self.device);
        let chain = rule.ipt_chain.clone().unwrap_or_else(|| decide_chain(rule_type).to_string());
        let mut statements = Vec::new();

        if let Some(id) = rule.slots.osrc.first() {
            if let Some(addr) = self.arena.addresses.get(id) {
                let list: IpList = addr.as_ip_entry().into_iter().collect();
                if let Some(stmt) = addr_match(&list, false, rule.src_single_object_negation) {
                    statements.push(stmt);
                }
            }
        }
        if let Some(id) = rule.slots.odst.first() {
            if let Some(addr) = self.arena.addresses.get(id) {
                let list: IpList = addr.as_ip_entry().into_iter().collect();
                if let Some(stmt) = addr_match(&list, true, rule.dst_single_object_negation) {
                    statements.push(stmt);
                }
            }
        }
        for id in &rule.slots.osrv {
            if let Some(service) = self.arena.services.get(id) {
                statements.extend(service_matches(service));
            }
        }

        if let Some(stmt) = nat_statement(rule, rule_type, &self.arena) {
            statements.push(stmt);
        }

        AddRule::new(Family::Inet, self.table.clone(), chain, statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwc_model::firewall::common::Arena;
    use fwc_model::firewall::types::address::Address;
    use fwc_model::firewall::types::device::{EngineVersion, FirewallOptions, Kind, Platform};
    use fwc_model::firewall::types::interface::Interface;
    use fwc_model::firewall::types::rule::{Action, Direction, Rule, RuleKind, RuleOptions};
    use std::net::Ipv4Addr;

    fn test_device() -> Device {
        Device {
            id: Id::generate(),
            name: "test-fw".to_string(),
            kind: Kind::Firewall,
            interfaces: vec![Interface::new("eth0")],
            rule_sets: Vec::new(),
            platform: Platform::Nft,
            version: EngineVersion::default(),
            options: FirewallOptions::default(),
        }
    }

    fn make_rule() -> CompRule {
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

    #[test]
    fn decide_chain_routes_snat_to_postrouting() {
        assert_eq!(decide_chain(NatRuleType::Snat), "postrouting");
        assert_eq!(decide_chain(NatRuleType::Dnat), "prerouting");
        assert_eq!(decide_chain(NatRuleType::Redirect), "prerouting");
    }

    #[test]
    fn nat_base_chains_cover_all_three_hooks() {
        let chains = nat_base_chains("nat");
        assert_eq!(chains.len(), 3);
    }

    #[test]
    fn print_emits_snat_statement_for_snat_rule() {
        let mut arena = Arena::new();
        let tsrc = arena.insert_address(Address::HostV4(Ipv4Addr::new(203, 0, 113, 9)));
        let device = test_device();
        let mut rule = make_rule();
        rule.slots.tsrc = vec![tsrc];

        let printer = NftNatPrintProcessor::new(std::rc::Rc::new(arena), &device, "nat");
        let add_rule = printer.print(&rule);
        assert_eq!(add_rule.chain, "postrouting");
        let rendered = format!("{:?}", add_rule.expr);
        assert!(rendered.contains("Snat"));
    }

    #[test]
    fn print_emits_masquerade_for_dynamic_interface_tsrc() {
        let arena: SharedArena = std::rc::Rc::new(Arena::new());
        let mut device = test_device();
        device.interfaces[0].dynamic = true;
        let iface_id = device.interfaces[0].id;
        let mut rule = make_rule();
        rule.slots.tsrc = vec![iface_id];

        let printer = NftNatPrintProcessor::new(arena, &device, "nat");
        let add_rule = printer.print(&rule);
        let rendered = format!("{:?}", add_rule.expr);
        assert!(rendered.contains("Masquerade"));
    }
}
