//! Stage 19: shadow detection (spec §4.6). A `SlurpingProcessor` because
//! whether rule *j* is shadowed depends on every rule that precedes it in
//! the same chain, so nothing can be decided until the whole rule set for
//! one chain has been seen.

use std::rc::Rc;

use fwc_model::firewall::common::Arena;
use fwc_model::firewall::types::address::IpEntry;
use fwc_model::firewall::types::rule::{Action, Direction, Slot};
use fwc_model::firewall::types::rule_match::service_contains;
use fwc_model::Id;

use crate::comprule::CompRule;
use crate::diagnostics::DiagnosticSink;
use crate::processor::SlurpingStage;

pub struct DetectShadowing {
    pub arena: Rc<Arena>,
    pub diagnostics: Rc<std::cell::RefCell<DiagnosticSink>>,
    pub firewall: Id,
    pub ruleset: String,
    pub check_shading: bool,
}

impl DetectShadowing {
    fn addr_slot_contains(&self, shadowing: &[Id], shadowed: &[Id]) -> bool {
        if shadowing.is_empty() {
            return true; // "any" always shadows
        }
        if shadowed.is_empty() {
            return false; // a concrete set never shadows "any"
        }
        let to_entries = |ids: &[Id]| -> Option<Vec<IpEntry>> {
            ids.iter()
                .map(|id| self.arena.addresses.get(id).and_then(|a| a.as_ip_entry()))
                .collect()
        };
        let (Some(shadowing), Some(shadowed)) = (to_entries(shadowing), to_entries(shadowed)) else {
            // Non-literal addresses (DNS names, run-time groups, ...) are
            // never considered shadowing — the original only ever reasons
            // about resolved network-layer values.
            return false;
        };
        shadowed
            .iter()
            .all(|s| shadowing.iter().any(|earlier| earlier.contains(s)))
    }

    fn srv_slot_contains(&self, shadowing: &[Id], shadowed: &[Id]) -> bool {
        if shadowing.is_empty() {
            return true;
        }
        if shadowed.is_empty() {
            return false;
        }
        shadowed.iter().all(|s_id| {
            let Some(shadowed_srv) = self.arena.services.get(s_id) else {
                return false;
            };
            shadowing.iter().any(|e_id| {
                self.arena
                    .services
                    .get(e_id)
                    .is_some_and(|earlier_srv| service_contains(earlier_srv, shadowed_srv))
            })
        })
    }

    fn itf_slot_contains(&self, shadowing: &[Id], shadowed: &[Id]) -> bool {
        if shadowing.is_empty() {
            return true;
        }
        if shadowed.is_empty() {
            return false;
        }
        shadowed.iter().all(|s| shadowing.contains(s))
    }

    fn direction_contains(&self, shadowing: Direction, shadowed: Direction) -> bool {
        matches!(
            (shadowing, shadowed),
            (Direction::Both, _) | (Direction::Inbound, Direction::Inbound) | (Direction::Outbound, Direction::Outbound)
        )
    }

    /// Rules excluded from shadow detection altogether (§4.6): negated
    /// slots, non-terminating actions, fallback/hidden rules.
    fn eligible(&self, rule: &CompRule) -> bool {
        if rule.disabled || rule.fallback || rule.hidden {
            return false;
        }
        if rule.action.is_non_terminating() {
            return false;
        }
        for slot in [Slot::Src, Slot::Dst, Slot::Srv, Slot::Itf] {
            if rule.negations.get(slot) {
                return false;
            }
        }
        true
    }

    fn shadows(&self, earlier: &CompRule, later: &CompRule) -> bool {
        if earlier.ipt_chain != later.ipt_chain {
            return false;
        }
        if !self.direction_contains(earlier.direction, later.direction) {
            return false;
        }
        self.addr_slot_contains(&earlier.slots.src, &later.slots.src)
            && self.addr_slot_contains(&earlier.slots.dst, &later.slots.dst)
            && self.srv_slot_contains(&earlier.slots.srv, &later.slots.srv)
            && self.itf_slot_contains(&earlier.slots.itf, &later.slots.itf)
    }
}

impl SlurpingStage for DetectShadowing {
    fn name(&self) -> &'static str {
        "DetectShadowing"
    }

    fn process_all(&mut self, rules: Vec<CompRule>) -> Vec<CompRule> {
        if !self.check_shading {
            return rules;
        }
        for later_idx in 0..rules.len() {
            if !self.eligible(&rules[later_idx]) {
                continue;
            }
            for earlier_idx in 0..later_idx {
                if !self.eligible(&rules[earlier_idx]) {
                    continue;
                }
                if self.shadows(&rules[earlier_idx], &rules[later_idx]) {
                    self.diagnostics.borrow_mut().warn(
                        self.firewall,
                        self.ruleset.clone(),
                        rules[later_idx].abs_rule_number,
                        format!(
                            "rule #{} is shadowed by rule #{}",
                            rules[later_idx].abs_rule_number, rules[earlier_idx].abs_rule_number
                        ),
                    );
                    break;
                }
            }
        }
        rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwc_model::firewall::types::address::{Address, Ipv4Cidr};
    use fwc_model::firewall::types::rule::{Direction, Rule, RuleKind, RuleOptions};
    use std::net::Ipv4Addr;

    fn rule(position: u32, src: Vec<Id>, dst: Vec<Id>) -> CompRule {
        let mut r = CompRule::from_rule(&Rule {
            kind: RuleKind::Policy,
            position,
            label: String::new(),
            comment: String::new(),
            slots: Default::default(),
            negations: Default::default(),
            action: Action::Accept,
            direction: Direction::Both,
            disabled: false,
            fallback: false,
            hidden: false,
            options: RuleOptions::default(),
        });
        r.slots.src = src;
        r.slots.dst = dst;
        r.ipt_chain = Some("INPUT".to_string());
        r
    }

    #[test]
    fn wider_earlier_rule_shadows_narrower_later_rule() {
        let mut arena = Arena::new();
        let wide = arena.insert_address(Address::NetworkV4(Ipv4Cidr::new(Ipv4Addr::new(10, 0, 0, 0), 8).unwrap()));
        let narrow = arena.insert_address(Address::HostV4(Ipv4Addr::new(10, 1, 2, 3)));

        let detector = DetectShadowing {
            arena: Rc::new(arena),
            diagnostics: Rc::new(std::cell::RefCell::new(DiagnosticSink::new())),
            firewall: Id::generate(),
            ruleset: "Policy".to_string(),
            check_shading: true,
        };

        assert!(detector.addr_slot_contains(&[wide], &[narrow]));
        assert!(!detector.addr_slot_contains(&[narrow], &[wide]));
    }

    #[test]
    fn detect_shadowing_flags_second_rule() {
        let mut arena = Arena::new();
        let any_host = arena.insert_address(Address::HostV4(Ipv4Addr::new(1, 2, 3, 4)));
        let _ = any_host;

        let diag = Rc::new(std::cell::RefCell::new(DiagnosticSink::new()));
        let mut detector = DetectShadowing {
            arena: Rc::new(arena),
            diagnostics: diag.clone(),
            firewall: Id::generate(),
            ruleset: "Policy".to_string(),
            check_shading: true,
        };

        let r1 = rule(1, vec![], vec![]);
        let r2 = rule(2, vec![], vec![]);
        let out = detector.process_all(vec![r1, r2]);
        assert_eq!(out.len(), 2);
        assert_eq!(diag.borrow().diagnostics().len(), 1);
    }
}
