//! Platform-independent pipeline stages shared by the IPT and NFT backends
//! (spec §4.2, stages 2-21; stage 1 is `processor::Begin`, stage 22 is
//! platform-specific and lives in `ipt_policy`/`nft_compiler`).

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use fwc_model::firewall::common::Arena;
use fwc_model::firewall::types::address::{Address, Family};
use fwc_model::firewall::types::group::{Group, GroupKind};
use fwc_model::firewall::types::rule::{Action, AddressFamily, Direction, Slot};
use fwc_model::firewall::types::rule_match::Service;
use fwc_model::Id;

use crate::comprule::CompRule;
use crate::diagnostics::DiagnosticSink;
use crate::processor::{SlurpingStage, Stage};

pub type SharedArena = Rc<Arena>;

/// Stage 2: keeps only the rule at `target_position`, when the driver was
/// asked to recompile a single rule (spec §4.2 stage 2, the "single rule
/// compile mode" the original policy compiler supports for incremental
/// recompiles).
pub struct SingleRuleFilter {
    pub target_position: Option<u32>,
}

impl Stage for SingleRuleFilter {
    fn name(&self) -> &'static str {
        "SingleRuleFilter"
    }

    fn process(&mut self, rule: CompRule) -> Vec<CompRule> {
        match self.target_position {
            Some(pos) if rule.abs_rule_number != pos => Vec::new(),
            _ => vec![rule],
        }
    }
}

/// Stage 2b: drops disabled rules outright; they never reach the backend.
pub struct SkipDisabledRules;

impl Stage for SkipDisabledRules {
    fn name(&self) -> &'static str {
        "SkipDisabledRules"
    }

    fn process(&mut self, rule: CompRule) -> Vec<CompRule> {
        if rule.disabled {
            Vec::new()
        } else {
            vec![rule]
        }
    }
}

/// Stage 3: records the action as it was written in the rule set, before any
/// later stage rewrites `action` (logging sub-chains, negation splits).
pub struct StoreAction;

impl Stage for StoreAction {
    fn name(&self) -> &'static str {
        "StoreAction"
    }

    fn process(&mut self, mut rule: CompRule) -> Vec<CompRule> {
        rule.stored_action = Some(format!("{:?}", rule.action));
        vec![rule]
    }
}

/// Stage 4: a rule with no explicit `direction=` option is `Both`; interfaces
/// that are inherently one-directional narrow it here so later stages never
/// see `Direction::Undefined`.
pub struct InterfaceAndDirection;

impl Stage for InterfaceAndDirection {
    fn name(&self) -> &'static str {
        "InterfaceAndDirection"
    }

    fn process(&mut self, mut rule: CompRule) -> Vec<CompRule> {
        if rule.direction == Direction::Undefined {
            rule.direction = Direction::Both;
        }
        vec![rule]
    }
}

/// Stage 5: a `Both`-direction rule with a concrete (non-"any") interface
/// slot is split into one `Inbound` and one `Outbound` copy, since IPT/NFT
/// chains are direction-specific once an interface is named.
pub struct SplitOnDirectionBoth;

impl Stage for SplitOnDirectionBoth {
    fn name(&self) -> &'static str {
        "SplitOnDirectionBoth"
    }

    fn process(&mut self, rule: CompRule) -> Vec<CompRule> {
        if rule.direction != Direction::Both || rule.is_itf_any() {
            return vec![rule];
        }
        let mut inbound = rule.clone_fresh();
        inbound.direction = Direction::Inbound;
        let mut outbound = rule;
        outbound.direction = Direction::Outbound;
        vec![inbound, outbound]
    }
}

/// Stage 6: resolves compile-time multi-address objects (address-table
/// files, compile-time DNS names) to their already-interned literal address
/// ids, substituting them into every slot that named the marker. The actual
/// file/DNS I/O and arena interning is a `Preprocessor` collaborator's job
/// (§6.1); `resolved` is the marker-id -> literal-ids table it built, so the
/// pipeline itself performs no I/O.
pub struct ResolveMultiAddress {
    pub resolved: Rc<HashMap<Id, Vec<Id>>>,
    pub arena: SharedArena,
}

impl ResolveMultiAddress {
    fn is_compile_time_multi(&self, id: Id) -> bool {
        matches!(self.arena.addresses.get(&id), Some(addr) if addr.is_compile_time_multi())
    }
}

impl Stage for ResolveMultiAddress {
    fn name(&self) -> &'static str {
        "ResolveMultiAddress"
    }

    fn process(&mut self, mut rule: CompRule) -> Vec<CompRule> {
        for slot in [Slot::Src, Slot::Dst, Slot::OSrc, Slot::ODst, Slot::TSrc, Slot::TDst] {
            let ids = rule.slots.get(slot).clone();
            if !ids.iter().any(|id| self.is_compile_time_multi(*id)) {
                continue;
            }
            let mut out = Vec::with_capacity(ids.len());
            for id in ids {
                if !self.is_compile_time_multi(id) {
                    out.push(id);
                    continue;
                }
                match self.resolved.get(&id) {
                    Some(literal_ids) => out.extend(literal_ids.iter().copied()),
                    None => log::warn!("rule {}: multi-address {id} left unresolved", rule.abs_rule_number),
                }
            }
            *rule.slots.get_mut(slot) = out;
        }
        vec![rule]
    }
}

/// Stage 7: a group with zero (possibly recursively empty) members is either
/// dropped with a warning or treated as a hard error, per
/// `ignore_empty_groups` (§6.3).
pub struct EmptyGroupsCheck {
    pub arena: SharedArena,
    pub ignore_empty_groups: bool,
    pub firewall: Id,
}

impl EmptyGroupsCheck {
    fn group_is_empty(&self, id: Id, seen: &mut HashSet<Id>) -> bool {
        if !seen.insert(id) {
            return true; // a cycle with nothing else resolves to "empty"
        }
        match self.arena.groups.get(&id) {
            Some(group) => group
                .members
                .iter()
                .all(|member| self.arena.groups.contains_key(member) && self.group_is_empty(*member, seen)),
            None => false,
        }
    }
}

impl Stage for EmptyGroupsCheck {
    fn name(&self) -> &'static str {
        "EmptyGroupsCheck"
    }

    fn process(&mut self, mut rule: CompRule) -> Vec<CompRule> {
        let mut empty = false;
        for slot in [Slot::Src, Slot::Dst, Slot::Srv, Slot::Itf] {
            for id in rule.slots.get(slot).clone() {
                if self.arena.groups.contains_key(&id) {
                    let mut seen = HashSet::new();
                    if self.group_is_empty(id, &mut seen) {
                        empty = true;
                    }
                }
            }
        }
        if empty {
            if self.ignore_empty_groups {
                log::debug!("rule {}: dropped, references an empty group", rule.abs_rule_number);
                rule.has_empty_re = true;
            } else {
                log::warn!("rule {}: references an empty group", rule.abs_rule_number);
            }
        }
        let _ = self.firewall;
        vec![rule]
    }
}

/// Stage 8: recursively replaces group `Id`s in every slot with their leaf
/// member `Id`s. Cycle-safe via a per-call visited set, the location named
/// by `Group`'s own doc comment.
pub struct ExpandGroups {
    pub arena: SharedArena,
}

/// Sort key for a leaf after group expansion (spec §4.2 stage 8: "leaves are
/// then sorted by name"). Neither `Address` nor `Service` carries a stored
/// name field, so the rendered display text stands in for it - `Address`
/// already has one, `Service` falls back to its `Debug` form, and an id
/// absent from both arenas (shouldn't happen for a well-formed model) sorts
/// by its own hex text.
fn leaf_sort_key(arena: &Arena, id: Id) -> String {
    if let Some(addr) = arena.addresses.get(&id) {
        return addr.to_string();
    }
    if let Some(srv) = arena.services.get(&id) {
        return format!("{srv:?}");
    }
    id.to_string()
}

pub fn expand_groups(arena: &Arena, ids: &[Id]) -> Vec<Id> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    let mut stack: Vec<Id> = ids.iter().rev().copied().collect();
    while let Some(id) = stack.pop() {
        match arena.groups.get(&id) {
            Some(group) if seen.insert(id) => {
                for member in group.members.iter().rev() {
                    stack.push(*member);
                }
            }
            Some(_) => {} // cycle back to an already-expanded group: skip
            None => out.push(id),
        }
    }
    out.sort_by_key(|id| leaf_sort_key(arena, *id));
    out
}

impl Stage for ExpandGroups {
    fn name(&self) -> &'static str {
        "ExpandGroups"
    }

    fn process(&mut self, mut rule: CompRule) -> Vec<CompRule> {
        for slot in [
            Slot::Src,
            Slot::Dst,
            Slot::Srv,
            Slot::Itf,
            Slot::OSrc,
            Slot::ODst,
            Slot::OSrv,
            Slot::TSrc,
            Slot::TDst,
            Slot::TSrv,
        ] {
            let expanded = expand_groups(&self.arena, rule.slots.get(slot));
            *rule.slots.get_mut(slot) = expanded;
        }
        vec![rule]
    }
}

/// Stage 9: rules marked empty by stage 7 are dropped here rather than
/// in-place, so stage 7 stays a pure annotation pass.
pub struct DropRulesWithEmptyRe;

impl Stage for DropRulesWithEmptyRe {
    fn name(&self) -> &'static str {
        "DropRulesWithEmptyRE"
    }

    fn process(&mut self, rule: CompRule) -> Vec<CompRule> {
        if rule.has_empty_re {
            Vec::new()
        } else {
            vec![rule]
        }
    }
}

fn dedup_preserve_order(ids: &mut Vec<Id>) {
    let mut seen = HashSet::new();
    ids.retain(|id| seen.insert(*id));
}

/// Stage 10: duplicate object references within one slot (possible after
/// group expansion, when two groups share a member) are collapsed.
pub struct EliminateDuplicates;

impl Stage for EliminateDuplicates {
    fn name(&self) -> &'static str {
        "EliminateDuplicatesInSRC/DST/SRV"
    }

    fn process(&mut self, mut rule: CompRule) -> Vec<CompRule> {
        for slot in [Slot::Src, Slot::Dst, Slot::Srv] {
            dedup_preserve_order(rule.slots.get_mut(slot));
        }
        vec![rule]
    }
}

/// Stage 11: a `Reject` action with no per-rule `action_on_reject` picks up
/// the firewall-wide default (§6.3).
pub struct FillActionOnReject {
    pub default_action_on_reject: String,
}

impl Stage for FillActionOnReject {
    fn name(&self) -> &'static str {
        "FillActionOnReject"
    }

    fn process(&mut self, mut rule: CompRule) -> Vec<CompRule> {
        if rule.action == Action::Reject && rule.options.action_on_reject.is_none() {
            rule.options.action_on_reject = Some(self.default_action_on_reject.clone());
        }
        vec![rule]
    }
}

/// Stage 12: a rule set compiled for one address family drops individual
/// addresses of the other family out of its address slots, drops ICMPv4
/// services on a v6 pass (and ICMPv6 services on a v4 pass) out of `srv`,
/// and drops the whole rule if any of those slots went from non-empty to
/// empty as a result.
pub struct DropByAddressFamily {
    pub family: AddressFamily,
    pub arena: SharedArena,
}

impl DropByAddressFamily {
    fn address_matches(&self, id: Id) -> bool {
        match self.arena.addresses.get(&id).and_then(Address::family) {
            None => true,
            Some(Family::V4) => self.family != AddressFamily::V6,
            Some(Family::V6) => self.family != AddressFamily::V4,
        }
    }

    fn service_matches(&self, id: Id) -> bool {
        match self.arena.services.get(&id) {
            Some(Service::Icmpv4(_)) => self.family != AddressFamily::V6,
            Some(Service::Icmpv6(_)) => self.family != AddressFamily::V4,
            _ => true,
        }
    }

    /// Filters a slot's ids by `keep`, reporting whether the slot named at
    /// least one id and ended up with none - the condition that drops the
    /// whole rule.
    fn filter_slot(ids: &mut Vec<Id>, keep: impl Fn(Id) -> bool) -> bool {
        if ids.is_empty() {
            return false;
        }
        ids.retain(|id| keep(*id));
        ids.is_empty()
    }
}

impl Stage for DropByAddressFamily {
    fn name(&self) -> &'static str {
        "DropRulesByAddressFamily"
    }

    fn process(&mut self, mut rule: CompRule) -> Vec<CompRule> {
        if self.family == AddressFamily::Both {
            return vec![rule];
        }

        let mut went_empty = false;
        for slot in [Slot::Src, Slot::Dst, Slot::OSrc, Slot::ODst, Slot::TSrc, Slot::TDst] {
            if Self::filter_slot(rule.slots.get_mut(slot), |id| self.address_matches(id)) {
                went_empty = true;
            }
        }
        if Self::filter_slot(&mut rule.slots.srv, |id| self.service_matches(id)) {
            went_empty = true;
        }

        if went_empty {
            Vec::new()
        } else {
            vec![rule]
        }
    }
}

/// Stage 13: drops an interface from the `itf` slot when it carries no
/// address in the current pass's family, then drops the whole rule if that
/// emptied a slot that had named at least one interface. An interface with
/// no configured addresses at all (or one the compiling device doesn't
/// know about) has nothing to check against and always matches, mirroring
/// `DropByAddressFamily`'s "unknown id always matches" rule above.
pub struct CheckInterfaceAgainstAF {
    pub family: AddressFamily,
    pub iface_families: HashMap<Id, (bool, bool)>,
}

impl CheckInterfaceAgainstAF {
    pub fn new(device: &fwc_model::firewall::types::device::Device, family: AddressFamily) -> Self {
        let iface_families = device
            .interfaces
            .iter()
            .map(|iface| {
                let has_v4 = iface.addresses.iter().any(|a| a.family() == Some(Family::V4));
                let has_v6 = iface.addresses.iter().any(|a| a.family() == Some(Family::V6));
                (iface.id, (has_v4, has_v6))
            })
            .collect();
        Self { family, iface_families }
    }

    fn matches(&self, id: Id) -> bool {
        match self.iface_families.get(&id) {
            None => true,
            Some((false, false)) => true,
            Some((has_v4, has_v6)) => match self.family {
                AddressFamily::Both => true,
                AddressFamily::V4 => *has_v4,
                AddressFamily::V6 => *has_v6,
            },
        }
    }
}

impl Stage for CheckInterfaceAgainstAF {
    fn name(&self) -> &'static str {
        "CheckInterfaceAgainstAF"
    }

    fn process(&mut self, mut rule: CompRule) -> Vec<CompRule> {
        if self.family == AddressFamily::Both || rule.slots.itf.is_empty() {
            return vec![rule];
        }
        rule.slots.itf.retain(|id| self.matches(*id));
        if rule.slots.itf.is_empty() {
            Vec::new()
        } else {
            vec![rule]
        }
    }
}

/// Stage 14: splits a rule naming several interfaces into one rule per
/// interface — IPT/NFT rules only ever match one interface at a time.
pub struct AtomizeForInterfaces;

impl Stage for AtomizeForInterfaces {
    fn name(&self) -> &'static str {
        "AtomizeForInterfaces"
    }

    fn process(&mut self, rule: CompRule) -> Vec<CompRule> {
        if rule.slots.itf.len() <= 1 {
            return vec![rule];
        }
        rule.slots
            .itf
            .clone()
            .into_iter()
            .map(|itf| {
                let mut r = rule.clone_fresh();
                r.slots.itf = vec![itf];
                r
            })
            .collect()
    }
}

/// Resolves the atomized single `itf` slot (guaranteed by
/// `AtomizeForInterfaces` above) against the compiling device's interface
/// list, rendering `rule.iface_label` — `-i`/`-o`/`iifname`/`oifname`'s
/// printers never see the raw `Id`, only this already-resolved name. Device
/// interfaces aren't arena-stored (they're name-keyed, §3.1), so this stage
/// needs the `Device` directly rather than pulling from `Arena`.
pub struct ResolveInterfaceLabel {
    pub interfaces_by_id: HashMap<Id, String>,
}

impl ResolveInterfaceLabel {
    pub fn new(device: &fwc_model::firewall::types::device::Device) -> Self {
        Self {
            interfaces_by_id: device.interfaces.iter().map(|i| (i.id, i.ipt_name())).collect(),
        }
    }
}

impl Stage for ResolveInterfaceLabel {
    fn name(&self) -> &'static str {
        "ResolveInterfaceLabel"
    }

    fn process(&mut self, mut rule: CompRule) -> Vec<CompRule> {
        if let Some(id) = rule.slots.itf.first() {
            rule.iface_label = self.interfaces_by_id.get(id).cloned();
        }
        vec![rule]
    }
}

/// Stage 16: partitions the service slot by IP protocol number and fans out
/// one rule per partition - IPT/NFT services can only ever match one
/// protocol per physical rule. NFT's one exception: when the partitions are
/// exactly `{TCP, UDP}` and every partition has the same port set, the fan
/// out is skipped, `merged_tcp_udp` is set, and the original (unpartitioned)
/// rule is kept so the NFT printer can emit a single `meta l4proto { tcp,
/// udp }` rule instead of two.
pub struct GroupServicesByProtocol {
    pub arena: SharedArena,
    pub nft: bool,
}

impl GroupServicesByProtocol {
    fn ports_key(&self, id: &Id) -> Option<(Option<Vec<u16>>, Option<Vec<u16>>)> {
        use fwc_model::firewall::types::port::PortEntry;
        let ports = match self.arena.services.get(id) {
            Some(Service::Tcp(p)) | Some(Service::Udp(p)) => p,
            _ => return None,
        };
        let flatten = |list: &Option<Vec<PortEntry>>| {
            list.as_ref().map(|entries| {
                entries
                    .iter()
                    .flat_map(|e| match e {
                        PortEntry::Port(p) => vec![*p],
                        PortEntry::Range(a, b) => vec![*a, *b],
                    })
                    .collect::<Vec<_>>()
            })
        };
        Some((flatten(&ports.sport), flatten(&ports.dport)))
    }

    /// True when `srv`'s services partition into exactly TCP and UDP with
    /// identical port sets on both sides - the one case NFT folds back into
    /// a single rule instead of fanning out.
    fn is_merged_tcp_udp(&self, protocols: &HashMap<Option<u8>, Vec<Id>>) -> bool {
        if !self.nft || protocols.len() != 2 {
            return false;
        }
        let tcp = protocols.get(&Some(6));
        let udp = protocols.get(&Some(17));
        let (Some(tcp), Some(udp)) = (tcp, udp) else { return false };
        let tcp_ports: HashSet<_> = tcp.iter().filter_map(|id| self.ports_key(id)).collect();
        let udp_ports: HashSet<_> = udp.iter().filter_map(|id| self.ports_key(id)).collect();
        !tcp_ports.is_empty() && tcp_ports == udp_ports
    }
}

impl Stage for GroupServicesByProtocol {
    fn name(&self) -> &'static str {
        "GroupServicesByProtocol"
    }

    fn process(&mut self, mut rule: CompRule) -> Vec<CompRule> {
        if rule.do_not_optimize_by_srv || rule.slots.srv.len() <= 1 {
            return vec![rule];
        }

        let mut protocols: HashMap<Option<u8>, Vec<Id>> = HashMap::new();
        for id in &rule.slots.srv {
            protocols
                .entry(self.arena.services.get(id).and_then(|s| s.ip_protocol_number()))
                .or_default()
                .push(*id);
        }

        if protocols.len() <= 1 {
            return vec![rule];
        }

        if self.is_merged_tcp_udp(&protocols) {
            rule.merged_tcp_udp = true;
            return vec![rule];
        }

        let mut partitions: Vec<Vec<Id>> = protocols.into_values().collect();
        partitions.sort_by_key(|ids| ids.iter().min().copied());
        partitions
            .into_iter()
            .map(|ids| {
                let mut r = rule.clone_fresh();
                r.slots.srv = ids;
                r
            })
            .collect()
    }
}

pub struct SeparatePortRanges {
    pub arena: SharedArena,
}

impl Stage for SeparatePortRanges {
    fn name(&self) -> &'static str {
        "SeparatePortRanges"
    }

    fn process(&mut self, rule: CompRule) -> Vec<CompRule> {
        use fwc_model::firewall::types::rule_match::Service;

        let has_range = |id: &Id| {
            matches!(
                self.arena.services.get(id),
                Some(Service::Tcp(p)) | Some(Service::Udp(p))
                    if p.sport.as_ref().is_some_and(|l| l.len() > 1 || l.iter().any(|e| !matches!(e, fwc_model::firewall::types::port::PortEntry::Port(_))))
                        || p.dport.as_ref().is_some_and(|l| l.len() > 1 || l.iter().any(|e| !matches!(e, fwc_model::firewall::types::port::PortEntry::Port(_))))
            )
        };

        if rule.slots.srv.len() <= 1 || !rule.slots.srv.iter().any(has_range) {
            return vec![rule];
        }

        let (ranged, discrete): (Vec<Id>, Vec<Id>) = rule.slots.srv.iter().copied().partition(|id| has_range(id));
        let mut out = Vec::new();
        if !discrete.is_empty() {
            let mut r = rule.clone_fresh();
            r.slots.srv = discrete;
            out.push(r);
        }
        for id in ranged {
            let mut r = rule.clone_fresh();
            r.slots.srv = vec![id];
            out.push(r);
        }
        out
    }
}

/// Stage 18: splits a rule naming several concrete source/destination
/// addresses into one rule per (src, dst) pair, mirroring the IPT/NFT
/// single-address-per-rule match grammar.
pub struct AtomizeForAddresses;

impl Stage for AtomizeForAddresses {
    fn name(&self) -> &'static str {
        "AtomizeForAddresses"
    }

    fn process(&mut self, rule: CompRule) -> Vec<CompRule> {
        let srcs = if rule.slots.src.is_empty() {
            vec![None]
        } else {
            rule.slots.src.iter().copied().map(Some).collect()
        };
        let dsts = if rule.slots.dst.is_empty() {
            vec![None]
        } else {
            rule.slots.dst.iter().copied().map(Some).collect()
        };
        if srcs.len() == 1 && dsts.len() == 1 {
            return vec![rule];
        }

        let mut out = Vec::with_capacity(srcs.len() * dsts.len());
        for src in &srcs {
            for dst in &dsts {
                let mut r = rule.clone_fresh();
                r.slots.src = src.into_iter().collect();
                r.slots.dst = dst.into_iter().collect();
                out.push(r);
            }
        }
        out
    }
}

/// Stage: assigns the final absolute rule number used by diagnostics and by
/// shadow detection's "earlier rule shadows later rule" ordering, after all
/// splitting/atomizing stages may have multiplied the original rule count.
pub struct AssignUniqueRuleId {
    next: u32,
}

impl AssignUniqueRuleId {
    pub fn new() -> Self {
        Self { next: 1 }
    }
}

impl Default for AssignUniqueRuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for AssignUniqueRuleId {
    fn name(&self) -> &'static str {
        "AssignUniqueRuleId"
    }

    fn process(&mut self, mut rule: CompRule) -> Vec<CompRule> {
        rule.parent_rule_num.get_or_insert(rule.abs_rule_number);
        rule.abs_rule_number = self.next;
        self.next += 1;
        vec![rule]
    }
}

/// Approximates the "final rendered text" spec §4.2 stage 20 hashes, without
/// actually invoking a backend printer (generic stages stay printer-agnostic,
/// §6.1). Collects every field a printer would turn into text: chain,
/// action, direction, negated slots, interface label and the slot contents
/// themselves. Two rules that differ only in `abs_rule_number` or other
/// pipeline bookkeeping still collapse to the same key, same as two
/// genuinely-identical printed lines would.
fn emitted_text_key(rule: &CompRule) -> String {
    format!(
        "{:?}|{:?}|{:?}|{:?}|{:?}|src={:?}|dst={:?}|srv={:?}|itf={:?}|osrc={:?}|odst={:?}|osrv={:?}|tsrc={:?}|tdst={:?}|tsrv={:?}|neg={:?}|merged={}",
        rule.ipt_chain,
        rule.action,
        rule.direction,
        rule.iface_label,
        rule.nat_rule_type,
        rule.slots.src,
        rule.slots.dst,
        rule.slots.srv,
        rule.slots.itf,
        rule.slots.osrc,
        rule.slots.odst,
        rule.slots.osrv,
        rule.slots.tsrc,
        rule.slots.tdst,
        rule.slots.tsrv,
        rule.negations,
        rule.merged_tcp_udp,
    )
}

/// Stage 20: drops a rule whose emitted-text key matches the immediately
/// preceding rule's (P4: "no two consecutive output rules are textually
/// identical"). Non-consecutive duplicates are left alone - two identical
/// rules in different chains, or separated by an unrelated rule, are not the
/// redundant "same rule written twice" case this stage targets.
pub struct DeduplicateByEmittedText;

impl SlurpingStage for DeduplicateByEmittedText {
    fn name(&self) -> &'static str {
        "DeduplicateByEmittedText"
    }

    fn process_all(&mut self, rules: Vec<CompRule>) -> Vec<CompRule> {
        let mut out: Vec<CompRule> = Vec::with_capacity(rules.len());
        let mut last_key: Option<String> = None;
        for rule in rules {
            let key = emitted_text_key(&rule);
            if last_key.as_deref() == Some(key.as_str()) {
                continue;
            }
            last_key = Some(key);
            out.push(rule);
        }
        out
    }
}

/// Standard entry/hook chains every backend pre-registers — a `Branch` to
/// one of these is never "undeclared", unlike a branch to a custom chain
/// that no rule's `ipt_chain` ever names.
const STANDARD_CHAINS: &[&str] =
    &["INPUT", "OUTPUT", "FORWARD", "PREROUTING", "POSTROUTING", "input", "output", "forward", "prerouting", "postrouting"];

/// Stage 21: tallies how many rules branch to each chain (spec §4.2 stage
/// 21), so a printer can tell a used custom chain from dead output, and
/// flags the P3 violation the tally makes visible: a `Branch` naming a chain
/// no rule in this pass ever declares. A pure bookkeeping pass otherwise - it
/// never drops or reorders a rule.
pub struct CountChainUsage {
    pub chain_usage: Rc<std::cell::RefCell<HashMap<String, u32>>>,
    pub diagnostics: Rc<std::cell::RefCell<DiagnosticSink>>,
    pub firewall: Id,
    pub ruleset: String,
}

impl SlurpingStage for CountChainUsage {
    fn name(&self) -> &'static str {
        "CountChainUsage"
    }

    fn process_all(&mut self, rules: Vec<CompRule>) -> Vec<CompRule> {
        let declared: HashSet<&str> = rules.iter().filter_map(|r| r.ipt_chain.as_deref()).collect();
        let mut usage = self.chain_usage.borrow_mut();
        for rule in &rules {
            if let Action::Branch { target } = &rule.action {
                *usage.entry(target.clone()).or_insert(0) += 1;
                if !STANDARD_CHAINS.contains(&target.as_str()) && !declared.contains(target.as_str()) {
                    self.diagnostics.borrow_mut().warn(
                        self.firewall,
                        self.ruleset.clone(),
                        rule.abs_rule_number,
                        format!("rule branches to undeclared chain {target:?}"),
                    );
                }
            }
        }
        drop(usage);
        rules
    }
}

/// Drops any group reference whose `GroupKind` doesn't fit the slot it was
/// placed in (a `ServiceGroup` in `src`, say). Grounded on the same
/// validation the config parser should have already rejected; kept here as
/// a defense-in-depth pass over data a `DomainModelLoader` didn't author.
pub fn group_kind_matches_slot(group: &Group, slot: Slot) -> bool {
    match slot {
        Slot::Srv | Slot::OSrv | Slot::TSrv => group.kind == GroupKind::Service,
        Slot::When => group.kind == GroupKind::Interval,
        _ => matches!(group.kind, GroupKind::Object | GroupKind::MultiAddress),
    }
}

pub fn diag_empty_group(sink: &mut DiagnosticSink, firewall: Id, ruleset: &str, position: u32) {
    sink.warn(firewall, ruleset, position, "rule references an empty group");
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwc_model::firewall::types::group::GroupKind;

    fn arena_with_cycle() -> Arena {
        let mut arena = Arena::new();
        let a = Id::generate();
        let b = Id::generate();
        arena.groups.insert(
            a,
            Group {
                kind: GroupKind::Object,
                members: vec![b],
                comment: None,
            },
        );
        arena.groups.insert(
            b,
            Group {
                kind: GroupKind::Object,
                members: vec![a],
                comment: None,
            },
        );
        arena
    }

    #[test]
    fn expand_groups_breaks_cycles() {
        let arena = arena_with_cycle();
        let ids: Vec<Id> = arena.groups.keys().copied().collect();
        let expanded = expand_groups(&arena, &ids[..1]);
        assert!(expanded.is_empty());
    }

    #[test]
    fn expand_groups_resolves_leaves() {
        let mut arena = Arena::new();
        let leaf = Id::generate();
        let group_id = Id::generate();
        arena.groups.insert(
            group_id,
            Group {
                kind: GroupKind::Object,
                members: vec![leaf],
                comment: None,
            },
        );
        let expanded = expand_groups(&arena, &[group_id]);
        assert_eq!(expanded, vec![leaf]);
    }

    #[test]
    fn dedup_preserves_first_occurrence_order() {
        let a = Id::generate();
        let b = Id::generate();
        let mut ids = vec![a, b, a];
        dedup_preserve_order(&mut ids);
        assert_eq!(ids, vec![a, b]);
    }

    fn plain_rule(position: u32, chain: &str) -> CompRule {
        use fwc_model::firewall::types::rule::{Action, Direction, Rule, RuleKind, RuleOptions};
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
        r.ipt_chain = Some(chain.to_string());
        r
    }

    #[test]
    fn dedup_by_emitted_text_drops_consecutive_twin_only() {
        let rules = vec![plain_rule(1, "INPUT"), plain_rule(2, "INPUT"), plain_rule(3, "FORWARD"), plain_rule(4, "INPUT")];
        let out = DeduplicateByEmittedText.process_all(rules);
        assert_eq!(out.iter().map(|r| r.abs_rule_number).collect::<Vec<_>>(), vec![1, 3, 4]);
    }

    #[test]
    fn count_chain_usage_flags_branch_to_undeclared_chain() {
        use fwc_model::firewall::types::rule::Action;
        let mut branch = plain_rule(1, "INPUT");
        branch.action = Action::Branch { target: "custom-chain".to_string() };

        let diag = Rc::new(std::cell::RefCell::new(DiagnosticSink::new()));
        let mut stage = CountChainUsage {
            chain_usage: Rc::new(std::cell::RefCell::new(HashMap::new())),
            diagnostics: diag.clone(),
            firewall: Id::generate(),
            ruleset: "Policy".to_string(),
        };
        stage.process_all(vec![branch]);
        assert_eq!(diag.borrow().diagnostics().len(), 1);
    }

    #[test]
    fn count_chain_usage_accepts_branch_to_declared_chain() {
        use fwc_model::firewall::types::rule::Action;
        let mut branch = plain_rule(1, "INPUT");
        branch.action = Action::Branch { target: "custom-chain".to_string() };
        let member = plain_rule(2, "custom-chain");

        let diag = Rc::new(std::cell::RefCell::new(DiagnosticSink::new()));
        let mut stage = CountChainUsage {
            chain_usage: Rc::new(std::cell::RefCell::new(HashMap::new())),
            diagnostics: diag.clone(),
            firewall: Id::generate(),
            ruleset: "Policy".to_string(),
        };
        stage.process_all(vec![branch, member]);
        assert!(diag.borrow().diagnostics().is_empty());
    }
}
