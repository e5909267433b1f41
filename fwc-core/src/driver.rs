//! Pipeline orchestration (spec §5, §6.2): wires the generic stages, the
//! platform-specific print stages, and shadow detection into end-to-end
//! compile passes, one per `(firewall, address family, rule kind)` triple,
//! and assembles their textual output into a [`CompileOutput`].
//!
//! Routing-table compilation is out of scope (spec.md §1's explicit
//! exclusion list); `routing_rules` is always returned empty.

use std::collections::HashMap;
use std::rc::Rc;

use fwc_model::firewall::common::Arena;
use fwc_model::firewall::types::address::{load_address_table, Address, Cidr, Family as AddrFamily, IpEntry};
use fwc_model::firewall::types::device::{Device, Platform};
use fwc_model::firewall::types::rule::{
    Action, AddressFamily, Direction, Negations, Rule, RuleKind, RuleOptions, Slots,
};
use fwc_model::firewall::types::rule_match::{Icmpv6, Icmpv6Type, Service};
use fwc_model::Id;

use fwc_ipt::printer::{PrintVariant, Printer};
use fwc_ipt::rule::IptRule;
use fwc_nft::command::{Add, Command, Commands};
use fwc_nft::types::AddRule;

use crate::comprule::CompRule;
use crate::config::{AddressTableLoader, FsAddressTableLoader};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::generic::{
    AssignUniqueRuleId, AtomizeForAddresses, AtomizeForInterfaces, CheckInterfaceAgainstAF,
    CountChainUsage, DeduplicateByEmittedText, DropByAddressFamily, DropRulesWithEmptyRe,
    EliminateDuplicates, EmptyGroupsCheck, ExpandGroups, FillActionOnReject,
    GroupServicesByProtocol, InterfaceAndDirection, ResolveInterfaceLabel, ResolveMultiAddress,
    SeparatePortRanges, SharedArena, SingleRuleFilter, SkipDisabledRules, SplitOnDirectionBoth,
    StoreAction,
};
use crate::ipt_nat::IptNatPrintProcessor;
use crate::ipt_policy::{IptPrintProcessor, NegationSplit, TmpChainNamer};
use crate::nft_compiler::{base_chains, NftPolicyPrintProcessor};
use crate::nft_nat::{nat_base_chains, NftNatPrintProcessor};
use crate::processor::{collect_all, Begin, Pipeline, Processor, SlurpingProcessor};
use crate::shadow::DetectShadowing;

/// Per-compile-pass context (§5): owns the diagnostic sink shared by every
/// stage of one `(firewall, address_family, rule_kind)` pass. Deliberately
/// not `Send`/`Sync` (an `Rc<RefCell<_>>`, matching the rest of the
/// pipeline's single-threaded-per-pass design) - a caller that wants to
/// compile several passes concurrently runs each on its own thread with its
/// own `CompilerCtx`, per `std::thread::scope`, rather than sharing one.
pub struct CompilerCtx {
    pub firewall: Id,
    pub diagnostics: Rc<std::cell::RefCell<DiagnosticSink>>,
}

impl CompilerCtx {
    pub fn new(firewall: Id) -> Self {
        Self {
            firewall,
            diagnostics: Rc::new(std::cell::RefCell::new(DiagnosticSink::new())),
        }
    }
}

/// Knobs threaded through every stage of one compile run (spec §4.2 stage 2
/// and §6.3's `check_shading`).
pub struct CompileOptions {
    pub family: AddressFamily,
    pub check_shading: bool,
    pub single_rule: Option<u32>,
}

/// The driver's surfaced output (spec §6.2), handed to a [`ScriptAssembler`].
#[derive(Default)]
pub struct CompileOutput {
    pub filter_rules: String,
    pub mangle_rules: String,
    pub automatic_filter_rules: String,
    pub automatic_mangle_rules: String,
    pub nat_rules: String,
    pub routing_rules: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Metadata a [`ScriptAssembler`] needs beyond the compiled rule text itself
/// (spec §6.2: "firewall name, platform, version, user, timestamp, tool
/// paths").
pub struct ScriptMetadata {
    pub firewall_name: String,
    pub platform: Platform,
    pub tool_path: String,
    pub user: String,
    pub timestamp: String,
}

/// External collaborator that wraps a [`CompileOutput`] into a deployable
/// installer script; the pipeline itself never writes to disk (spec §6.2's
/// closing sentence).
pub trait ScriptAssembler {
    fn assemble(&self, output: &CompileOutput, meta: &ScriptMetadata) -> String;
}

/// Reference assembler: plain string concatenation with the teacher's
/// header-comment style, one section per output field.
pub struct PlainScriptAssembler;

impl ScriptAssembler for PlainScriptAssembler {
    fn assemble(&self, output: &CompileOutput, meta: &ScriptMetadata) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "# generated for {} ({:?}) by {} at {}\n",
            meta.firewall_name, meta.platform, meta.user, meta.timestamp
        ));
        out.push_str(&format!("# tool: {}\n", meta.tool_path));

        let mut section = |title: &str, body: &str| {
            if body.is_empty() {
                return;
            }
            out.push_str(&format!("# --- {title} ---\n"));
            out.push_str(body);
            if !body.ends_with('\n') {
                out.push('\n');
            }
        };
        section("automatic filter rules", &output.automatic_filter_rules);
        section("filter rules", &output.filter_rules);
        section("automatic mangle rules", &output.automatic_mangle_rules);
        section("mangle rules", &output.mangle_rules);
        section("nat rules", &output.nat_rules);
        section("routing rules", &output.routing_rules);
        out
    }
}

/// Boilerplate rules the original compiler inserts ahead of user policy
/// (spec §6.3's `[ADDED, from original_source]` note): connection-tracking
/// bootstrap and ICMPv6 neighbor-discovery allowances, grounded on
/// `firewall.rs`'s `handle_host_options`/`setup_ct_helper`/`handle_guest_options`.
/// Takes the arena mutably to intern the handful of ICMPv6 service objects
/// these rules reference, the same way any other rule's services are
/// arena-backed (§3's object-graph invariant) - a direct enough extension of
/// spec.md's drier `(device, family) -> Vec<CompRule>` signature that it's
/// recorded as an Open Question resolution rather than a silent change.
pub fn automatic_rules(device: &Device, arena: &mut Arena, family: AddressFamily) -> Vec<CompRule> {
    let mut out = Vec::new();

    if device.options.accept_established() {
        let mut rule = bare_comprule(Action::Accept, Direction::Both, "automatic: established,related");
        rule.options
            .extra
            .insert("ct_state".to_string(), "ESTABLISHED,RELATED".to_string());
        out.push(rule);
    }

    let ndp_enabled = device
        .options
        .ipv6_neighbor_discovery
        .unwrap_or(fwc_model::firewall::types::device::HOST_IPV6_NEIGHBOR_DISCOVERY_DEFAULT);
    if ndp_enabled && matches!(family, AddressFamily::V6 | AddressFamily::Both) {
        for name in ["nd-router-solicit", "nd-router-advert", "nd-neighbor-solicit", "nd-neighbor-advert"] {
            let srv_id = arena.insert_service(Service::Icmpv6(Icmpv6 {
                ty: Some(Icmpv6Type::Named(name)),
                code: None,
            }));
            let mut rule = bare_comprule(Action::Accept, Direction::Both, "automatic: icmpv6 neighbor discovery");
            rule.slots.srv = vec![srv_id];
            rule.options.stateless = true;
            out.push(rule);
        }
    }

    out
}

/// Converts a resolved address-table/DNS entry back into an arena address,
/// preferring the host variants for single-address entries the same way
/// [`Address::as_ip_entry`] distinguishes them going the other direction.
fn ip_entry_to_address(entry: IpEntry) -> Address {
    match entry {
        IpEntry::Cidr(Cidr::Ipv4(c)) if c.mask() == 32 => Address::HostV4(c.address()),
        IpEntry::Cidr(Cidr::Ipv4(c)) => Address::NetworkV4(c),
        IpEntry::Cidr(Cidr::Ipv6(c)) if c.mask() == 128 => Address::HostV6(c.address()),
        IpEntry::Cidr(Cidr::Ipv6(c)) => Address::NetworkV6(c),
        IpEntry::Range(lo, hi) => Address::Range(lo, hi),
    }
}

/// Parses one address table's text for both families; the per-family filter
/// the downstream [`DropByAddressFamily`] stage applies makes a v4/v6 split
/// here unnecessary - a marker referenced from only a v4 pass simply never
/// sees its v6 entries survive.
fn load_address_table_entries(contents: &str) -> Vec<IpEntry> {
    let mut out = load_address_table(contents, AddrFamily::V4);
    out.extend(load_address_table(contents, AddrFamily::V6));
    out
}

/// Resolves every [`Address::AddressTable`] marker against its on-disk file
/// (spec §4.2 stage 6, §9.2's address-table grammar), interning the parsed
/// entries as fresh literal addresses and returning the marker-id -> literal
/// ids map [`ResolveMultiAddress`] substitutes into rule slots.
fn resolve_multi_addresses(arena: &mut Arena, loader: &dyn AddressTableLoader) -> HashMap<Id, Vec<Id>> {
    let markers: Vec<(Id, String)> = arena
        .addresses
        .iter()
        .filter_map(|(id, addr)| match addr {
            Address::AddressTable { path } => Some((*id, path.to_string_lossy().into_owned())),
            _ => None,
        })
        .collect();

    let mut resolved = HashMap::new();
    for (marker_id, path) in markers {
        let contents = match loader.read(&path) {
            Ok(text) => text,
            Err(err) => {
                log::warn!("address table {path}: {err:#}");
                continue;
            }
        };
        let ids: Vec<Id> = load_address_table_entries(&contents)
            .into_iter()
            .map(|entry| arena.insert_address(ip_entry_to_address(entry)))
            .collect();
        if ids.is_empty() {
            log::warn!("address table {path}: resolved to no addresses");
        }
        resolved.insert(marker_id, ids);
    }
    resolved
}

fn bare_comprule(action: Action, direction: Direction, comment: &str) -> CompRule {
    CompRule::from_rule(&Rule {
        kind: RuleKind::Policy,
        position: 0,
        label: String::new(),
        comment: comment.to_string(),
        slots: Slots::default(),
        negations: Negations::default(),
        action,
        direction,
        disabled: false,
        fallback: false,
        hidden: false,
        options: RuleOptions::default(),
    })
}

/// A policy rule is routed to the mangle table (IPT only, §6.2) when it
/// carries mark/tag/classify/routing metadata rather than a plain
/// accept/reject/deny decision.
fn is_mangle_rule(rule: &CompRule) -> bool {
    rule.options.tagging.is_some() || rule.options.classification.is_some() || rule.options.routing.is_some()
}

fn run_common_stages(
    rules: Vec<CompRule>,
    arena: SharedArena,
    device: &Device,
    opts: &CompileOptions,
    resolved_multi_addresses: Rc<HashMap<Id, Vec<Id>>>,
) -> Box<dyn Pipeline> {
    let p: Box<dyn Pipeline> = Box::new(Begin::new(rules));
    let p: Box<dyn Pipeline> = Box::new(Processor::new(SingleRuleFilter { target_position: opts.single_rule }, p));
    let p: Box<dyn Pipeline> = Box::new(Processor::new(SkipDisabledRules, p));
    let p: Box<dyn Pipeline> = Box::new(Processor::new(StoreAction, p));
    let p: Box<dyn Pipeline> = Box::new(Processor::new(InterfaceAndDirection, p));
    let p: Box<dyn Pipeline> = Box::new(Processor::new(SplitOnDirectionBoth, p));
    let p: Box<dyn Pipeline> = Box::new(Processor::new(
        ResolveMultiAddress { resolved: resolved_multi_addresses, arena: arena.clone() },
        p,
    ));
    let p: Box<dyn Pipeline> = Box::new(Processor::new(
        EmptyGroupsCheck {
            arena: arena.clone(),
            ignore_empty_groups: device.options.ignore_empty_groups(),
            firewall: device.id,
        },
        p,
    ));
    let p: Box<dyn Pipeline> = Box::new(Processor::new(ExpandGroups { arena: arena.clone() }, p));
    let p: Box<dyn Pipeline> = Box::new(Processor::new(DropRulesWithEmptyRe, p));
    let p: Box<dyn Pipeline> = Box::new(Processor::new(EliminateDuplicates, p));
    let p: Box<dyn Pipeline> = Box::new(Processor::new(
        FillActionOnReject { default_action_on_reject: device.options.action_on_reject().to_string() },
        p,
    ));
    let p: Box<dyn Pipeline> =
        Box::new(Processor::new(DropByAddressFamily { family: opts.family, arena: arena.clone() }, p));
    let p: Box<dyn Pipeline> =
        Box::new(Processor::new(CheckInterfaceAgainstAF::new(device, opts.family), p));
    let p: Box<dyn Pipeline> = Box::new(Processor::new(AtomizeForInterfaces, p));
    let p: Box<dyn Pipeline> = Box::new(Processor::new(ResolveInterfaceLabel::new(device), p));
    let p: Box<dyn Pipeline> = Box::new(Processor::new(
        GroupServicesByProtocol { arena: arena.clone(), nft: device.platform == Platform::Nft },
        p,
    ));
    let p: Box<dyn Pipeline> = Box::new(Processor::new(SeparatePortRanges { arena: arena.clone() }, p));
    let p: Box<dyn Pipeline> = Box::new(Processor::new(AtomizeForAddresses, p));
    let p: Box<dyn Pipeline> = Box::new(Processor::new(AssignUniqueRuleId::new(), p));
    p
}

/// Appends the two slurping end-of-pipeline stages (spec §4.2 stages 20/21):
/// collapsing consecutive textually-identical output and tallying/validating
/// branch-chain references. Shared by every backend's print pass, unlike
/// [`append_shadow_detection`] which NAT rule sets skip.
fn append_output_checks(p: Box<dyn Pipeline>, ctx: &CompilerCtx, ruleset: &str) -> Box<dyn Pipeline> {
    let p: Box<dyn Pipeline> = Box::new(SlurpingProcessor::new(DeduplicateByEmittedText, p));
    Box::new(SlurpingProcessor::new(
        CountChainUsage {
            chain_usage: Rc::new(std::cell::RefCell::new(HashMap::new())),
            diagnostics: ctx.diagnostics.clone(),
            firewall: ctx.firewall,
            ruleset: ruleset.to_string(),
        },
        p,
    ))
}

fn append_shadow_detection(
    p: Box<dyn Pipeline>,
    arena: SharedArena,
    ctx: &CompilerCtx,
    ruleset: &str,
    check_shading: bool,
) -> Box<dyn Pipeline> {
    Box::new(SlurpingProcessor::new(
        DetectShadowing {
            arena,
            diagnostics: ctx.diagnostics.clone(),
            firewall: ctx.firewall,
            ruleset: ruleset.to_string(),
            check_shading,
        },
        p,
    ))
}

/// Runs one rule set through the IPT policy backend (spec §4.3), including
/// the negation-lowering temp-chain split and shadow detection.
pub fn compile_ipt_policy(
    rules: Vec<CompRule>,
    arena: SharedArena,
    device: &Device,
    ctx: &CompilerCtx,
    ruleset: &str,
    opts: &CompileOptions,
    table: &str,
    resolved_multi_addresses: Rc<HashMap<Id, Vec<Id>>>,
) -> Vec<IptRule> {
    let p = run_common_stages(rules, arena.clone(), device, opts, resolved_multi_addresses);
    let p: Box<dyn Pipeline> = Box::new(Processor::new(NegationSplit { namer: TmpChainNamer::new() }, p));
    let p = append_shadow_detection(p, arena.clone(), ctx, ruleset, opts.check_shading);
    let p = append_output_checks(p, ctx, ruleset);
    let printer = IptPrintProcessor { arena, version: device.version, table: table.to_string() };
    collect_all(p).iter().flat_map(|r| printer.print(r)).collect()
}

/// Runs one rule set through the NFT policy backend (spec §4.5).
pub fn compile_nft_policy(
    rules: Vec<CompRule>,
    arena: SharedArena,
    device: &Device,
    ctx: &CompilerCtx,
    ruleset: &str,
    opts: &CompileOptions,
    table: &str,
    resolved_multi_addresses: Rc<HashMap<Id, Vec<Id>>>,
) -> Vec<AddRule> {
    let p = run_common_stages(rules, arena.clone(), device, opts, resolved_multi_addresses);
    let p = append_shadow_detection(p, arena.clone(), ctx, ruleset, opts.check_shading);
    let p = append_output_checks(p, ctx, ruleset);
    let printer = NftPolicyPrintProcessor { arena, table: table.to_string() };
    collect_all(p).iter().map(|r| printer.print(r)).collect()
}

/// Runs one NAT rule set through the IPT NAT backend (spec §4.4). NAT rules
/// match on `osrc`/`odst`/`osrv` rather than `src`/`dst`/`srv`, so shadow
/// detection (which only ever reasons about the latter) is skipped here -
/// running it would flag every rule after the first as shadowing every
/// other, since their (always-empty) `src`/`dst` slots trivially "contain"
/// each other.
pub fn compile_ipt_nat(
    rules: Vec<CompRule>,
    arena: SharedArena,
    device: &Device,
    ctx: &CompilerCtx,
    opts: &CompileOptions,
    resolved_multi_addresses: Rc<HashMap<Id, Vec<Id>>>,
) -> Vec<IptRule> {
    let p = run_common_stages(rules, arena.clone(), device, opts, resolved_multi_addresses);
    let p = append_output_checks(p, ctx, "Nat");
    let printer = IptNatPrintProcessor::new(arena, device);
    collect_all(p).iter().map(|r| printer.print(r)).collect()
}

/// Runs one NAT rule set through the NFT NAT backend (spec §4.5), reusing
/// [`crate::ipt_nat::classify`]'s platform-agnostic rule-type table since
/// `_nat_compiler.py`'s `ClassifyNATRule` stage is identical for both
/// backends - only the final print stage differs.
pub fn compile_nft_nat(
    rules: Vec<CompRule>,
    arena: SharedArena,
    device: &Device,
    ctx: &CompilerCtx,
    opts: &CompileOptions,
    table: &str,
    resolved_multi_addresses: Rc<HashMap<Id, Vec<Id>>>,
) -> Vec<AddRule> {
    let p = run_common_stages(rules, arena.clone(), device, opts, resolved_multi_addresses);
    let p = append_output_checks(p, ctx, "Nat");
    let printer = NftNatPrintProcessor::new(arena, device, table);
    collect_all(p).iter().map(|r| printer.print(r)).collect()
}

fn render_ipt_rules(table: &str, rules: &[IptRule], ipv6: bool, variant: PrintVariant, wait_lock: bool) -> String {
    if rules.is_empty() {
        return String::new();
    }
    let mut printer = Printer::new(variant, ipv6, wait_lock);
    let mut lines = Vec::new();
    if let Some(header) = printer.table_header(table) {
        lines.push(header);
    }
    for rule in rules {
        if let Some(decl) = printer.declare_chain(&rule.table, &rule.chain) {
            lines.push(decl);
        }
    }
    for rule in rules {
        lines.push(printer.render_rule(rule));
    }
    if let Some(commit) = printer.commit() {
        lines.push(commit);
    }
    lines.join("\n")
}

/// Renders a batch of nftables commands as the JSON the teacher's own
/// client sends to `nft -j`, rather than inventing a textual nft grammar
/// with no grounding anywhere in this workspace.
fn render_nft_commands(table: &str, chains: Vec<Command>, rules: &[AddRule]) -> String {
    if rules.is_empty() {
        return String::new();
    }
    let mut commands = vec![Add::table(table.to_string())];
    commands.extend(chains);
    for rule in rules {
        commands.push(Add::rule(rule.clone()));
    }
    serde_json::to_string_pretty(&Commands::new(commands)).unwrap_or_default()
}

/// Compiles one firewall/address-family pass end to end and assembles the
/// six output fields spec.md §6.2 names. Takes the fully-assembled `Arena`
/// by value since `automatic_rules` needs to mutate it before any compile
/// pass shares it (as a `Rc`) across the policy/NAT passes below.
pub fn compile_device(mut arena: Arena, device: &Device, opts: &CompileOptions) -> CompileOutput {
    let ctx = CompilerCtx::new(device.id);

    let boilerplate = automatic_rules(device, &mut arena, opts.family);
    let resolved_multi_addresses = Rc::new(resolve_multi_addresses(&mut arena, &FsAddressTableLoader));
    let arena: SharedArena = Rc::new(arena);

    let policy_rules: Vec<CompRule> = device
        .rule_sets
        .iter()
        .filter(|rs| rs.kind == RuleKind::Policy)
        .flat_map(|rs| rs.enabled_rules_in_order().map(CompRule::from_rule))
        .collect();
    let nat_rules: Vec<CompRule> = device
        .rule_sets
        .iter()
        .filter(|rs| rs.kind == RuleKind::Nat)
        .flat_map(|rs| rs.enabled_rules_in_order().map(CompRule::from_rule))
        .collect();

    let ipv6 = matches!(opts.family, AddressFamily::V6);
    let variant = if device.options.use_iptables_restore() {
        PrintVariant::Restore
    } else {
        PrintVariant::Shell
    };
    let wait_lock = device.version >= crate::version::ENGINE_VERSION_WAIT_LOCK;

    let (filter_rules, mangle_rules, automatic_filter_rules, automatic_mangle_rules) = match device.platform {
        Platform::Ipt => {
            let (mangle, filter): (Vec<CompRule>, Vec<CompRule>) = policy_rules.into_iter().partition(|r| is_mangle_rule(r));
            let (auto_mangle, auto_filter): (Vec<CompRule>, Vec<CompRule>) =
                boilerplate.into_iter().partition(|r| is_mangle_rule(r));

            let filter_out = compile_ipt_policy(
                filter,
                arena.clone(),
                device,
                &ctx,
                "Policy",
                opts,
                "filter",
                resolved_multi_addresses.clone(),
            );
            let mangle_out = compile_ipt_policy(
                mangle,
                arena.clone(),
                device,
                &ctx,
                "Policy",
                opts,
                "mangle",
                resolved_multi_addresses.clone(),
            );
            let auto_filter_out = compile_ipt_policy(
                auto_filter,
                arena.clone(),
                device,
                &ctx,
                "Automatic",
                opts,
                "filter",
                resolved_multi_addresses.clone(),
            );
            let auto_mangle_out = compile_ipt_policy(
                auto_mangle,
                arena.clone(),
                device,
                &ctx,
                "Automatic",
                opts,
                "mangle",
                resolved_multi_addresses.clone(),
            );

            (
                render_ipt_rules("filter", &filter_out, ipv6, variant, wait_lock),
                render_ipt_rules("mangle", &mangle_out, ipv6, variant, wait_lock),
                render_ipt_rules("filter", &auto_filter_out, ipv6, variant, wait_lock),
                render_ipt_rules("mangle", &auto_mangle_out, ipv6, variant, wait_lock),
            )
        }
        Platform::Nft => {
            let table = "inet-filter";
            let filter_out = compile_nft_policy(
                policy_rules,
                arena.clone(),
                device,
                &ctx,
                "Policy",
                opts,
                table,
                resolved_multi_addresses.clone(),
            );
            let auto_out = compile_nft_policy(
                boilerplate,
                arena.clone(),
                device,
                &ctx,
                "Automatic",
                opts,
                table,
                resolved_multi_addresses.clone(),
            );
            (
                render_nft_commands(table, base_chains(table).into_iter().map(Add::chain).collect(), &filter_out),
                String::new(),
                render_nft_commands(table, Vec::new(), &auto_out),
                String::new(),
            )
        }
    };

    let nat_rules_text = match device.platform {
        Platform::Ipt => {
            let nat_out = compile_ipt_nat(nat_rules, arena.clone(), device, &ctx, opts, resolved_multi_addresses.clone());
            render_ipt_rules("nat", &nat_out, ipv6, variant, wait_lock)
        }
        Platform::Nft => {
            let table = "inet-nat";
            let nat_out = compile_nft_nat(nat_rules, arena.clone(), device, &ctx, opts, table, resolved_multi_addresses.clone());
            render_nft_commands(table, nat_base_chains(table).into_iter().map(Add::chain).collect(), &nat_out)
        }
    };

    let diagnostics = Rc::try_unwrap(ctx.diagnostics)
        .map(|cell| cell.into_inner().into_diagnostics())
        .unwrap_or_else(|rc| rc.borrow().diagnostics().to_vec());

    CompileOutput {
        filter_rules,
        mangle_rules,
        automatic_filter_rules,
        automatic_mangle_rules,
        nat_rules: nat_rules_text,
        routing_rules: String::new(),
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwc_model::firewall::types::device::{EngineVersion, FirewallOptions, Kind};
    use fwc_model::firewall::types::interface::Interface;
    use fwc_model::firewall::types::rule::RuleSet;

    fn ipt_device() -> Device {
        Device {
            id: Id::generate(),
            name: "test-fw".to_string(),
            kind: Kind::Host,
            interfaces: vec![Interface::new("eth0")],
            rule_sets: Vec::new(),
            platform: Platform::Ipt,
            version: EngineVersion::new(1, 4, 21, 0),
            options: FirewallOptions::default(),
        }
    }

    #[test]
    fn automatic_rules_includes_established_bootstrap_when_enabled() {
        let device = ipt_device();
        let mut arena = Arena::new();
        let rules = automatic_rules(&device, &mut arena, AddressFamily::Both);
        assert!(rules.iter().any(|r| r.options.extra.get("ct_state").map(String::as_str) == Some("ESTABLISHED,RELATED")));
    }

    #[test]
    fn automatic_rules_adds_four_ndp_types_for_v6() {
        let device = ipt_device();
        let mut arena = Arena::new();
        let rules = automatic_rules(&device, &mut arena, AddressFamily::V6);
        let ndp_count = rules.iter().filter(|r| !r.slots.srv.is_empty()).count();
        assert_eq!(ndp_count, 4);
        assert_eq!(arena.services.len(), 4);
    }

    #[test]
    fn automatic_rules_skips_ndp_for_v4_only_pass() {
        let device = ipt_device();
        let mut arena = Arena::new();
        let rules = automatic_rules(&device, &mut arena, AddressFamily::V4);
        assert!(rules.iter().all(|r| r.slots.srv.is_empty()));
    }

    #[test]
    fn compile_device_produces_nonempty_filter_rules_for_simple_policy() {
        let mut device = ipt_device();
        let rule = Rule {
            kind: RuleKind::Policy,
            position: 1,
            label: String::new(),
            comment: "allow ssh".to_string(),
            slots: Slots::default(),
            negations: Negations::default(),
            action: Action::Accept,
            direction: Direction::Inbound,
            disabled: false,
            fallback: false,
            hidden: false,
            options: RuleOptions::default(),
        };
        device.rule_sets.push(RuleSet {
            kind: RuleKind::Policy,
            device: device.id,
            family: AddressFamily::Both,
            top: true,
            branch_chain_name: None,
            rules: vec![rule],
        });

        let opts = CompileOptions { family: AddressFamily::V4, check_shading: false, single_rule: None };
        let output = compile_device(Arena::new(), &device, &opts);
        assert!(output.filter_rules.contains("-A INPUT"));
        assert!(output.filter_rules.contains("-j ACCEPT"));
        assert!(output.automatic_filter_rules.contains("ESTABLISHED"));
    }

    #[test]
    fn plain_script_assembler_skips_empty_sections() {
        let output = CompileOutput {
            filter_rules: "$IPTABLES -A INPUT -j ACCEPT".to_string(),
            ..Default::default()
        };
        let meta = ScriptMetadata {
            firewall_name: "test-fw".to_string(),
            platform: Platform::Ipt,
            tool_path: "/usr/sbin/iptables".to_string(),
            user: "root".to_string(),
            timestamp: "2026-07-28T00:00:00Z".to_string(),
        };
        let script = PlainScriptAssembler.assemble(&output, &meta);
        assert!(script.contains("filter rules"));
        assert!(!script.contains("mangle rules"));
    }
}
