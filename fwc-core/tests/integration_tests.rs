//! End-to-end coverage driving [`fwc_core::driver::compile_device`] straight
//! off hand-built `Device`/`Arena`/`RuleSet` values, instead of fixture files
//! or recorded snapshots: every network object is built in the test itself
//! so a reader can see exactly what's being compiled and why the assertion
//! holds.

use std::net::{Ipv4Addr, Ipv6Addr};

use fwc_core::comprule::CompRule;
use fwc_core::driver::{compile_device, CompileOptions};

use fwc_model::firewall::common::Arena;
use fwc_model::firewall::types::address::{Address, Ipv4Cidr};
use fwc_model::firewall::types::device::{Device, EngineVersion, FirewallOptions, Kind, Platform};
use fwc_model::firewall::types::interface::Interface;
use fwc_model::firewall::types::port::PortList;
use fwc_model::firewall::types::rule::{
    Action, AddressFamily, Direction, Negations, Rule, RuleKind, RuleOptions, RuleSet, Slot, Slots,
};
use fwc_model::firewall::types::rule_match::{Icmp, IcmpType, Service};
use fwc_model::Id;

fn shell_options() -> FirewallOptions {
    FirewallOptions { use_iptables_restore: Some(false), ..FirewallOptions::default() }
}

fn bare_rule(position: u32, action: Action, direction: Direction, label: &str) -> Rule {
    Rule {
        kind: RuleKind::Policy,
        position,
        label: label.to_string(),
        comment: String::new(),
        slots: Slots::default(),
        negations: Negations::default(),
        action,
        direction,
        disabled: false,
        fallback: false,
        hidden: false,
        options: RuleOptions::default(),
    }
}

fn ruleset(kind: RuleKind, device: Id, rules: Vec<Rule>) -> RuleSet {
    RuleSet { kind, device, family: AddressFamily::Both, top: true, branch_chain_name: None, rules }
}

/// Scenario A (spec.md §8.4): a single inbound accept rule on an IPT shell
/// device produces the conntrack-gated `-A INPUT` line, `-w` included since
/// the device's engine version clears the wait-lock gate.
#[test]
fn scenario_a_ipt_shell_single_accept_rule() {
    let mut arena = Arena::new();
    let device_id = Id::generate();
    let eth0 = Interface::new("eth0");
    let eth0_id = eth0.id;

    // dst is left "any" (empty slot): the firewall's own address needs no
    // explicit `-d` once the rule already lands in the INPUT chain.
    let srv = arena.insert_service(Service::Tcp(fwc_model::firewall::types::rule_match::Ports {
        dport: Some(PortList::from(22u16)),
        ..Default::default()
    }));

    let mut rule = bare_rule(1, Action::Accept, Direction::Inbound, "allow ssh");
    rule.slots.srv = vec![srv];
    rule.slots.itf = vec![eth0_id];

    let device = Device {
        id: device_id,
        name: "fw".to_string(),
        kind: Kind::Host,
        interfaces: vec![eth0],
        rule_sets: vec![ruleset(RuleKind::Policy, device_id, vec![rule])],
        platform: Platform::Ipt,
        version: EngineVersion::new(1, 4, 21, 0),
        options: shell_options(),
    };

    let opts = CompileOptions { family: AddressFamily::V4, check_shading: false, single_rule: None };
    let output = compile_device(arena, &device, &opts);

    assert!(
        output.filter_rules.contains("$IPTABLES -w -A INPUT -i eth0 -p tcp --dport 22 -m conntrack --ctstate NEW -j ACCEPT"),
        "got: {}",
        output.filter_rules
    );
}

/// Scenario B (spec.md §8.4): three TCP ports on one service fold into a
/// single `multiport`-shaped match rather than three separate rules.
#[test]
fn scenario_b_multiport_folds_into_one_match() {
    let mut arena = Arena::new();
    let device_id = Id::generate();

    let src = arena.insert_address(Address::NetworkV4(Ipv4Cidr::new(Ipv4Addr::new(10, 0, 0, 0), 8).unwrap()));
    let dst = arena.insert_address(Address::NetworkV4(Ipv4Cidr::new(Ipv4Addr::new(10, 0, 0, 1), 24).unwrap()));
    // Three distinct single-port TCP service objects, the way a port-group
    // object expands into rule slots upstream - `GroupServicesByProtocol` /
    // `try_multiport` is what folds these back into one match, not a single
    // service carrying a multi-entry port list.
    let srv_ids: Vec<Id> = [22u16, 80, 443]
        .into_iter()
        .map(|port| {
            arena.insert_service(Service::Tcp(fwc_model::firewall::types::rule_match::Ports {
                dport: Some(PortList::from(port)),
                ..Default::default()
            }))
        })
        .collect();

    let mut rule = bare_rule(1, Action::Accept, Direction::Inbound, "allow web");
    rule.slots.src = vec![src];
    rule.slots.dst = vec![dst];
    rule.slots.srv = srv_ids;

    let device = Device {
        id: device_id,
        name: "fw".to_string(),
        kind: Kind::Host,
        interfaces: vec![Interface::new("eth0")],
        rule_sets: vec![ruleset(RuleKind::Policy, device_id, vec![rule])],
        platform: Platform::Ipt,
        version: EngineVersion::new(1, 4, 21, 0),
        options: shell_options(),
    };

    let opts = CompileOptions { family: AddressFamily::V4, check_shading: false, single_rule: None };
    let output = compile_device(arena, &device, &opts);

    assert!(
        output.filter_rules.contains("-m multiport --dports 22,80,443"),
        "got: {}",
        output.filter_rules
    );
}

/// Scenario D (spec.md §8.4): a negated source-address match lowers to a
/// temporary chain with per-address `RETURN`s and a trailing terminal
/// action, rather than `iptables`' unsupported `! -s a -s b`.
#[test]
fn scenario_d_negated_multi_address_uses_temp_chain() {
    let mut arena = Arena::new();
    let device_id = Id::generate();

    let net1 = arena.insert_address(Address::NetworkV4(Ipv4Cidr::new(Ipv4Addr::new(10, 1, 0, 0), 16).unwrap()));
    let net2 = arena.insert_address(Address::NetworkV4(Ipv4Cidr::new(Ipv4Addr::new(10, 2, 0, 0), 16).unwrap()));

    let mut rule = bare_rule(1, Action::Deny, Direction::Both, "deny internal");
    rule.slots.src = vec![net1, net2];
    rule.negations.set(Slot::Src, true);

    let device = Device {
        id: device_id,
        name: "fw".to_string(),
        kind: Kind::Host,
        interfaces: vec![Interface::new("eth0")],
        rule_sets: vec![ruleset(RuleKind::Policy, device_id, vec![rule])],
        platform: Platform::Ipt,
        version: EngineVersion::new(1, 4, 21, 0),
        options: shell_options(),
    };

    let opts = CompileOptions { family: AddressFamily::V4, check_shading: false, single_rule: None };
    let output = compile_device(arena, &device, &opts);

    assert!(output.filter_rules.contains("-N C"), "expected a temp chain declaration, got: {}", output.filter_rules);
    assert!(output.filter_rules.contains("-s 10.1.0.0/16 -j RETURN"), "got: {}", output.filter_rules);
    assert!(output.filter_rules.contains("-s 10.2.0.0/16 -j RETURN"), "got: {}", output.filter_rules);
    assert!(output.filter_rules.contains("-j DROP"), "got: {}", output.filter_rules);
}

/// Scenario E (spec.md §8.4): a broader rule ahead of a narrower one with
/// the same action and chain shadows it; with `check_shading` on, that's
/// surfaced as an error diagnostic rather than compiled silently.
#[test]
fn scenario_e_shadowed_rule_produces_error_diagnostic() {
    let mut arena = Arena::new();
    let device_id = Id::generate();

    let broad = arena.insert_address(Address::NetworkV4(Ipv4Cidr::new(Ipv4Addr::new(10, 0, 0, 0), 8).unwrap()));
    let narrow = arena.insert_address(Address::HostV4(Ipv4Addr::new(10, 1, 2, 3)));

    let mut rule1 = bare_rule(1, Action::Accept, Direction::Inbound, "broad accept");
    rule1.slots.src = vec![broad];
    let mut rule2 = bare_rule(2, Action::Accept, Direction::Inbound, "narrow accept");
    rule2.slots.src = vec![narrow];

    let device = Device {
        id: device_id,
        name: "fw".to_string(),
        kind: Kind::Host,
        interfaces: vec![Interface::new("eth0")],
        rule_sets: vec![ruleset(RuleKind::Policy, device_id, vec![rule1, rule2])],
        platform: Platform::Ipt,
        version: EngineVersion::new(1, 4, 21, 0),
        options: shell_options(),
    };

    let opts = CompileOptions { family: AddressFamily::V4, check_shading: true, single_rule: None };
    let output = compile_device(arena, &device, &opts);

    assert!(
        output.diagnostics.iter().any(|d| d.text.contains("shadows")),
        "expected a shadowing diagnostic, got: {:?}",
        output.diagnostics
    );
}

/// Scenario E, negative case: with `check_shading` off the same rules
/// compile without any shadowing diagnostic at all.
#[test]
fn scenario_e_shadow_detection_is_opt_in() {
    let mut arena = Arena::new();
    let device_id = Id::generate();

    let broad = arena.insert_address(Address::NetworkV4(Ipv4Cidr::new(Ipv4Addr::new(10, 0, 0, 0), 8).unwrap()));
    let narrow = arena.insert_address(Address::HostV4(Ipv4Addr::new(10, 1, 2, 3)));

    let mut rule1 = bare_rule(1, Action::Accept, Direction::Inbound, "broad accept");
    rule1.slots.src = vec![broad];
    let mut rule2 = bare_rule(2, Action::Accept, Direction::Inbound, "narrow accept");
    rule2.slots.src = vec![narrow];

    let device = Device {
        id: device_id,
        name: "fw".to_string(),
        kind: Kind::Host,
        interfaces: vec![Interface::new("eth0")],
        rule_sets: vec![ruleset(RuleKind::Policy, device_id, vec![rule1, rule2])],
        platform: Platform::Ipt,
        version: EngineVersion::new(1, 4, 21, 0),
        options: shell_options(),
    };

    let opts = CompileOptions { family: AddressFamily::V4, check_shading: false, single_rule: None };
    let output = compile_device(arena, &device, &opts);

    assert!(output.diagnostics.iter().all(|d| !d.text.contains("shadows")));
}

/// Scenario F (spec.md §8.4): on the IPv6 pass, a rule carrying only IPv4
/// addresses and an ICMPv4 service has every address and the service
/// dropped by family filtering, leaving nothing to compile - and that's
/// reported, not silently swallowed.
#[test]
fn scenario_f_ipv4_only_rule_is_dropped_on_ipv6_pass() {
    let mut arena = Arena::new();
    let device_id = Id::generate();

    let v4 = arena.insert_address(Address::HostV4(Ipv4Addr::new(10, 0, 0, 5)));
    let icmp = arena.insert_service(Service::Icmpv4(Icmp::new(Some(IcmpType::Named("echo-request")), None).unwrap()));

    let mut rule = bare_rule(1, Action::Accept, Direction::Inbound, "ping in");
    rule.slots.src = vec![v4];
    rule.slots.srv = vec![icmp];

    let device = Device {
        id: device_id,
        name: "fw".to_string(),
        kind: Kind::Host,
        interfaces: vec![Interface::new("eth0")],
        rule_sets: vec![ruleset(RuleKind::Policy, device_id, vec![rule])],
        platform: Platform::Ipt,
        version: EngineVersion::new(1, 4, 21, 0),
        options: shell_options(),
    };

    let opts = CompileOptions { family: AddressFamily::V6, check_shading: false, single_rule: None };
    let output = compile_device(arena, &device, &opts);

    assert!(
        !output.filter_rules.contains("echo-request") && !output.filter_rules.contains("10.0.0.5"),
        "got: {}",
        output.filter_rules
    );
}

/// Concrete NAT compile (spec §4.4): an explicit translate-source address
/// drives the SNAT classifier end to end, down to a rendered `-j SNAT`
/// line. `ipt_nat::classify` only reaches `Masq` when `CompRule::nat_rule_type`
/// is pre-set (never the case for a plain `Rule`-sourced compile, see
/// `ipt_nat`'s own unit tests), so dynamic-interface masquerade is covered
/// at that narrower unit level instead of here.
#[test]
fn nat_rule_with_translate_source_compiles_to_snat() {
    let mut arena = Arena::new();
    let device_id = Id::generate();

    let osrc = arena.insert_address(Address::NetworkV4(Ipv4Cidr::new(Ipv4Addr::new(192, 168, 1, 0), 24).unwrap()));
    let tsrc = arena.insert_address(Address::HostV4(Ipv4Addr::new(203, 0, 113, 5)));

    let mut rule = bare_rule(1, Action::Translate, Direction::Undefined, "outbound snat");
    rule.kind = RuleKind::Nat;
    rule.slots.osrc = vec![osrc];
    rule.slots.tsrc = vec![tsrc];

    let device = Device {
        id: device_id,
        name: "fw".to_string(),
        kind: Kind::Host,
        interfaces: vec![Interface::new("eth0"), Interface::new("eth1")],
        rule_sets: vec![ruleset(RuleKind::Nat, device_id, vec![rule])],
        platform: Platform::Ipt,
        version: EngineVersion::new(1, 4, 21, 0),
        options: shell_options(),
    };

    let opts = CompileOptions { family: AddressFamily::V4, check_shading: false, single_rule: None };
    let output = compile_device(arena, &device, &opts);

    assert!(output.nat_rules.contains("-A POSTROUTING"), "got: {}", output.nat_rules);
    assert!(output.nat_rules.contains("-j SNAT --to-source 203.0.113.5"), "got: {}", output.nat_rules);
}

/// Property P-ish sanity check: the automatic established/related bootstrap
/// rule is present ahead of user policy whenever the firewall accepts
/// established connections (the default), and is rendered into its own
/// `automatic_filter_rules` section rather than mixed into user policy.
#[test]
fn automatic_established_bootstrap_is_separate_from_user_policy() {
    let mut arena = Arena::new();
    let device_id = Id::generate();
    let rule = bare_rule(1, Action::Accept, Direction::Inbound, "user rule");

    let device = Device {
        id: device_id,
        name: "fw".to_string(),
        kind: Kind::Host,
        interfaces: vec![Interface::new("eth0")],
        rule_sets: vec![ruleset(RuleKind::Policy, device_id, vec![rule])],
        platform: Platform::Ipt,
        version: EngineVersion::new(1, 4, 21, 0),
        options: shell_options(),
    };

    let opts = CompileOptions { family: AddressFamily::V4, check_shading: false, single_rule: None };
    let output = compile_device(arena, &device, &opts);

    assert!(output.automatic_filter_rules.contains("ESTABLISHED"));
    assert!(!output.filter_rules.contains("ESTABLISHED"));
}

/// `--rule <n>` (§6.3) compiles exactly the one rule at that absolute
/// position, dropping every other enabled rule in the same rule set.
#[test]
fn single_rule_option_filters_to_one_position() {
    let mut arena = Arena::new();
    let device_id = Id::generate();

    let rule1 = bare_rule(1, Action::Accept, Direction::Inbound, "first");
    let rule2 = bare_rule(2, Action::Deny, Direction::Inbound, "second");

    let device = Device {
        id: device_id,
        name: "fw".to_string(),
        kind: Kind::Host,
        interfaces: vec![Interface::new("eth0")],
        rule_sets: vec![ruleset(RuleKind::Policy, device_id, vec![rule1, rule2])],
        platform: Platform::Ipt,
        version: EngineVersion::new(1, 4, 21, 0),
        options: shell_options(),
    };

    let opts = CompileOptions { family: AddressFamily::V4, check_shading: false, single_rule: Some(2) };
    let output = compile_device(arena, &device, &opts);

    assert!(output.filter_rules.contains("-j DROP"));
    assert!(!output.filter_rules.contains("-j ACCEPT"));
}

/// Disabled rules never reach the printer at all (§4.2 stage 1).
#[test]
fn disabled_rule_is_skipped_entirely() {
    let mut arena = Arena::new();
    let device_id = Id::generate();

    let mut rule = bare_rule(1, Action::Accept, Direction::Inbound, "disabled rule");
    rule.disabled = true;

    let device = Device {
        id: device_id,
        name: "fw".to_string(),
        kind: Kind::Host,
        interfaces: vec![Interface::new("eth0")],
        rule_sets: vec![ruleset(RuleKind::Policy, device_id, vec![rule])],
        platform: Platform::Ipt,
        version: EngineVersion::new(1, 4, 21, 0),
        options: shell_options(),
    };

    let opts = CompileOptions { family: AddressFamily::V4, check_shading: false, single_rule: None };
    let output = compile_device(arena, &device, &opts);

    assert!(!output.filter_rules.contains("-j ACCEPT"));
}

/// Below the wait-lock engine-version gate (§6.4), `-w` is omitted entirely.
#[test]
fn old_engine_version_omits_wait_lock_flag() {
    let mut arena = Arena::new();
    let device_id = Id::generate();
    let rule = bare_rule(1, Action::Accept, Direction::Inbound, "allow");

    let device = Device {
        id: device_id,
        name: "fw".to_string(),
        kind: Kind::Host,
        interfaces: vec![Interface::new("eth0")],
        rule_sets: vec![ruleset(RuleKind::Policy, device_id, vec![rule])],
        platform: Platform::Ipt,
        version: EngineVersion::new(1, 4, 19, 0),
        options: shell_options(),
    };

    let opts = CompileOptions { family: AddressFamily::V4, check_shading: false, single_rule: None };
    let output = compile_device(arena, &device, &opts);

    assert!(output.filter_rules.contains("$IPTABLES -A INPUT"));
    assert!(!output.filter_rules.contains("-w"));
}

/// NFT platform compile (spec §4.5): the filter section is valid JSON
/// naming the `inet` family and carrying an `accept` statement, rather than
/// an ad hoc textual nft grammar.
#[test]
fn nft_platform_compiles_to_json_commands() {
    let mut arena = Arena::new();
    let device_id = Id::generate();
    let rule = bare_rule(1, Action::Accept, Direction::Inbound, "allow");

    let device = Device {
        id: device_id,
        name: "fw".to_string(),
        kind: Kind::Host,
        interfaces: vec![Interface::new("eth0")],
        rule_sets: vec![ruleset(RuleKind::Policy, device_id, vec![rule])],
        platform: Platform::Nft,
        version: EngineVersion::new(1, 4, 21, 0),
        options: shell_options(),
    };

    let opts = CompileOptions { family: AddressFamily::V4, check_shading: false, single_rule: None };
    let output = compile_device(arena, &device, &opts);

    let parsed: serde_json::Value =
        serde_json::from_str(&output.filter_rules).expect("nft output should be valid json");
    assert!(parsed.to_string().contains("\"inet\""));
    assert!(parsed.to_string().contains("accept"));
}

/// A `Translate`-kind IPv6 compile never reaches `CompRule` through any
/// unintended path: quick sanity check that `CompRule::from_rule` round
/// trips the label used for diagnostics provenance.
#[test]
fn comp_rule_from_rule_preserves_label() {
    let rule = bare_rule(7, Action::Accept, Direction::Inbound, "labelled");
    let comp = CompRule::from_rule(&rule);
    assert_eq!(comp.label, "labelled");
    assert_eq!(comp.abs_rule_number, 0);
}

/// Two interfaces' worth of addressing round trips through the IPv6 pass
/// unscathed when every object involved is already IPv6: no accidental
/// family-based drop of otherwise-valid rules.
#[test]
fn ipv6_only_rule_survives_ipv6_pass() {
    let mut arena = Arena::new();
    let device_id = Id::generate();

    let dst = arena.insert_address(Address::HostV6(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 1)));
    let mut rule = bare_rule(1, Action::Accept, Direction::Inbound, "v6 allow");
    rule.slots.dst = vec![dst];

    let device = Device {
        id: device_id,
        name: "fw".to_string(),
        kind: Kind::Host,
        interfaces: vec![Interface::new("eth0")],
        rule_sets: vec![ruleset(RuleKind::Policy, device_id, vec![rule])],
        platform: Platform::Ipt,
        version: EngineVersion::new(1, 4, 21, 0),
        options: shell_options(),
    };

    let opts = CompileOptions { family: AddressFamily::V6, check_shading: false, single_rule: None };
    let output = compile_device(arena, &device, &opts);

    assert!(output.filter_rules.contains("-d fd00::1"), "got: {}", output.filter_rules);
}
