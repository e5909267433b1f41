use std::collections::HashMap;

use anyhow::{bail, Error};

use crate::firewall::parse::{match_non_whitespace, parse_bool};
use crate::firewall::types::log::{LogLevel, LogRateLimit};
use crate::Id;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RuleKind {
    Policy,
    Nat,
    Routing,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Direction {
    Inbound,
    Outbound,
    Both,
    #[default]
    Undefined,
}

/// Policy actions. NAT rules only ever use `Translate` (modeled by
/// `NatRuleType`, derived during compilation) or `Branch`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Action {
    Accept,
    Reject,
    Deny,
    Return,
    Continue,
    Accounting,
    Branch { target: String },
    Modify,
    Pipe,
    Custom(String),
    Translate,
}

impl Action {
    /// Actions that do not terminate evaluation of the current chain and
    /// are therefore excluded from shadow detection (§4.6).
    pub fn is_non_terminating(&self) -> bool {
        matches!(
            self,
            Action::Continue | Action::Branch { .. } | Action::Return | Action::Accounting
        )
    }
}

/// Derived NAT classification (§4.4); never stored on the source `Rule`,
/// only ever computed by the NAT compiler's classify stage.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NatRuleType {
    NoNat,
    Snat,
    Dnat,
    SNetnat,
    DNetnat,
    Masq,
    Redirect,
    SDNat,
    NatBranch,
    Return,
    Continue,
    Skip,
    Lb,
}

/// Closed set of per-slot identifiers, replacing the original's free-form
/// string slot names.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Slot {
    Src,
    Dst,
    Srv,
    Itf,
    When,
    OSrc,
    ODst,
    OSrv,
    TSrc,
    TDst,
    TSrv,
    ItfInb,
    ItfOutb,
    RDst,
    RGtw,
    RItf,
}

#[derive(Clone, Debug, Default)]
pub struct Slots {
    pub src: Vec<Id>,
    pub dst: Vec<Id>,
    pub srv: Vec<Id>,
    pub itf: Vec<Id>,
    pub when: Vec<Id>,

    pub osrc: Vec<Id>,
    pub odst: Vec<Id>,
    pub osrv: Vec<Id>,
    pub tsrc: Vec<Id>,
    pub tdst: Vec<Id>,
    pub tsrv: Vec<Id>,
    pub itf_inb: Vec<Id>,
    pub itf_outb: Vec<Id>,

    pub rdst: Vec<Id>,
    pub rgtw: Vec<Id>,
    pub ritf: Vec<Id>,
}

impl Slots {
    pub fn get(&self, slot: Slot) -> &Vec<Id> {
        match slot {
            Slot::Src => &self.src,
            Slot::Dst => &self.dst,
            Slot::Srv => &self.srv,
            Slot::Itf => &self.itf,
            Slot::When => &self.when,
            Slot::OSrc => &self.osrc,
            Slot::ODst => &self.odst,
            Slot::OSrv => &self.osrv,
            Slot::TSrc => &self.tsrc,
            Slot::TDst => &self.tdst,
            Slot::TSrv => &self.tsrv,
            Slot::ItfInb => &self.itf_inb,
            Slot::ItfOutb => &self.itf_outb,
            Slot::RDst => &self.rdst,
            Slot::RGtw => &self.rgtw,
            Slot::RItf => &self.ritf,
        }
    }

    pub fn get_mut(&mut self, slot: Slot) -> &mut Vec<Id> {
        match slot {
            Slot::Src => &mut self.src,
            Slot::Dst => &mut self.dst,
            Slot::Srv => &mut self.srv,
            Slot::Itf => &mut self.itf,
            Slot::When => &mut self.when,
            Slot::OSrc => &mut self.osrc,
            Slot::ODst => &mut self.odst,
            Slot::OSrv => &mut self.osrv,
            Slot::TSrc => &mut self.tsrc,
            Slot::TDst => &mut self.tdst,
            Slot::TSrv => &mut self.tsrv,
            Slot::ItfInb => &mut self.itf_inb,
            Slot::ItfOutb => &mut self.itf_outb,
            Slot::RDst => &mut self.rdst,
            Slot::RGtw => &mut self.rgtw,
            Slot::RItf => &mut self.ritf,
        }
    }

    pub fn is_any(&self, slot: Slot) -> bool {
        self.get(slot).is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct Negations(pub HashMap<Slot, bool>);

impl Negations {
    pub fn get(&self, slot: Slot) -> bool {
        self.0.get(&slot).copied().unwrap_or(false)
    }

    pub fn set(&mut self, slot: Slot, value: bool) {
        self.0.insert(slot, value);
    }
}

/// Per-rule options. A small subset of fields have a typed representation;
/// the rest fall back to a string-ish escape hatch (§9.1), never consulted
/// when a typed field already exists.
#[derive(Clone, Debug, Default)]
pub struct RuleOptions {
    pub log: bool,
    pub log_level: Option<LogLevel>,
    pub log_prefix: Option<String>,
    pub limit: Option<String>,
    pub limit_suffix: Option<String>,
    pub limit_burst: Option<i64>,
    pub hashlimit: Option<String>,
    pub hashlimit_name: Option<String>,
    pub hashlimit_burst: Option<i64>,
    pub connlimit_above: Option<i64>,
    pub connlimit_mask: Option<u8>,
    pub stateless: bool,
    pub ipt_continue: bool,
    pub ipt_mark_connections: Option<String>,
    pub tagging: Option<String>,
    pub classification: Option<String>,
    pub routing: Option<String>,
    pub action_on_reject: Option<String>,
    pub no_input_chain: bool,
    pub no_output_chain: bool,
    pub do_not_optimize_by_srv: bool,
    pub log_rate_limit: Option<LogRateLimit>,
    pub extra: HashMap<String, String>,
}

pub const RULE_LOG_DEFAULT: bool = false;
pub const RULE_STATELESS_DEFAULT: bool = false;

#[derive(Clone, Debug)]
pub struct Rule {
    pub kind: RuleKind,
    pub position: u32,
    pub label: String,
    pub comment: String,
    pub slots: Slots,
    pub negations: Negations,
    pub action: Action,
    pub direction: Direction,
    pub disabled: bool,
    pub fallback: bool,
    pub hidden: bool,
    pub options: RuleOptions,
}

impl Rule {
    /// Returns the option's value, or the firewall-wide default when unset.
    /// Per-rule options always win over per-firewall defaults (§6.3).
    pub fn log(&self) -> bool {
        self.options.log
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddressFamily {
    V4,
    V6,
    Both,
}

#[derive(Clone, Debug)]
pub struct RuleSet {
    pub kind: RuleKind,
    pub device: Id,
    pub family: AddressFamily,
    pub top: bool,
    pub branch_chain_name: Option<String>,
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn enabled_rules_in_order(&self) -> impl Iterator<Item = &Rule> {
        let mut rules: Vec<&Rule> = self.rules.iter().filter(|r| r.is_enabled()).collect();
        rules.sort_by_key(|r| r.position);
        rules.into_iter()
    }
}

fn parse_slot_list(token: &str) -> Result<(Vec<Id>, bool), Error> {
    let (negate, token) = match token.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, token),
    };

    if token == "any" {
        return Ok((Vec::new(), negate));
    }

    let ids = token
        .split(',')
        .map(|part| part.parse::<Id>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok((ids, negate))
}

fn slot_for_kind(kind: RuleKind, index: usize) -> Option<Slot> {
    match (kind, index) {
        (RuleKind::Policy, 0) => Some(Slot::Src),
        (RuleKind::Policy, 1) => Some(Slot::Dst),
        (RuleKind::Policy, 2) => Some(Slot::Srv),
        (RuleKind::Policy, 3) => Some(Slot::Itf),
        (RuleKind::Nat, 0) => Some(Slot::OSrc),
        (RuleKind::Nat, 1) => Some(Slot::ODst),
        (RuleKind::Nat, 2) => Some(Slot::OSrv),
        (RuleKind::Nat, 3) => Some(Slot::ItfInb),
        (RuleKind::Routing, 0) => Some(Slot::RDst),
        (RuleKind::Routing, 1) => Some(Slot::RGtw),
        (RuleKind::Routing, 2) => Some(Slot::RItf),
        _ => None,
    }
}

/// Parses one `[POLICY]`/`[NAT]`/`[ROUTING]` body line: whitespace-separated
/// slot tokens (an id list, `any`, or `!`-negated), followed by the action
/// keyword, followed by optional `key=value` options and a trailing
/// `# comment`. Grounded on the teacher's flat option-suffix line grammar
/// (`firewall/common.rs`'s rule parsing), generalized to the three rule
/// kinds' differing slot counts.
pub fn parse_rule_line(kind: RuleKind, position: u32, line: &str) -> Result<Rule, Error> {
    let slot_count = match kind {
        RuleKind::Policy => 4,
        RuleKind::Nat => 4,
        RuleKind::Routing => 3,
    };

    let mut slots = Slots::default();
    let mut negations = Negations::default();
    let mut rest = line;

    for index in 0..slot_count {
        let (token, tail) = match_non_whitespace(rest)
            .ok_or_else(|| anyhow::format_err!("rule line {position}: missing slot {index}"))?;
        let (ids, negate) = parse_slot_list(token)?;
        if let Some(slot) = slot_for_kind(kind, index) {
            *slots.get_mut(slot) = ids;
            negations.set(slot, negate);
        }
        rest = tail;
    }

    let (action_token, mut rest) = match_non_whitespace(rest)
        .ok_or_else(|| anyhow::format_err!("rule line {position}: missing action"))?;

    let action = match action_token {
        "ACCEPT" => Action::Accept,
        "REJECT" => Action::Reject,
        "DENY" => Action::Deny,
        "RETURN" => Action::Return,
        "CONTINUE" => Action::Continue,
        "ACCOUNTING" => Action::Accounting,
        "TRANSLATE" => Action::Translate,
        other if other.starts_with("BRANCH:") => Action::Branch {
            target: other["BRANCH:".len()..].to_string(),
        },
        other => Action::Custom(other.to_string()),
    };

    let (options_part, comment) = match rest.split_once('#') {
        Some((opts, comment)) => (opts, Some(comment.trim().to_string())),
        None => (std::mem::take(&mut rest), None),
    };

    let mut options = RuleOptions::default();
    let mut disabled = false;
    let mut fallback = false;
    let mut hidden = false;
    let mut direction = Direction::default();

    for token in options_part.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            bail!("rule line {position}: expected key=value option, found {token:?}");
        };
        match key {
            "log" => options.log = parse_bool(value)?,
            "disabled" => disabled = parse_bool(value)?,
            "fallback" => fallback = parse_bool(value)?,
            "hidden" => hidden = parse_bool(value)?,
            "stateless" => options.stateless = parse_bool(value)?,
            "direction" => {
                direction = match value {
                    "in" => Direction::Inbound,
                    "out" => Direction::Outbound,
                    "both" => Direction::Both,
                    _ => bail!("rule line {position}: invalid direction {value:?}"),
                }
            }
            other => {
                options.extra.insert(other.to_string(), value.to_string());
            }
        }
    }

    Ok(Rule {
        kind,
        position,
        label: String::new(),
        comment: comment.unwrap_or_default(),
        slots,
        negations,
        action,
        direction,
        disabled,
        fallback,
        hidden,
        options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rule_line_any() {
        let rule = parse_rule_line(RuleKind::Policy, 1, "any any any any ACCEPT").unwrap();
        assert!(rule.slots.is_any(Slot::Src));
        assert_eq!(rule.action, Action::Accept);
        assert!(!rule.disabled);
    }

    #[test]
    fn test_parse_rule_line_options_and_comment() {
        let rule = parse_rule_line(
            RuleKind::Policy,
            2,
            "any any any any REJECT log=1 disabled=0 # block everything",
        )
        .unwrap();
        assert!(rule.options.log);
        assert!(!rule.disabled);
        assert_eq!(rule.comment, "block everything");
    }
}
