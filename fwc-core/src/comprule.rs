use fwc_model::firewall::types::rule::{
    Action, Direction, NatRuleType, Negations, Rule, RuleKind, RuleOptions, Slots,
};

/// The mutable per-rule working copy a pipeline passes from stage to stage.
/// Field-for-field grounded on the original compiler's rule-processing
/// dataclass: slot lists plus a bag of compile-time metadata that no single
/// stage owns outright.
#[derive(Clone, Debug)]
pub struct CompRule {
    pub kind: RuleKind,
    pub position: u32,
    pub abs_rule_number: u32,
    pub label: String,
    pub comment: String,

    pub slots: Slots,
    pub negations: Negations,
    pub action: Action,
    pub direction: Direction,
    pub nat_rule_type: Option<NatRuleType>,

    pub disabled: bool,
    pub fallback: bool,
    pub hidden: bool,
    pub options: RuleOptions,

    // Compile metadata filled in by later stages.
    pub ipt_chain: Option<String>,
    pub ipt_target: Option<String>,
    pub rule_weight: i64,
    pub compiler_message: Option<String>,
    pub iface_label: Option<String>,
    pub nat_iface_in: Option<String>,
    pub nat_iface_out: Option<String>,
    pub stored_action: Option<String>,
    pub nft_log: bool,
    pub force_state_check: bool,
    pub upstream_rule_chain: Option<String>,
    pub final_rule: bool,
    pub parent_rule_num: Option<u32>,
    pub subrule_suffix: Option<String>,

    // Negation-lowering flags (§4.3).
    pub src_single_object_negation: bool,
    pub dst_single_object_negation: bool,

    // Optimization flags (§4.2 stage 15-17, §4.3 multiport/factoring).
    pub ipt_multiport: bool,
    pub merged_tcp_udp: bool,
    pub do_not_optimize_by_srv: bool,

    /// Set by an earlier filtering stage; consumed by
    /// `generic::drop_rules_with_empty_re` (§4.2 stage 9).
    pub has_empty_re: bool,
}

impl CompRule {
    pub fn from_rule(rule: &Rule) -> Self {
        Self {
            kind: rule.kind,
            position: rule.position,
            abs_rule_number: rule.position,
            label: rule.label.clone(),
            comment: rule.comment.clone(),
            slots: rule.slots.clone(),
            negations: rule.negations.clone(),
            action: rule.action.clone(),
            direction: rule.direction,
            nat_rule_type: None,
            disabled: rule.disabled,
            fallback: rule.fallback,
            hidden: rule.hidden,
            options: rule.options.clone(),
            ipt_chain: None,
            ipt_target: None,
            rule_weight: 0,
            compiler_message: None,
            iface_label: None,
            nat_iface_in: None,
            nat_iface_out: None,
            stored_action: None,
            nft_log: false,
            force_state_check: false,
            upstream_rule_chain: None,
            final_rule: false,
            parent_rule_num: None,
            subrule_suffix: None,
            src_single_object_negation: false,
            dst_single_object_negation: false,
            ipt_multiport: false,
            merged_tcp_udp: false,
            do_not_optimize_by_srv: rule.options.do_not_optimize_by_srv,
            has_empty_re: false,
        }
    }

    /// The Rust analogue of the original `CompRule.clone()`: a deep copy of
    /// the slot `Vec`s (still referencing the same `Id`s) and a fresh
    /// options/negations map. Domain objects are never owned here, only
    /// addressed by `Id`, so an ordinary derive-`Clone` already gives the
    /// right semantics; this just names the operation the way the pipeline
    /// stages use it.
    pub fn clone_fresh(&self) -> Self {
        self.clone()
    }

    pub fn is_srv_any(&self) -> bool {
        self.slots.srv.is_empty()
    }

    pub fn is_src_any(&self) -> bool {
        self.slots.src.is_empty()
    }

    pub fn is_dst_any(&self) -> bool {
        self.slots.dst.is_empty()
    }

    pub fn is_itf_any(&self) -> bool {
        self.slots.itf.is_empty()
    }
}
