use std::collections::VecDeque;

use crate::comprule::CompRule;

/// Anything that can be asked for its next rule, pull-style. Every stage of
/// the compile pipeline implements this over its predecessor: nothing runs
/// until somebody downstream calls `next_rule`, and a stage only does the
/// work needed to produce one more rule (or learn there are none left).
pub trait Pipeline {
    fn next_rule(&mut self) -> Option<CompRule>;

    fn name(&self) -> &'static str;
}

/// One pipeline stage's transform: consumes a single rule from upstream and
/// produces zero, one, or many rules into its own output buffer (a split
/// produces many; a drop produces none).
pub trait Stage {
    fn name(&self) -> &'static str;

    fn process(&mut self, rule: CompRule) -> Vec<CompRule>;
}

/// Wraps a [`Stage`] into a [`Pipeline`] node: pulls from `predecessor` one
/// rule at a time, refilling its own FIFO buffer until it has something to
/// hand back or the predecessor is exhausted.
pub struct Processor<S> {
    stage: S,
    predecessor: Box<dyn Pipeline>,
    buffer: VecDeque<CompRule>,
    exhausted: bool,
}

impl<S: Stage> Processor<S> {
    pub fn new(stage: S, predecessor: Box<dyn Pipeline>) -> Self {
        Self {
            stage,
            predecessor,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }
}

impl<S: Stage> Pipeline for Processor<S> {
    fn next_rule(&mut self) -> Option<CompRule> {
        loop {
            if let Some(rule) = self.buffer.pop_front() {
                return Some(rule);
            }
            if self.exhausted {
                return None;
            }
            match self.predecessor.next_rule() {
                Some(rule) => self.buffer.extend(self.stage.process(rule)),
                None => self.exhausted = true,
            }
        }
    }

    fn name(&self) -> &'static str {
        self.stage.name()
    }
}

/// A stage that needs every rule from its predecessor before it can produce
/// its first output rule: shadow detection, deduplicate-by-emitted-text and
/// count-chain-usage all need the full rule set in hand rather than one rule
/// at a time (§4.2 stages 19-21).
pub trait SlurpingStage {
    fn name(&self) -> &'static str;

    fn process_all(&mut self, rules: Vec<CompRule>) -> Vec<CompRule>;
}

pub struct SlurpingProcessor<S> {
    stage: S,
    predecessor: Box<dyn Pipeline>,
    buffer: VecDeque<CompRule>,
    filled: bool,
}

impl<S: SlurpingStage> SlurpingProcessor<S> {
    pub fn new(stage: S, predecessor: Box<dyn Pipeline>) -> Self {
        Self {
            stage,
            predecessor,
            buffer: VecDeque::new(),
            filled: false,
        }
    }

    fn fill(&mut self) {
        let mut all = Vec::new();
        while let Some(rule) = self.predecessor.next_rule() {
            all.push(rule);
        }
        self.buffer = self.stage.process_all(all).into();
        self.filled = true;
    }
}

impl<S: SlurpingStage> Pipeline for SlurpingProcessor<S> {
    fn next_rule(&mut self) -> Option<CompRule> {
        if !self.filled {
            self.fill();
        }
        self.buffer.pop_front()
    }

    fn name(&self) -> &'static str {
        self.stage.name()
    }
}

/// Head of a pipeline: just replays an already-materialized rule list.
pub struct Begin {
    rules: VecDeque<CompRule>,
}

impl Begin {
    pub fn new(rules: impl IntoIterator<Item = CompRule>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
        }
    }
}

impl Pipeline for Begin {
    fn next_rule(&mut self) -> Option<CompRule> {
        self.rules.pop_front()
    }

    fn name(&self) -> &'static str {
        "Begin"
    }
}

/// Transparent pass-through that logs every rule as it crosses a named point
/// in the pipeline, the way `debug_print_rule` does between stages.
pub struct DebugProcessor {
    predecessor: Box<dyn Pipeline>,
    label: &'static str,
}

impl DebugProcessor {
    pub fn new(label: &'static str, predecessor: Box<dyn Pipeline>) -> Self {
        Self { predecessor, label }
    }
}

impl Pipeline for DebugProcessor {
    fn next_rule(&mut self) -> Option<CompRule> {
        let rule = self.predecessor.next_rule();
        if let Some(rule) = &rule {
            log::debug!(
                "{}: rule #{} action={:?} chain={:?}",
                self.label,
                rule.abs_rule_number,
                rule.action,
                rule.ipt_chain
            );
        }
        rule
    }

    fn name(&self) -> &'static str {
        self.label
    }
}

/// Drains a pipeline end to end. The epilog of every compile run.
pub fn collect_all(mut pipeline: Box<dyn Pipeline>) -> Vec<CompRule> {
    let mut out = Vec::new();
    while let Some(rule) = pipeline.next_rule() {
        out.push(rule);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DropDisabled;

    impl Stage for DropDisabled {
        fn name(&self) -> &'static str {
            "DropDisabled"
        }

        fn process(&mut self, rule: CompRule) -> Vec<CompRule> {
            if rule.disabled {
                Vec::new()
            } else {
                vec![rule]
            }
        }
    }

    struct Duplicate;

    impl Stage for Duplicate {
        fn name(&self) -> &'static str {
            "Duplicate"
        }

        fn process(&mut self, rule: CompRule) -> Vec<CompRule> {
            vec![rule.clone_fresh(), rule]
        }
    }

    fn sample_rule(position: u32, disabled: bool) -> CompRule {
        use fwc_model::firewall::types::rule::{Action, Direction, Rule, RuleKind, RuleOptions};

        CompRule::from_rule(&Rule {
            kind: RuleKind::Policy,
            position,
            label: String::new(),
            comment: String::new(),
            slots: Default::default(),
            negations: Default::default(),
            action: Action::Accept,
            direction: Direction::Both,
            disabled,
            fallback: false,
            hidden: false,
            options: RuleOptions::default(),
        })
    }

    #[test]
    fn drops_are_not_emitted() {
        let begin = Begin::new(vec![sample_rule(1, false), sample_rule(2, true), sample_rule(3, false)]);
        let pipeline = Processor::new(DropDisabled, Box::new(begin));
        let out = collect_all(Box::new(pipeline));
        assert_eq!(out.iter().map(|r| r.abs_rule_number).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn splits_fan_out_in_order() {
        let begin = Begin::new(vec![sample_rule(1, false), sample_rule(2, false)]);
        let pipeline = Processor::new(Duplicate, Box::new(begin));
        let out = collect_all(Box::new(pipeline));
        assert_eq!(out.len(), 4);
        assert_eq!(out[0].abs_rule_number, 1);
        assert_eq!(out[1].abs_rule_number, 1);
        assert_eq!(out[2].abs_rule_number, 2);
    }

    struct CountRules(usize);

    impl SlurpingStage for CountRules {
        fn name(&self) -> &'static str {
            "CountRules"
        }

        fn process_all(&mut self, rules: Vec<CompRule>) -> Vec<CompRule> {
            self.0 = rules.len();
            rules
        }
    }

    #[test]
    fn slurping_processor_sees_everything_before_emitting() {
        let begin = Begin::new(vec![sample_rule(1, false), sample_rule(2, false), sample_rule(3, false)]);
        let mut pipeline = SlurpingProcessor::new(CountRules(0), Box::new(begin));
        assert!(pipeline.next_rule().is_some());
        assert_eq!(pipeline.stage.0, 3);
    }
}
