use std::collections::HashSet;

use crate::rule::{IptRule, Match, Negatable, Target};

pub const STANDARD_CHAINS: &[&str] = &["INPUT", "OUTPUT", "FORWARD", "PREROUTING", "POSTROUTING"];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PrintVariant {
    /// Plain `$IPTABLES -A ...` shell commands, run one at a time.
    Shell,
    /// Lines inside an `iptables-restore` `*table ... COMMIT` batch.
    Restore,
    /// Same as `Restore`, but every line is wrapped in `echo "..."` so the
    /// batch can be piped to `iptables-restore` over a plain remote shell.
    RestoreEcho,
}

/// Renders [`IptRule`]s in one of the three surface syntaxes. Tracks which
/// chains have already had their `-N`/`:chain -` declaration emitted so each
/// chain is declared exactly once, mirroring `minus_n_commands`.
pub struct Printer {
    variant: PrintVariant,
    iptables_cmd: &'static str,
    wait_lock: bool,
    declared_chains: HashSet<(String, String)>,
}

impl Printer {
    /// `wait_lock` adds `-w` to each standalone shell invocation (§6.4:
    /// gated on `EngineVersion` >= 1.4.20); meaningless inside a
    /// `iptables-restore` batch, where the whole batch is one invocation.
    pub fn new(variant: PrintVariant, ipv6: bool, wait_lock: bool) -> Self {
        Self {
            variant,
            iptables_cmd: if ipv6 { "$IP6TABLES" } else { "$IPTABLES" },
            wait_lock,
            declared_chains: HashSet::new(),
        }
    }

    fn wrap(&self, line: String) -> String {
        match self.variant {
            PrintVariant::Shell | PrintVariant::Restore => line,
            PrintVariant::RestoreEcho => format!("echo \"{}\"", line.replace('"', "\\\"")),
        }
    }

    pub fn table_header(&self, table: &str) -> Option<String> {
        match self.variant {
            PrintVariant::Shell => None,
            PrintVariant::Restore => Some(format!("*{table}")),
            PrintVariant::RestoreEcho => Some(self.wrap(format!("*{table}"))),
        }
    }

    pub fn commit(&self) -> Option<String> {
        match self.variant {
            PrintVariant::Shell => None,
            PrintVariant::Restore => Some("COMMIT".to_string()),
            PrintVariant::RestoreEcho => Some("echo 'COMMIT'".to_string()),
        }
    }

    /// Declares a chain the first time it's referenced. Standard chains
    /// (`INPUT`, `OUTPUT`, ...) are always pre-existing and never declared.
    pub fn declare_chain(&mut self, table: &str, chain: &str) -> Option<String> {
        if STANDARD_CHAINS.contains(&chain) {
            return None;
        }
        if !self.declared_chains.insert((table.to_string(), chain.to_string())) {
            return None;
        }
        Some(match self.variant {
            PrintVariant::Shell => {
                let wait = if self.wait_lock { " -w" } else { "" };
                format!("{}{wait} -t {table} -N {chain}", self.iptables_cmd)
            }
            PrintVariant::Restore => format!(":{chain} - [0:0]"),
            PrintVariant::RestoreEcho => self.wrap(format!(":{chain} - [0:0]")),
        })
    }

    pub fn render_rule(&self, rule: &IptRule) -> String {
        let mut parts = Vec::new();
        match self.variant {
            PrintVariant::Shell => {
                parts.push(self.iptables_cmd.to_string());
                if self.wait_lock {
                    parts.push("-w".to_string());
                }
                if rule.table != "filter" {
                    parts.push(format!("-t {}", rule.table));
                }
                parts.push(format!("-A {}", rule.chain));
            }
            PrintVariant::Restore | PrintVariant::RestoreEcho => {
                parts.push(format!("-A {}", rule.chain));
            }
        }

        for m in &rule.matches {
            parts.push(render_match(m));
        }

        parts.push(render_target(&rule.target));

        if let Some(comment) = &rule.comment {
            parts.push(format!("-m comment --comment \"{}\"", comment.replace('"', "'")));
        }

        let line = parts.join(" ");
        self.wrap(line)
    }
}

fn render_negatable(flag: &str, value: &Negatable<String>) -> String {
    if value.negate {
        format!("! {flag} {}", value.value)
    } else {
        format!("{flag} {}", value.value)
    }
}

fn render_match(m: &Match) -> String {
    match m {
        Match::Protocol(p) => format!("-p {}", p.as_str()),
        Match::Source(v) => render_negatable("-s", v),
        Match::Destination(v) => render_negatable("-d", v),
        Match::InInterface(v) => render_negatable("-i", v),
        Match::OutInterface(v) => render_negatable("-o", v),
        Match::SourcePort(p) => format!("--sport {p}"),
        Match::DestPort(p) => format!("--dport {p}"),
        Match::Multiport { dports } => format!("-m multiport --dports {}", dports.join(",")),
        Match::IcmpType(t) => format!("--icmp-type {t}"),
        Match::Icmpv6Type(t) => format!("--icmpv6-type {t}"),
        Match::State { module, states } => {
            format!("-m {} {} {}", module.module_name(), module.option_name(), states.join(","))
        }
        Match::Mac(v) => render_negatable("--mac-source", v),
        Match::Limit { rate, burst } => match burst {
            Some(b) => format!("-m limit --limit {rate} --limit-burst {b}"),
            None => format!("-m limit --limit {rate}"),
        },
        Match::Set { name, direction, negate } => {
            let bang = if *negate { "! " } else { "" };
            format!("-m set {bang}--match-set {name} {direction}")
        }
        Match::Raw(text) => text.clone(),
    }
}

fn render_target(t: &Target) -> String {
    match t {
        Target::Accept => "-j ACCEPT".to_string(),
        Target::Drop => "-j DROP".to_string(),
        Target::Reject { with: Some(w) } => format!("-j REJECT --reject-with {w}"),
        Target::Reject { with: None } => "-j REJECT".to_string(),
        Target::Return => "-j RETURN".to_string(),
        Target::Continue => String::new(),
        Target::Jump(chain) => format!("-j {chain}"),
        Target::Goto(chain) => format!("-g {chain}"),
        Target::Queue => "-j QUEUE".to_string(),
        Target::Log { prefix, level } => {
            let mut s = "-j LOG".to_string();
            if let Some(p) = prefix {
                s.push_str(&format!(" --log-prefix \"{p}\""));
            }
            if let Some(l) = level {
                s.push_str(&format!(" --log-level {l}"));
            }
            s
        }
        Target::Snat { to, random, persistent } => {
            let mut s = format!("-j SNAT --to-source {to}");
            if *random {
                s.push_str(" --random");
            }
            if *persistent {
                s.push_str(" --persistent");
            }
            s
        }
        Target::Dnat { to, random, persistent } => {
            let mut s = format!("-j DNAT --to-destination {to}");
            if *random {
                s.push_str(" --random");
            }
            if *persistent {
                s.push_str(" --persistent");
            }
            s
        }
        Target::Masquerade { random } => {
            if *random {
                "-j MASQUERADE --random".to_string()
            } else {
                "-j MASQUERADE".to_string()
            }
        }
        Target::Netmap { to } => format!("-j NETMAP --to {to}"),
        Target::Redirect { to_ports: Some(ports) } => format!("-j REDIRECT --to-ports {ports}"),
        Target::Redirect { to_ports: None } => "-j REDIRECT".to_string(),
        Target::Custom(text) => format!("-j {text}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_rule_has_iptables_prefix() {
        let printer = Printer::new(PrintVariant::Shell, false, false);
        let rule = IptRule::new("filter", "INPUT", Target::Accept)
            .with_match(Match::Protocol(crate::rule::Protocol::Tcp))
            .with_match(Match::DestPort("22".to_string()));
        let line = printer.render_rule(&rule);
        assert_eq!(line, "$IPTABLES -A INPUT -p tcp --dport 22 -j ACCEPT");
    }

    #[test]
    fn shell_rule_includes_wait_lock_when_enabled() {
        let printer = Printer::new(PrintVariant::Shell, false, true);
        let rule = IptRule::new("filter", "INPUT", Target::Accept);
        let line = printer.render_rule(&rule);
        assert_eq!(line, "$IPTABLES -w -A INPUT -j ACCEPT");
    }

    #[test]
    fn restore_echo_wraps_in_echo() {
        let printer = Printer::new(PrintVariant::RestoreEcho, false, false);
        let rule = IptRule::new("filter", "INPUT", Target::Drop);
        let line = printer.render_rule(&rule);
        assert_eq!(line, "echo \"-A INPUT -j DROP\"");
    }

    #[test]
    fn chain_declared_once() {
        let mut printer = Printer::new(PrintVariant::Restore, false, false);
        assert_eq!(printer.declare_chain("filter", "C123.0"), Some(":C123.0 - [0:0]".to_string()));
        assert_eq!(printer.declare_chain("filter", "C123.0"), None);
    }

    #[test]
    fn standard_chains_are_never_declared() {
        let mut printer = Printer::new(PrintVariant::Restore, false, false);
        assert_eq!(printer.declare_chain("filter", "INPUT"), None);
    }

    #[test]
    fn negated_source_renders_bang_before_flag() {
        let printer = Printer::new(PrintVariant::Shell, false, false);
        let rule = IptRule::new("filter", "INPUT", Target::Drop)
            .with_match(Match::Source(Negatable::negated("10.0.0.0/8".to_string())));
        let line = printer.render_rule(&rule);
        assert_eq!(line, "$IPTABLES -A INPUT ! -s 10.0.0.0/8 -j DROP");
    }
}
