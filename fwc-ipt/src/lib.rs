//! iptables-restore AST: tables, chains, match/target syntax, and a printer
//! with the three surface syntaxes the original compiler can emit (plain
//! shell `iptables` invocations, an `iptables-restore` batch, and the same
//! batch wrapped line-by-line in `echo` for remote installation over a
//! shell that doesn't have `iptables-restore` piped directly).

pub mod printer;
pub mod rule;

pub use printer::{PrintVariant, Printer};
pub use rule::{Match, Negatable, Target, IptRule};
