use std::fmt;

use fwc_model::Id;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// One compiler-observable event, with enough provenance to point a user at
/// the offending rule (`<firewall>:<ruleset>:<position>: warning|error: <message>`).
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub firewall: Id,
    pub ruleset: String,
    pub position: u32,
    pub text: String,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn warning(firewall: Id, ruleset: impl Into<String>, position: u32, text: impl Into<String>) -> Self {
        Self {
            firewall,
            ruleset: ruleset.into(),
            position,
            text: text.into(),
            severity: Severity::Warning,
        }
    }

    pub fn error(firewall: Id, ruleset: impl Into<String>, position: u32, text: impl Into<String>) -> Self {
        Self {
            firewall,
            ruleset: ruleset.into(),
            position,
            text: text.into(),
            severity: Severity::Error,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.firewall, self.ruleset, self.position, self.severity, self.text
        )
    }
}

/// Process-exit-code-bearing summary of a compilation run (§6.5).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Success,
    Warning,
    Error,
}

impl Outcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::Warning => 1,
            Outcome::Error => 2,
        }
    }
}

/// Rolls a diagnostic list up into the single outcome the driver returns.
pub fn summarize(diagnostics: &[Diagnostic]) -> Outcome {
    if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        Outcome::Error
    } else if diagnostics.is_empty() {
        Outcome::Success
    } else {
        Outcome::Warning
    }
}

/// Compiler-scoped sink any pipeline stage can push into. Owned by
/// `CompilerCtx` and shared with every stage of one compile pass; an error
/// push additionally latches `aborted` so the driver can short-circuit
/// rather than keep feeding a pipeline whose invariants are already broken.
#[derive(Clone, Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
    aborted: bool,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, firewall: Id, ruleset: impl Into<String>, position: u32, text: impl Into<String>) {
        self.diagnostics.push(Diagnostic::warning(firewall, ruleset, position, text));
    }

    pub fn error(&mut self, firewall: Id, ruleset: impl Into<String>, position: u32, text: impl Into<String>) {
        self.diagnostics.push(Diagnostic::error(firewall, ruleset, position, text));
        self.aborted = true;
    }

    pub fn aborted(&self) -> bool {
        self.aborted
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn outcome(&self) -> Outcome {
        summarize(&self.diagnostics)
    }
}
