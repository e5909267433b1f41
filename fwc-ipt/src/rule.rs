use fwc_model::firewall::types::device::EngineVersion;

/// A value that can be matched directly or with `!` negation. The ordering
/// of the `!` relative to its option (`! -i eth0` vs `-i ! eth0`) is an
/// iptables-version-gated detail the printer decides, not this type.
#[derive(Clone, Debug)]
pub struct Negatable<T> {
    pub value: T,
    pub negate: bool,
}

impl<T> Negatable<T> {
    pub fn new(value: T) -> Self {
        Self { value, negate: false }
    }

    pub fn negated(value: T) -> Self {
        Self { value, negate: true }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Icmpv6,
    All,
    Number(u8),
}

impl Protocol {
    pub fn as_str(&self) -> String {
        match self {
            Protocol::Tcp => "tcp".to_string(),
            Protocol::Udp => "udp".to_string(),
            Protocol::Icmp => "icmp".to_string(),
            Protocol::Icmpv6 => "ipv6-icmp".to_string(),
            Protocol::All => "all".to_string(),
            Protocol::Number(n) => n.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StateModule {
    Conntrack,
    State,
}

impl StateModule {
    pub fn gated(version: EngineVersion) -> Self {
        if version >= fwc_model::firewall::types::device::ENGINE_VERSION_CONNTRACK {
            StateModule::Conntrack
        } else {
            StateModule::State
        }
    }

    pub fn module_name(&self) -> &'static str {
        match self {
            StateModule::Conntrack => "conntrack",
            StateModule::State => "state",
        }
    }

    pub fn option_name(&self) -> &'static str {
        match self {
            StateModule::Conntrack => "--ctstate",
            StateModule::State => "--state",
        }
    }
}

/// One `-m`/bare-option match clause.
#[derive(Clone, Debug)]
pub enum Match {
    Protocol(Protocol),
    Source(Negatable<String>),
    Destination(Negatable<String>),
    InInterface(Negatable<String>),
    OutInterface(Negatable<String>),
    SourcePort(String),
    DestPort(String),
    Multiport { dports: Vec<String> },
    IcmpType(String),
    Icmpv6Type(String),
    State { module: StateModule, states: Vec<String> },
    Mac(Negatable<String>),
    Limit { rate: String, burst: Option<u32> },
    Set { name: String, direction: &'static str, negate: bool },
    /// Escape hatch for options that don't warrant their own variant
    /// (raw `-m xyz --foo bar` text, already fully formatted).
    Raw(String),
}

#[derive(Clone, Debug)]
pub enum Target {
    Accept,
    Drop,
    Reject { with: Option<String> },
    Return,
    /// No `-j`/`-g` at all: falls through to the next rule in the chain.
    Continue,
    Jump(String),
    Goto(String),
    Queue,
    Log { prefix: Option<String>, level: Option<String> },
    /// `-j SNAT --to-source <addr>[:<port-range>] [--random] [--persistent]`
    Snat { to: String, random: bool, persistent: bool },
    /// `-j DNAT --to-destination <addr>[:<port-range>] [--random] [--persistent]`
    Dnat { to: String, random: bool, persistent: bool },
    /// `-j MASQUERADE [--random]`
    Masquerade { random: bool },
    /// `-j NETMAP --to <addr/mask>`
    Netmap { to: String },
    /// `-j REDIRECT [--to-ports <ports>]`
    Redirect { to_ports: Option<String> },
    Custom(String),
}

/// One fully-resolved iptables rule, independent of which of the three
/// surface syntaxes it's printed as.
#[derive(Clone, Debug)]
pub struct IptRule {
    pub table: String,
    pub chain: String,
    pub direction_in: bool,
    pub matches: Vec<Match>,
    pub target: Target,
    pub comment: Option<String>,
}

impl IptRule {
    pub fn new(table: impl Into<String>, chain: impl Into<String>, target: Target) -> Self {
        Self {
            table: table.into(),
            chain: chain.into(),
            direction_in: true,
            matches: Vec::new(),
            target,
            comment: None,
        }
    }

    pub fn with_match(mut self, m: Match) -> Self {
        self.matches.push(m);
        self
    }
}
