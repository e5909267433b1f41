use crate::firewall::types::address::Address;
use crate::Id;

/// A named attachment point on a device (§3.1). Carries its own `Id` (unlike
/// addresses/services, interfaces aren't stored in the `Arena` — they're
/// name-keyed on `Device`, per §3.1 — but rule slots still address them by
/// `Id` like every other domain object, so the `Id` travels with the value
/// itself instead of through an arena lookup).
#[derive(Clone, Debug)]
pub struct Interface {
    pub id: Id,
    pub name: String,
    pub dynamic: bool,
    pub unnumbered: bool,
    pub bridge_port: bool,
    pub slave: bool,
    pub security_level: SecurityLevel,
    pub management: bool,
    pub parent: Option<String>,
    pub addresses: Vec<Address>,
}

impl Default for Interface {
    fn default() -> Self {
        Self {
            id: Id::generate(),
            name: String::new(),
            dynamic: false,
            unnumbered: false,
            bridge_port: false,
            slave: false,
            security_level: SecurityLevel::default(),
            management: false,
            parent: None,
            addresses: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SecurityLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl Interface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// An interface name ending in `*` is a wildcard in the source model;
    /// IPT emits it as `+` (§8.3).
    pub fn is_wildcard(&self) -> bool {
        self.name.ends_with('*')
    }

    pub fn ipt_name(&self) -> String {
        if self.is_wildcard() {
            format!("{}+", &self.name[..self.name.len() - 1])
        } else {
            self.name.clone()
        }
    }
}
