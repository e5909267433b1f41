pub mod address;
pub mod alias;
pub mod device;
pub mod group;
pub mod interface;
pub mod ipset;
pub mod log;
pub mod port;
pub mod rule;
pub mod rule_match;

pub use address::{Address, Cidr, Family, IpEntry, IpList};
pub use device::{Device, EngineVersion, FirewallOptions, Kind, Platform};
pub use group::{Group, GroupKind};
pub use interface::Interface;
pub use rule::{
    Action, AddressFamily, Direction, NatRuleType, Negations, Rule, RuleKind, RuleOptions,
    RuleSet, Slot, Slots,
};
pub use rule_match::Service;
