//! Version-gate helper for the emitted wire syntax (spec §6.4): `-w` >=
//! 1.4.20, `-m conntrack` >= 1.4.4 else `-m state`, NAT `--persistent` >=
//! 1.4.3, `icmp-admin-prohibited` >= 1.2.9, `-m set` >= 1.4.1.1. No teacher
//! analogue carries version gating (the teacher is NFT-only and
//! version-independent); grounded on
//! `_policy_compiler.py`'s engine-version conditionals.

pub use fwc_model::firewall::types::device::{
    EngineVersion, ENGINE_VERSION_CONNTRACK, ENGINE_VERSION_ICMP_ADMIN_PROHIBITED,
    ENGINE_VERSION_NAT_PERSISTENT, ENGINE_VERSION_SET_MATCH, ENGINE_VERSION_WAIT_LOCK,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gates_are_ordered_as_expected() {
        assert!(ENGINE_VERSION_ICMP_ADMIN_PROHIBITED < ENGINE_VERSION_NAT_PERSISTENT);
        assert!(ENGINE_VERSION_NAT_PERSISTENT < ENGINE_VERSION_CONNTRACK);
        assert!(ENGINE_VERSION_CONNTRACK < ENGINE_VERSION_WAIT_LOCK);
    }
}
