use crate::firewall::types::interface::Interface;
use crate::firewall::types::log::LogLevel;
use crate::firewall::types::rule::RuleSet;
use crate::Id;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    Host,
    Firewall,
    Cluster,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Platform {
    Ipt,
    Nft,
}

/// `major.minor.patch.build`-ish version used for the version-gated
/// features in §6.4 (`-w`, `-m conntrack`, NAT `--persistent`,
/// `icmp-admin-prohibited`, `-m set`).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord)]
pub struct EngineVersion(pub u16, pub u16, pub u16, pub u16);

impl EngineVersion {
    pub const fn new(major: u16, minor: u16, patch: u16, build: u16) -> Self {
        Self(major, minor, patch, build)
    }
}

pub const ENGINE_VERSION_WAIT_LOCK: EngineVersion = EngineVersion::new(1, 4, 20, 0);
pub const ENGINE_VERSION_CONNTRACK: EngineVersion = EngineVersion::new(1, 4, 4, 0);
pub const ENGINE_VERSION_NAT_PERSISTENT: EngineVersion = EngineVersion::new(1, 4, 3, 0);
pub const ENGINE_VERSION_ICMP_ADMIN_PROHIBITED: EngineVersion = EngineVersion::new(1, 2, 9, 0);
pub const ENGINE_VERSION_SET_MATCH: EngineVersion = EngineVersion::new(1, 4, 1, 1);

/// The ~80-option typed record recognized per firewall (§6.3, subset kept
/// typed here; everything else falls back to `extra`). Each default has a
/// `pub const` mirroring the teacher's `host.rs` convention.
#[derive(Clone, Debug)]
pub struct FirewallOptions {
    // Kernel (opaque to the pipeline, collected by the OS configurator).
    pub ip_forward: Option<bool>,
    pub rp_filter: Option<bool>,
    pub tcp_syncookies: Option<bool>,

    // Firewall behavior.
    pub firewall_is_part_of_any_and_networks: Option<bool>,
    pub accept_new_tcp_with_no_syn: Option<bool>,
    pub accept_established: Option<bool>,
    pub drop_invalid: Option<bool>,
    pub log_invalid: Option<bool>,
    pub check_shading: Option<bool>,
    pub ignore_empty_groups: Option<bool>,
    pub bridging_fw: Option<bool>,
    pub clamp_mss_to_mtu: Option<bool>,
    pub ipv6_neighbor_discovery: Option<bool>,

    // Logging.
    pub log_level: Option<LogLevel>,
    pub log_prefix: Option<String>,
    pub use_ulog: Option<bool>,
    pub use_nflog: Option<bool>,
    pub log_tcp_seq: Option<bool>,
    pub log_tcp_opt: Option<bool>,
    pub log_ip_opt: Option<bool>,
    pub log_all: Option<bool>,

    // Paths (opaque; passed to the script-assembly collaborator).
    pub path_iptables: Option<String>,
    pub path_ip6tables: Option<String>,
    pub nft_path: Option<String>,
    pub data_dir: Option<String>,

    // Output.
    pub use_iptables_restore: Option<bool>,
    pub output_file: Option<String>,
    pub script_name_on_firewall: Option<String>,
    pub prolog_place: Option<String>,
    pub prolog_script: Option<String>,
    pub epilog_script: Option<String>,
    pub ipv4_6_order: Option<String>,

    // Reject.
    pub action_on_reject: Option<String>,

    pub extra: std::collections::HashMap<String, String>,
}

pub const HOST_FIREWALL_IS_PART_OF_ANY_AND_NETWORKS_DEFAULT: bool = true;
pub const HOST_ACCEPT_ESTABLISHED_DEFAULT: bool = true;
pub const HOST_DROP_INVALID_DEFAULT: bool = true;
pub const HOST_LOG_INVALID_DEFAULT: bool = false;
pub const HOST_CHECK_SHADING_DEFAULT: bool = false;
pub const HOST_IGNORE_EMPTY_GROUPS_DEFAULT: bool = false;
pub const HOST_BRIDGING_FW_DEFAULT: bool = false;
pub const HOST_CLAMP_MSS_TO_MTU_DEFAULT: bool = false;
pub const HOST_IPV6_NEIGHBOR_DISCOVERY_DEFAULT: bool = true;
pub const HOST_USE_IPTABLES_RESTORE_DEFAULT: bool = true;
pub const HOST_ACTION_ON_REJECT_DEFAULT: &str = "icmp-admin-prohibited";

impl Default for FirewallOptions {
    fn default() -> Self {
        Self {
            ip_forward: None,
            rp_filter: None,
            tcp_syncookies: None,
            firewall_is_part_of_any_and_networks: None,
            accept_new_tcp_with_no_syn: None,
            accept_established: None,
            drop_invalid: None,
            log_invalid: None,
            check_shading: None,
            ignore_empty_groups: None,
            bridging_fw: None,
            clamp_mss_to_mtu: None,
            ipv6_neighbor_discovery: None,
            log_level: None,
            log_prefix: None,
            use_ulog: None,
            use_nflog: None,
            log_tcp_seq: None,
            log_tcp_opt: None,
            log_ip_opt: None,
            log_all: None,
            path_iptables: None,
            path_ip6tables: None,
            nft_path: None,
            data_dir: None,
            use_iptables_restore: None,
            output_file: None,
            script_name_on_firewall: None,
            prolog_place: None,
            prolog_script: None,
            epilog_script: None,
            ipv4_6_order: None,
            action_on_reject: None,
            extra: std::collections::HashMap::new(),
        }
    }
}

impl FirewallOptions {
    /// Returns `firewall_is_part_of_any_and_networks` or
    /// [`HOST_FIREWALL_IS_PART_OF_ANY_AND_NETWORKS_DEFAULT`] if unset.
    pub fn firewall_is_part_of_any_and_networks(&self) -> bool {
        self.firewall_is_part_of_any_and_networks
            .unwrap_or(HOST_FIREWALL_IS_PART_OF_ANY_AND_NETWORKS_DEFAULT)
    }

    /// Returns `accept_established` or [`HOST_ACCEPT_ESTABLISHED_DEFAULT`] if unset.
    pub fn accept_established(&self) -> bool {
        self.accept_established
            .unwrap_or(HOST_ACCEPT_ESTABLISHED_DEFAULT)
    }

    /// Returns `drop_invalid` or [`HOST_DROP_INVALID_DEFAULT`] if unset.
    pub fn drop_invalid(&self) -> bool {
        self.drop_invalid.unwrap_or(HOST_DROP_INVALID_DEFAULT)
    }

    /// Returns `check_shading` or [`HOST_CHECK_SHADING_DEFAULT`] if unset.
    pub fn check_shading(&self) -> bool {
        self.check_shading.unwrap_or(HOST_CHECK_SHADING_DEFAULT)
    }

    /// Returns `ignore_empty_groups` or [`HOST_IGNORE_EMPTY_GROUPS_DEFAULT`] if unset.
    pub fn ignore_empty_groups(&self) -> bool {
        self.ignore_empty_groups
            .unwrap_or(HOST_IGNORE_EMPTY_GROUPS_DEFAULT)
    }

    /// Returns `use_iptables_restore` or [`HOST_USE_IPTABLES_RESTORE_DEFAULT`] if unset.
    pub fn use_iptables_restore(&self) -> bool {
        self.use_iptables_restore
            .unwrap_or(HOST_USE_IPTABLES_RESTORE_DEFAULT)
    }

    /// Returns `action_on_reject` or [`HOST_ACTION_ON_REJECT_DEFAULT`] if unset.
    pub fn action_on_reject(&self) -> &str {
        self.action_on_reject
            .as_deref()
            .unwrap_or(HOST_ACTION_ON_REJECT_DEFAULT)
    }
}

#[derive(Clone, Debug)]
pub struct Device {
    pub id: Id,
    pub name: String,
    pub kind: Kind,
    pub interfaces: Vec<Interface>,
    pub rule_sets: Vec<RuleSet>,
    pub platform: Platform,
    pub version: EngineVersion,
    pub options: FirewallOptions,
}

impl Device {
    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    pub fn interface_by_id(&self, id: crate::Id) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.id == id)
    }
}
