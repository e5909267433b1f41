use std::collections::{BTreeMap, HashMap};
use std::io;

use anyhow::{bail, format_err, Error};

use crate::firewall::parse::{
    deserialize_options, parse_named_section_tail, split_key_value, SomeString,
};
use crate::firewall::types::alias::Alias;
use crate::firewall::types::device::{Device, FirewallOptions};
use crate::firewall::types::group::{Group, GroupKind};
use crate::firewall::types::ipset::{Ipset, IpsetName, IpsetScope};
use crate::firewall::types::rule::{Rule, RuleKind, RuleSet};
use crate::Id;

/// In-memory, read-only-during-compilation store of every referenceable
/// object (§9.1: "cyclic object graph" -> arena keyed by stable id).
#[derive(Default)]
pub struct Arena {
    pub addresses: BTreeMap<Id, crate::firewall::types::Address>,
    pub services: BTreeMap<Id, crate::firewall::types::Service>,
    pub groups: BTreeMap<Id, Group>,
    pub aliases: BTreeMap<String, Alias>,
    pub ipsets: BTreeMap<String, Ipset>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_address(&mut self, addr: crate::firewall::types::Address) -> Id {
        let id = Id::generate();
        self.addresses.insert(id, addr);
        id
    }

    pub fn insert_service(&mut self, srv: crate::firewall::types::Service) -> Id {
        let id = Id::generate();
        self.services.insert(id, srv);
        id
    }

    pub fn insert_group(&mut self, group: Group) -> Id {
        let id = Id::generate();
        self.groups.insert(id, group);
        id
    }
}

/// A database of firewalls plus their shared object libraries (§6.1).
#[derive(Default)]
pub struct Model {
    pub arena: Arena,
    pub devices: BTreeMap<Id, Device>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Parser configuration, analogous to the teacher's `ParserConfig`.
#[derive(Default)]
pub struct ParserConfig {
    pub guest_iface_names: bool,
    pub ipset_scope: Option<IpsetScope>,
}

enum Sec {
    None,
    Options,
    Aliases,
    Policy,
    Nat,
    Routing,
    Ipset(String, Ipset),
    Group(String, Group),
}

/// Parses one device's firewall configuration text (the `[OPTIONS]` /
/// `[ALIASES]` / `[POLICY]` / `[NAT]` / `[ROUTING]` / `[IPSET ...]` /
/// `[group ...]` sections), grounded on the teacher's `Config::parse`
/// INI-section state machine, generalized to the three rule kinds instead
/// of a single flat `[RULES]` section.
pub struct DeviceConfig {
    pub options: FirewallOptions,
    pub rule_sets: Vec<RuleSet>,
    pub aliases: BTreeMap<String, Alias>,
    pub ipsets: BTreeMap<String, Ipset>,
    pub groups: BTreeMap<String, Group>,
}

impl DeviceConfig {
    pub fn parse<R: io::BufRead>(
        input: R,
        device: Id,
        parser_cfg: &ParserConfig,
    ) -> Result<Self, Error> {
        let mut section = Sec::None;
        let mut options_raw: HashMap<String, SomeString> = HashMap::new();
        let mut aliases = BTreeMap::new();
        let mut ipsets = BTreeMap::new();
        let mut groups = BTreeMap::new();

        let mut policy = Vec::new();
        let mut nat = Vec::new();
        let mut routing = Vec::new();
        let mut position = 0u32;

        for line in input.lines() {
            let line = line?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            log::trace!("parsing config line {line}");

            if line.eq_ignore_ascii_case("[OPTIONS]") {
                Self::flush(&mut section, Sec::Options, &mut ipsets, &mut groups)?;
            } else if line.eq_ignore_ascii_case("[ALIASES]") {
                Self::flush(&mut section, Sec::Aliases, &mut ipsets, &mut groups)?;
            } else if line.eq_ignore_ascii_case("[POLICY]") {
                position = 0;
                Self::flush(&mut section, Sec::Policy, &mut ipsets, &mut groups)?;
            } else if line.eq_ignore_ascii_case("[NAT]") {
                position = 0;
                Self::flush(&mut section, Sec::Nat, &mut ipsets, &mut groups)?;
            } else if line.eq_ignore_ascii_case("[ROUTING]") {
                position = 0;
                Self::flush(&mut section, Sec::Routing, &mut ipsets, &mut groups)?;
            } else if let Some(rest) = line.strip_prefix("[IPSET") {
                let (name, comment) = parse_named_section_tail("ipset", rest)?;
                let scope = parser_cfg
                    .ipset_scope
                    .ok_or_else(|| format_err!("IPSET in config, but no scope set"))?;
                let mut ipset = Ipset::new(IpsetName::new(scope, name.to_string()));
                ipset.comment = comment.map(str::to_owned);
                Self::flush(
                    &mut section,
                    Sec::Ipset(name.to_string(), ipset),
                    &mut ipsets,
                    &mut groups,
                )?;
            } else if let Some(rest) = line.strip_prefix("[group") {
                let (name, comment) = parse_named_section_tail("group", rest)?;
                let mut group = Group::new(GroupKind::Object);
                group.set_comment(comment.map(str::to_owned));
                Self::flush(
                    &mut section,
                    Sec::Group(name.to_owned(), group),
                    &mut ipsets,
                    &mut groups,
                )?;
            } else if line.starts_with('[') {
                bail!("invalid section {line:?}");
            } else {
                match &mut section {
                    Sec::None => bail!("config line with no section: {line:?}"),
                    Sec::Options => {
                        let (key, value) = split_key_value(line).ok_or_else(|| {
                            format_err!("expected key: value, found {line:?}")
                        })?;
                        if options_raw.insert(key.to_string(), value.into()).is_some() {
                            bail!("duplicate option {key:?}");
                        }
                    }
                    Sec::Aliases => {
                        let alias: Alias = line.parse()?;
                        if aliases.insert(alias.name().to_string(), alias).is_some() {
                            bail!("duplicate alias: {line}");
                        }
                    }
                    Sec::Policy => {
                        position += 1;
                        policy.push((position, line.to_string()));
                    }
                    Sec::Nat => {
                        position += 1;
                        nat.push((position, line.to_string()));
                    }
                    Sec::Routing => {
                        position += 1;
                        routing.push((position, line.to_string()));
                    }
                    Sec::Ipset(_, ipset) => ipset.parse_entry(line)?,
                    Sec::Group(_, group) => {
                        let id: Id = line.trim().parse()?;
                        group.members.push(id);
                    }
                }
            }

            let _ = parser_cfg.guest_iface_names;
        }

        Self::flush(&mut section, Sec::None, &mut ipsets, &mut groups)?;

        let options: FirewallOptions = deserialize_options(options_raw)?;

        let mut rule_sets = Vec::new();
        for (kind, lines) in [
            (RuleKind::Policy, policy),
            (RuleKind::Nat, nat),
            (RuleKind::Routing, routing),
        ] {
            if lines.is_empty() {
                continue;
            }
            let rules: Result<Vec<Rule>, Error> = lines
                .into_iter()
                .map(|(pos, line)| crate::firewall::types::rule::parse_rule_line(kind, pos, &line))
                .collect();
            rule_sets.push(RuleSet {
                kind,
                device,
                family: crate::firewall::types::rule::AddressFamily::Both,
                top: true,
                branch_chain_name: None,
                rules: rules?,
            });
        }

        Ok(Self {
            options,
            rule_sets,
            aliases,
            ipsets,
            groups,
        })
    }

    fn flush(
        sec: &mut Sec,
        to: Sec,
        ipsets: &mut BTreeMap<String, Ipset>,
        groups: &mut BTreeMap<String, Group>,
    ) -> Result<(), Error> {
        let prev = std::mem::replace(sec, to);
        match prev {
            Sec::Ipset(name, ipset) => {
                if ipsets.insert(name.clone(), ipset).is_some() {
                    bail!("duplicate ipset: {name:?}");
                }
            }
            Sec::Group(name, group) => {
                if groups.insert(name.clone(), group).is_some() {
                    bail!("duplicate group: {name:?}");
                }
            }
            _ => (),
        }
        Ok(())
    }
}
