use std::ops::{Deref, DerefMut};
use std::str::FromStr;

use anyhow::{bail, Error};

use crate::firewall::types::address::IpEntry;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IpsetScope {
    Guest,
    Host,
    Cluster,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IpsetName {
    scope: IpsetScope,
    name: String,
}

impl IpsetName {
    pub fn new(scope: IpsetScope, name: String) -> Self {
        Self { scope, name }
    }

    pub fn scope(&self) -> IpsetScope {
        self.scope
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IpsetEntry {
    pub address: IpEntry,
    pub negate: bool,
    pub comment: Option<String>,
}

impl FromStr for IpsetEntry {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let (entry, comment) = match s.split_once('#') {
            Some((entry, comment)) => (entry.trim(), Some(comment.trim().to_string())),
            None => (s.trim(), None),
        };

        let (negate, entry) = match entry.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, entry),
        };

        let address = if let Ok(cidr) = entry.parse() {
            IpEntry::Cidr(cidr)
        } else if let Some((a, b)) = entry.split_once('-') {
            IpEntry::Range(a.parse()?, b.parse()?)
        } else {
            bail!("invalid ipset entry: {entry:?}");
        };

        Ok(Self {
            address,
            negate,
            comment,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ipset {
    name: Option<IpsetName>,
    entries: Vec<IpsetEntry>,
    pub comment: Option<String>,
}

impl Ipset {
    pub fn new(name: IpsetName) -> Self {
        Self {
            name: Some(name),
            entries: Vec::new(),
            comment: None,
        }
    }

    pub fn name(&self) -> Option<&IpsetName> {
        self.name.as_ref()
    }

    pub fn parse_entry(&mut self, line: &str) -> Result<(), Error> {
        self.entries.push(line.parse()?);
        Ok(())
    }
}

impl Deref for Ipset {
    type Target = Vec<IpsetEntry>;

    fn deref(&self) -> &Self::Target {
        &self.entries
    }
}

impl DerefMut for Ipset {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.entries
    }
}

/// A read-only view over an [`Ipset`] filtered to its non-negated entries,
/// used by the printer when emitting the positive-match ipset body.
pub struct Ipfilter<'a>(&'a Ipset);

impl<'a> Ipfilter<'a> {
    pub fn new(ipset: &'a Ipset) -> Self {
        Self(ipset)
    }

    pub fn entries(&self) -> impl Iterator<Item = &'a IpsetEntry> {
        self.0.entries.iter().filter(|e| !e.negate)
    }
}

