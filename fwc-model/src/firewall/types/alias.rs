use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Error};

use crate::firewall::parse::match_non_whitespace;
use crate::firewall::types::address::Cidr;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AliasScope {
    Guest,
    Host,
    Cluster,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AliasName {
    scope: AliasScope,
    name: String,
}

impl AliasName {
    pub fn new(scope: AliasScope, name: String) -> Self {
        Self { scope, name }
    }

    pub fn scope(&self) -> AliasScope {
        self.scope
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for AliasName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A named shorthand for a CIDR network, referenced from rule slots instead
/// of repeating the network literal.
#[derive(Clone, Debug, PartialEq)]
pub struct Alias {
    name: String,
    address: Cidr,
    pub comment: Option<String>,
}

impl Alias {
    pub fn new(name: String, address: Cidr) -> Self {
        Self {
            name,
            address,
            comment: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &Cidr {
        &self.address
    }
}

impl FromStr for Alias {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let (name, rest) =
            match_non_whitespace(s).ok_or_else(|| anyhow::format_err!("missing alias name"))?;
        let (addr, rest) = match_non_whitespace(rest)
            .ok_or_else(|| anyhow::format_err!("missing alias address"))?;
        let address: Cidr = addr.parse()?;

        let comment = match rest.trim() {
            "" => None,
            rest => match rest.strip_prefix('#') {
                Some(c) => Some(c.trim().to_string()),
                None => bail!("unexpected trailing data in alias line: {rest:?}"),
            },
        };

        Ok(Self {
            name: name.to_string(),
            address,
            comment,
        })
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.name, self.address)?;
        if let Some(comment) = &self.comment {
            write!(f, " # {comment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_alias() {
        let alias: Alias = "my-net 10.0.0.0/8 # a comment".parse().unwrap();
        assert_eq!(alias.name(), "my-net");
        assert_eq!(alias.comment.as_deref(), Some("a comment"));
    }
}
