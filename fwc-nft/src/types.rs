use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::expression::Expression;
use crate::helper::{NfVec, Null};
use crate::statement::Statement;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accept(Null),
    Drop(Null),
    Continue(Null),
    Return(Null),
    Goto { target: String },
    Jump { target: String },
}

impl Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let output = match self {
            Verdict::Accept(_) => "ACCEPT",
            Verdict::Drop(_) => "DROP",
            Verdict::Continue(_) => "CONTINUE",
            Verdict::Return(_) => "RETURN",
            Verdict::Jump { .. } => "JUMP",
            Verdict::Goto { .. } => "GOTO",
        };

        f.write_str(output)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ElemConfig {
    timeout: Option<i64>,
    expires: Option<i64>,
    comment: Option<String>,
}

impl ElemConfig {
    pub fn new(
        timeout: impl Into<Option<i64>>,
        expires: impl Into<Option<i64>>,
        comment: impl Into<Option<String>>,
    ) -> Self {
        Self {
            timeout: timeout.into(),
            expires: expires.into(),
            comment: comment.into(),
        }
    }
}

/// The nftables address family a table/chain/set/rule belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Ip,
    Ip6,
    Inet,
    Arp,
    Bridge,
    Netdev,
}

impl Default for Family {
    fn default() -> Self {
        Family::Inet
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TableName {
    pub family: Family,
    pub name: String,
}

impl TableName {
    pub fn new(family: Family, name: impl Into<String>) -> Self {
        Self {
            family,
            name: name.into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChainName {
    pub family: Family,
    pub table: String,
    pub name: String,
}

impl ChainName {
    pub fn new(family: Family, table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            family,
            table: table.into(),
            name: name.into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SetName {
    pub family: Family,
    pub table: String,
    pub name: String,
}

impl SetName {
    pub fn new(family: Family, table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            family,
            table: table.into(),
            name: name.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    Filter,
    Nat,
    Route,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Hook {
    Prerouting,
    Input,
    Forward,
    Output,
    Postrouting,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    Accept,
    Drop,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AddTable {
    pub family: Family,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<i64>,
}

impl From<TableName> for AddTable {
    fn from(value: TableName) -> Self {
        Self {
            family: value.family,
            name: value.name,
            handle: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AddChain {
    pub family: Family,
    pub table: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newname: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<ChainType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook: Option<Hook>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prio: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<Policy>,
}

impl AddChain {
    pub fn regular(family: Family, table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            family,
            table: table.into(),
            name: name.into(),
            newname: None,
            ty: None,
            hook: None,
            prio: None,
            policy: None,
        }
    }

    pub fn base(
        family: Family,
        table: impl Into<String>,
        name: impl Into<String>,
        ty: ChainType,
        hook: Hook,
        prio: i64,
        policy: Policy,
    ) -> Self {
        Self {
            family,
            table: table.into(),
            name: name.into(),
            newname: None,
            ty: Some(ty),
            hook: Some(hook),
            prio: Some(prio),
            policy: Some(policy),
        }
    }
}

impl From<ChainName> for AddChain {
    fn from(value: ChainName) -> Self {
        Self::regular(value.family, value.table, value.name)
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AddRule {
    pub family: Family,
    pub table: String,
    pub chain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<NfVec<Statement>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,
}

impl AddRule {
    pub fn new(
        family: Family,
        table: impl Into<String>,
        chain: impl Into<String>,
        expr: Vec<Statement>,
    ) -> Self {
        Self {
            family,
            table: table.into(),
            chain: chain.into(),
            expr: Some(NfVec::from(expr)),
            comment: None,
            handle: None,
            index: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SetType {
    Single(String),
    Concat(Vec<String>),
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SetFlag {
    Constant,
    Interval,
    Timeout,
    Dynamic,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AddSet {
    pub family: Family,
    pub table: String,
    pub name: String,
    #[serde(rename = "type")]
    pub set_type: SetType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<SetFlag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elem: Option<NfVec<Expression>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl AddSet {
    pub fn new(
        family: Family,
        table: impl Into<String>,
        name: impl Into<String>,
        set_type: SetType,
    ) -> Self {
        Self {
            family,
            table: table.into(),
            name: name.into(),
            set_type,
            flags: Vec::new(),
            elem: None,
            timeout: None,
            size: None,
            comment: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AddMap {
    pub family: Family,
    pub table: String,
    pub name: String,
    #[serde(rename = "type")]
    pub set_type: SetType,
    pub map: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<SetFlag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elem: Option<NfVec<Expression>>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateUnit {
    Packets,
    Bytes,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateTimescale {
    #[default]
    Second,
    Minute,
    Hour,
    Day,
}

#[cfg(feature = "config-ext")]
impl From<fwc_model::firewall::types::log::LogRateLimitTimescale> for RateTimescale {
    fn from(value: fwc_model::firewall::types::log::LogRateLimitTimescale) -> Self {
        use fwc_model::firewall::types::log::LogRateLimitTimescale as T;
        match value {
            T::Second => RateTimescale::Second,
            T::Minute => RateTimescale::Minute,
            T::Hour => RateTimescale::Hour,
            T::Day => RateTimescale::Day,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AddLimit {
    pub family: Family,
    pub table: String,
    pub name: String,
    pub rate: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_unit: Option<RateUnit>,
    pub per: RateTimescale,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burst: Option<i64>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AddElement {
    pub family: Family,
    pub table: String,
    pub name: String,
    pub elem: NfVec<Expression>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AddCtHelper {
    pub family: Family,
    pub table: String,
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub l3proto: Option<Family>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ListChain {
    pub family: Family,
    pub table: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<i64>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ListSet {
    pub family: Family,
    pub table: String,
    pub name: String,
    #[serde(rename = "type")]
    pub set_type: SetType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<SetFlag>,
}
