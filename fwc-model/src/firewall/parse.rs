use std::collections::HashMap;
use std::fmt;

use anyhow::{bail, Error};
use serde::de::{value::MapDeserializer, IntoDeserializer};

/// Parses out a "name" which can be alphanumeric and include dashes.
///
/// Returns `None` if the name part would be empty.
///
/// Returns a tuple with the name and the remainder (not trimmed).
pub fn match_name(line: &str) -> Option<(&str, &str)> {
    let end = line
        .as_bytes()
        .iter()
        .position(|&b| !(b.is_ascii_alphanumeric() || b == b'-'));

    let (name, rest) = match end {
        Some(end) => line.split_at(end),
        None => (line, ""),
    };

    if name.is_empty() {
        None
    } else {
        Some((name, rest))
    }
}

/// Parses up to the next whitespace character or end of the string.
///
/// Returns `None` if the non-whitespace part would be empty.
///
/// Returns a tuple containing the parsed section and the *trimmed* remainder.
pub fn match_non_whitespace(line: &str) -> Option<(&str, &str)> {
    let (text, rest) = line
        .as_bytes()
        .iter()
        .position(|&b| b.is_ascii_whitespace())
        .map(|pos| {
            let (a, b) = line.split_at(pos);
            (a, b.trim_start())
        })
        .unwrap_or((line, ""));
    if text.is_empty() {
        None
    } else {
        Some((text, rest))
    }
}

pub fn parse_bool(value: &str) -> Result<bool, Error> {
    Ok(
        if value == "0"
            || value.eq_ignore_ascii_case("false")
            || value.eq_ignore_ascii_case("off")
            || value.eq_ignore_ascii_case("no")
        {
            false
        } else if value == "1"
            || value.eq_ignore_ascii_case("true")
            || value.eq_ignore_ascii_case("on")
            || value.eq_ignore_ascii_case("yes")
        {
            true
        } else {
            bail!("not a boolean: {value:?}");
        },
    )
}

/// Splits `key: value` or `key value`, trimming both sides.
pub fn split_key_value(line: &str) -> Option<(&str, &str)> {
    let (key, rest) = if let Some(pos) = line.find(':') {
        (&line[..pos], &line[pos + 1..])
    } else {
        match_non_whitespace(line)?
    };

    let key = key.trim();
    let value = rest.trim();

    if key.is_empty() || value.is_empty() {
        None
    } else {
        Some((key, value))
    }
}

/// Parses the tail of a named section header, e.g. `group foo # a comment]`
/// or `ipset bar]`, already stripped of its `[<kind` prefix.
pub fn parse_named_section_tail<'a>(
    kind: &str,
    tail: &'a str,
) -> Result<(&'a str, Option<&'a str>), Error> {
    let tail = tail.trim_start();
    let (name, rest) =
        match_non_whitespace(tail).ok_or_else(|| anyhow::format_err!("missing {kind} name"))?;

    let rest = rest
        .strip_suffix(']')
        .ok_or_else(|| anyhow::format_err!("missing closing ']' in {kind} header"))?
        .trim();

    if let Some(comment) = rest.strip_prefix('#') {
        Ok((name, Some(comment.trim())))
    } else if rest.is_empty() {
        Ok((name, None))
    } else {
        bail!("unexpected trailing data in {kind} header: {rest:?}")
    }
}

/// A string-ish value pulled from a key/value options line; knows how to
/// convert itself during the later typed deserialize pass.
#[derive(Debug, Clone)]
pub struct SomeString(pub String);

impl From<&str> for SomeString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for SomeString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(Self(String::deserialize(deserializer)?))
    }
}

impl<'de> IntoDeserializer<'de, SerdeStringError> for SomeString {
    type Deserializer = serde::de::value::StringDeserializer<'de, SerdeStringError>;

    fn into_deserializer(self) -> Self::Deserializer {
        self.0.into_deserializer()
    }
}

#[derive(Debug)]
pub struct SerdeStringError(String);

impl fmt::Display for SerdeStringError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for SerdeStringError {}

impl serde::de::Error for SerdeStringError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self(msg.to_string())
    }
}

/// Deserializes a typed options record out of a flat string-map, the way
/// the per-firewall `[OPTIONS]` section's keys get promoted to struct
/// fields.
pub fn deserialize_options<T>(map: HashMap<String, SomeString>) -> Result<T, Error>
where
    T: serde::de::DeserializeOwned,
{
    let iter = map.into_iter().map(|(k, v)| (k, v.0));
    T::deserialize(MapDeserializer::<_, SerdeStringError>::new(iter))
        .map_err(|e| anyhow::format_err!("{e}"))
}
