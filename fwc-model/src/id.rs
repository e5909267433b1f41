use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Error};

/// Stable 128-bit object identity, used for addresses, services, interfaces,
/// devices, groups, rules and rule sets alike.
///
/// Identity is opaque outside this crate: callers must not assume any
/// ordering or encoding beyond `Display`/`FromStr` round-tripping.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Id(u128);

impl Id {
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u128 {
        self.0
    }

    /// Generates a process-unique id, monotonic within one process.
    ///
    /// Not a UUID: the pipeline only needs stable identity within a single
    /// compilation pass, never persistence across runs.
    pub fn generate() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let low = COUNTER.fetch_add(1, Ordering::Relaxed) as u128;
        Self((std::process::id() as u128) << 64 | low)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let cleaned: String = s.chars().filter(|c| *c != '-').collect();
        match u128::from_str_radix(&cleaned, 16) {
            Ok(raw) => Ok(Self(raw)),
            Err(_) => bail!("invalid object id: {s:?}"),
        }
    }
}
