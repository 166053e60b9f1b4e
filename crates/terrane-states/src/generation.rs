use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque token naming one deposed object of a resource instance.
///
/// The empty key is the [`NOT_DEPOSED`] sentinel; it never names a real slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeposedKey(String);

/// Sentinel meaning "no deposed object".
pub const NOT_DEPOSED: DeposedKey = DeposedKey(String::new());

impl DeposedKey {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Generate a fresh random key: eight lowercase hex digits.
    pub fn generate() -> Self {
        let n: u32 = rand::thread_rng().gen();
        Self(format!("{n:08x}"))
    }

    pub fn is_not_deposed(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The generation this key addresses: `Current` for the sentinel.
    pub fn generation(&self) -> Generation {
        if self.is_not_deposed() {
            Generation::Current
        } else {
            Generation::Deposed(self.clone())
        }
    }
}

impl fmt::Display for DeposedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_not_deposed() {
            f.write_str("(not deposed)")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// Which object slot of a resource instance is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Generation {
    Current,
    Deposed(DeposedKey),
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generation::Current => f.write_str("current"),
            Generation::Deposed(key) => write!(f, "deposed object {key}"),
        }
    }
}
