//! Domain-prefixed identifiers for graph nodes.
//!
//! Every node kind in the reasoning graph gets a distinct newtype wrapping a
//! `<prefix><16 lowercase hex chars>` string, e.g. `dec_4f2a9c1b7e3d0f5a`.
//! The `define_id!` macro keeps the eight node-id types (one per
//! [`crate::models`] entity) textually identical in shape while still being
//! distinct types the compiler won't let us mix up.

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Generates 32 bits of pseudo-randomness for ID suffixes.
///
/// Not cryptographic: IDs only need to avoid collisions within one process,
/// not resist prediction. Seeded from system time, advanced with xorshift64.
fn rand_u32() -> u32 {
    thread_local! {
        static STATE: Cell<u64> = Cell::new(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0x9E3779B97F4A7C15)
                | 1
        );
    }

    STATE.with(|state| {
        let mut s = state.get();
        s ^= s << 13;
        s ^= s >> 7;
        s ^= s << 17;
        state.set(s);
        s as u32
    })
}

/// Returns a fresh 16-hex-character suffix built from two rounds of
/// [`rand_u32`], matching the `dec_<16hex>` shape named in the decision
/// capture scenario.
fn hex16() -> String {
    format!("{:08x}{:08x}", rand_u32(), rand_u32())
}

macro_rules! define_id {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Generates a new random identifier of this kind.
            #[must_use]
            pub fn generate() -> Self {
                Self(format!("{}{}", $prefix, hex16()))
            }

            /// Wraps an existing string as an identifier of this kind without
            /// validating its shape. Used when round-tripping IDs already
            /// persisted in storage.
            #[must_use]
            pub fn from_raw(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns the fixed prefix for this identifier kind.
            #[must_use]
            pub const fn prefix() -> &'static str {
                $prefix
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(DecisionId, "dec_", "Unique identifier for a Decision node.");
define_id!(EngramId, "eng_", "Unique identifier for an Engram node.");
define_id!(CodeChangeId, "cc_", "Unique identifier for a CodeChange node.");
define_id!(OutcomeId, "out_", "Unique identifier for an Outcome node.");
define_id!(
    NegativeKnowledgeId,
    "nk_",
    "Unique identifier for a NegativeKnowledge node."
);
define_id!(AntiPatternId, "ap_", "Unique identifier for an AntiPattern node.");
define_id!(SkillId, "skl_", "Unique identifier for a Skill node.");
define_id!(SignalId, "sig_", "Unique identifier for a pending L2 signal.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_have_expected_shape() {
        let id = DecisionId::generate();
        assert!(id.as_str().starts_with("dec_"));
        assert_eq!(id.as_str().len(), 4 + 16);
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = DecisionId::generate();
        let b = DecisionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn display_matches_as_str() {
        let id = EngramId::generate();
        assert_eq!(id.to_string(), id.as_str());
    }
}
