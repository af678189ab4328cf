//! Fingerprinting for signal/extraction dedup and statement clustering.
//!
//! A fingerprint is the lowercased, whitespace-collapsed decision statement
//! plus the module tag, hashed to a fixed-width hex string. Used by the
//! Batch Extractor's extraction cache (§4.3) and the Skill Generator's
//! statement-fingerprint grouping (§4.9).

use crate::models::decision::Module;
use sha2::{Digest, Sha256};

/// Collapses runs of whitespace to single spaces and trims the ends.
fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for ch in s.trim().chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out
}

/// Returns the normalized key used *before* hashing: lowercased,
/// whitespace-collapsed statement followed by the module tag.
///
/// Exposed separately from [`normalize`] because the Skill Generator groups
/// by this readable key directly (it wants the text back), while the
/// extraction cache only needs the hashed form.
#[must_use]
pub fn normalized_key(statement: &str, module: Module) -> String {
    format!("{}|{}", collapse_whitespace(statement).to_lowercase(), module.as_str())
}

/// Returns the hex-encoded SHA-256 fingerprint of a statement+module pair.
#[must_use]
pub fn normalize(statement: &str, module: Module) -> String {
    let key = normalized_key(statement, module);
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_and_case_are_normalized() {
        let a = normalize("Use   Postgres\nfor storage", Module::Database);
        let b = normalize("use postgres for storage", Module::Database);
        assert_eq!(a, b);
    }

    #[test]
    fn different_modules_produce_different_fingerprints() {
        let a = normalize("use auth0", Module::Auth);
        let b = normalize("use auth0", Module::Backend);
        assert_ne!(a, b);
    }
}
