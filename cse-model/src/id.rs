//! Identifier generation for CSE-assigned resource identifiers (`ri`) and
//! originators.
//!
//! oneM2M caps generated identifiers at [`MAX_ID_LENGTH`] characters
//! (spec §6, "maximum identifier length"). Every helper here respects that
//! cap so a prefix + generated suffix never needs truncation after the fact.

use uuid::Uuid;

/// Maximum length of identifiers generated by the CSE (spec §6).
pub const MAX_ID_LENGTH: usize = 10;

/// Generate a short, URL-safe unique suffix made of alphanumeric characters.
///
/// Draws from a UUID v4's hex digits, which are a subset of
/// `[A-Za-z0-9]` and satisfy patterns like `^C[A-Za-z0-9]+$` (spec §8,
/// scenario 1).
pub fn unique_suffix(len: usize) -> String {
    let raw = Uuid::new_v4().simple().to_string();
    raw.chars().take(len).collect()
}

/// Build a CSE-assigned identifier as `prefix` followed by a unique suffix,
/// truncated to [`MAX_ID_LENGTH`] total characters.
///
/// Used for resource `ri` generation and for AE originator assignment
/// (`unique_ae_id("C")`, `unique_ae_id("S")` — spec §4.2).
pub fn unique_id(prefix: &str) -> String {
    let prefix = if prefix.len() >= MAX_ID_LENGTH {
        return prefix.chars().take(MAX_ID_LENGTH).collect();
    } else {
        prefix
    };
    let suffix_len = MAX_ID_LENGTH - prefix.len();
    format!("{prefix}{}", unique_suffix(suffix_len.max(1)))
}

/// Strip a leading `/` from an originator, the normalization
/// `RegistrationManager.handleAERegistration` applies to explicitly supplied
/// originators (spec §4.2, "otherwise normalize the provided originator").
pub fn normalize_originator(originator: &str) -> String {
    originator.strip_prefix('/').unwrap_or(originator).to_string()
}

/// Derive a resource identifier from an AE originator (`aei`), per
/// TS-0001 10.2.2.2: the `<AE>` resource's `ri` mirrors its `aei` with the
/// leading type marker stripped when one is present.
pub fn id_from_originator(originator: &str) -> String {
    normalize_originator(originator)
}
