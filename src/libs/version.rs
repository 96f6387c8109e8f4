//! Version ordering for release strings that are not always well formed.
//!
//! Comparison runs in three tiers and stops at the first one that applies:
//!
//! 1. Both sides parse as strict semantic versions (after dropping one leading
//!    `v`): full semver ordering, so `1.6.0-beta.1 < 1.6.0`.
//! 2. Either side is not strict: both are coerced to the nearest
//!    `major.minor.patch` (pre-release and build qualifiers dropped) and compared.
//! 3. Coercion fails for either side: plain string ordering of the normalized
//!    strings.
//!
//! The tiers never panic and always produce a total, deterministic answer.

use semver::Version;
use std::cmp::Ordering;

/// Sentinel reported by development builds.
pub const DEBUG_VERSION: &str = "DEBUG_VERSION";

/// Drops a single leading `v`/`V` and surrounding whitespace.
pub fn normalize(version: &str) -> &str {
    let trimmed = version.trim();
    trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed)
}

/// Strict semantic version parse.
pub fn parse_strict(version: &str) -> Option<Version> {
    Version::parse(normalize(version)).ok()
}

/// Nearest valid semantic version: the first run of up to three dot-separated
/// numeric components, missing ones filled with zero.
pub fn coerce(version: &str) -> Option<Version> {
    let text = normalize(version);
    let start = text.find(|c: char| c.is_ascii_digit())?;

    let mut parts: Vec<u64> = Vec::with_capacity(3);
    let mut rest = &text[start..];
    while parts.len() < 3 {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            break;
        }
        parts.push(rest[..digits].parse().ok()?);
        rest = &rest[digits..];
        match rest.strip_prefix('.') {
            Some(next) if next.starts_with(|c: char| c.is_ascii_digit()) => rest = next,
            _ => break,
        }
    }

    let major = *parts.first()?;
    let minor = parts.get(1).copied().unwrap_or(0);
    let patch = parts.get(2).copied().unwrap_or(0);
    Some(Version::new(major, minor, patch))
}

/// Orders two release strings. See the module docs for the tiers.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    if let (Some(left), Some(right)) = (parse_strict(a), parse_strict(b)) {
        return left.cmp(&right);
    }
    if let (Some(left), Some(right)) = (coerce(a), coerce(b)) {
        return left.cmp(&right);
    }
    normalize(a).cmp(normalize(b))
}

/// True when `remote` is strictly newer than `current`.
pub fn is_newer(remote: &str, current: &str) -> bool {
    compare_versions(remote, current) == Ordering::Greater
}

/// Development or pre-1.0 builds never take part in updates.
pub fn is_debug_version(version: &str) -> bool {
    version.trim() == DEBUG_VERSION || compare_versions(version, "1.0.0") == Ordering::Less
}
