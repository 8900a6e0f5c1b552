//! Canonical metric namespace construction and wildcard resolution.
//!
//! Every metric lives under the fixed `/intel/linux/iostat` prefix, followed
//! by the section's stat type, an optional sub-entity (device name) and the
//! stat name:
//!
//! ```text
//! /intel/linux/iostat/avg-cpu/%idle
//! /intel/linux/iostat/device/sda/rrqm_per_sec
//! ```
//!
//! Consumers may address a dynamic set of devices with a single `*` segment
//! in the sub-entity position, e.g. `/intel/linux/iostat/device/*/await`.

use std::fmt;

pub const NS_VENDOR: &str = "intel";
pub const NS_CLASS: &str = "linux";
pub const NS_TYPE: &str = "iostat";

/// Wildcard segment standing in for a sub-entity in a metric request.
pub const WILDCARD: &str = "*";

/// Builds the relative stat path: `stat_type[/sub_entity]/stat_name`.
pub(crate) fn build_stat(stat_type: &str, sub_entity: Option<&str>, stat_name: &str) -> String {
    match sub_entity {
        Some(sub) => format!("{stat_type}/{sub}/{stat_name}"),
        None => format!("{stat_type}/{stat_name}"),
    }
}

/// Prefixes a relative stat path with the fixed vendor/class/type segments.
pub(crate) fn canonical(stat: &str) -> String {
    format!("/{NS_VENDOR}/{NS_CLASS}/{NS_TYPE}/{stat}")
}

/// Builds the canonical `/`-joined key for one statistic.
pub fn build_key(stat_type: &str, sub_entity: Option<&str>, stat_name: &str) -> String {
    canonical(&build_stat(stat_type, sub_entity, stat_name))
}

/// One concrete key produced by wildcard expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardMatch {
    /// Full canonical key the pattern expanded to.
    pub key: String,
    /// Concrete value of the wildcarded sub-entity segment.
    pub sub_entity: String,
}

/// Errors from resolving a metric request pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceError {
    /// The pattern contains no `*` segment.
    NoWildcard(String),
    /// The pattern contains more than one `*` segment.
    MultipleWildcards(String),
    /// The wildcard does not stand in for a sub-entity, or the addressed
    /// metric class has no sub-entity concept.
    DynamicNotSupported(String),
}

impl fmt::Display for NamespaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamespaceError::NoWildcard(p) => {
                write!(f, "pattern {} contains no wildcard segment", p)
            }
            NamespaceError::MultipleWildcards(p) => {
                write!(f, "pattern {} contains more than one wildcard segment", p)
            }
            NamespaceError::DynamicNotSupported(p) => {
                write!(f, "dynamic metrics not supported for {}", p)
            }
        }
    }
}

impl std::error::Error for NamespaceError {}

/// Expands a pattern with exactly one wildcard segment against the key space.
///
/// Only the sub-entity position (just before the stat name) may be
/// wildcarded. Every concrete key whose non-wildcard segments match the
/// pattern exactly yields one [`WildcardMatch`]. A wildcard addressed at a
/// metric class that exists without sub-entities is an error rather than an
/// empty result.
pub fn resolve_wildcard(
    pattern: &str,
    keys: &[String],
) -> Result<Vec<WildcardMatch>, NamespaceError> {
    let segments = split_key(pattern);

    let Some(pos) = segments.iter().position(|s| *s == WILDCARD) else {
        return Err(NamespaceError::NoWildcard(pattern.to_string()));
    };
    if segments[pos + 1..].contains(&WILDCARD) {
        return Err(NamespaceError::MultipleWildcards(pattern.to_string()));
    }
    if pos + 2 != segments.len() {
        return Err(NamespaceError::DynamicNotSupported(pattern.to_string()));
    }

    let mut matches = Vec::new();
    for key in keys {
        let key_segments = split_key(key);
        if key_segments.len() != segments.len() {
            continue;
        }
        let aligned = segments
            .iter()
            .zip(&key_segments)
            .enumerate()
            .all(|(i, (p, k))| i == pos || p == k);
        if aligned {
            matches.push(WildcardMatch {
                key: key.clone(),
                sub_entity: key_segments[pos].to_string(),
            });
        }
    }

    if matches.is_empty() {
        // "avg-cpu/*/%idle" addresses a class that only exists without a
        // sub-entity; report that instead of silently matching nothing.
        let fixed: Vec<&str> = segments[..pos]
            .iter()
            .chain(&segments[pos + 1..])
            .copied()
            .collect();
        if keys.iter().any(|k| split_key(k) == fixed) {
            return Err(NamespaceError::DynamicNotSupported(pattern.to_string()));
        }
    }

    Ok(matches)
}

fn split_key(key: &str) -> Vec<&str> {
    key.trim_start_matches('/').split('/').collect()
}
