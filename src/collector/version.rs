//! Version gate for the sysstat iostat utility.
//!
//! The parser's column-name assumptions are sensitive to the installed
//! sysstat release, so the collector refuses to run against anything older
//! than [`MIN_SUPPORTED`].

use std::fmt;

use crate::collector::CollectError;

/// Oldest sysstat release whose report layout the parser understands.
pub const MIN_SUPPORTED: SysstatVersion = SysstatVersion {
    major: 10,
    minor: 2,
    patch: 0,
};

/// Three-component sysstat version, ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SysstatVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SysstatVersion {
    /// Parses the first line of `iostat -V` output, expected as
    /// `sysstat version MAJOR.MINOR.PATCH`.
    pub fn parse(banner: &str) -> Result<Self, CollectError> {
        let first_line = banner.lines().next().unwrap_or("");
        let words: Vec<&str> = first_line.split_whitespace().collect();
        if words.len() < 3 {
            return Err(CollectError::Version(format!(
                "expected \"sysstat version MAJOR.MINOR.PATCH\", got {:?}",
                first_line
            )));
        }

        let parts: Vec<&str> = words[2].split('.').collect();
        if parts.len() < 3 {
            return Err(CollectError::Version(format!(
                "expected MAJOR.MINOR.PATCH, got {:?}",
                words[2]
            )));
        }

        let mut components = [0u32; 3];
        for (slot, part) in components.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| {
                CollectError::Version(format!("non-numeric version component {:?}", part))
            })?;
        }

        Ok(Self {
            major: components[0],
            minor: components[1],
            patch: components[2],
        })
    }

    /// Whether this release is new enough for the report parser.
    pub fn is_supported(&self) -> bool {
        *self >= MIN_SUPPORTED
    }
}

impl fmt::Display for SysstatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
