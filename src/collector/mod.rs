//! Metrics collection from the iostat utility (sysstat package).
//!
//! iostat prints a periodic tabular report: a one-time banner, then per
//! interval a timestamp line followed by sections. Each section is a
//! `label:` header naming its columns and one or more whitespace-delimited
//! data rows, optionally prefixed with a per-device label. The aggregate row
//! labelled `ALL` closes the interval.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     IostatCollector                      │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────┐   │
//! │  │ ReportParser │  │ VersionGate  │  │ MetricStore   │   │
//! │  │ (line state  │  │ (banner →    │  │ (RwLock, keys │   │
//! │  │  machine)    │  │  gate check) │  │  + values)    │   │
//! │  └──────┬───────┘  └──────┬───────┘  └───────┬───────┘   │
//! │         └─────────────────┼──────────────────┘           │
//! │                    ┌──────▼──────┐                       │
//! │                    │CommandRunner│ (trait)               │
//! │                    └──────┬──────┘                       │
//! └───────────────────────────┼──────────────────────────────┘
//!                             │
//!                 ┌───────────┴───────────┐
//!          ┌──────▼──────┐         ┌──────▼──────┐
//!          │   RealCmd   │         │   MockCmd   │
//!          │ (spawns     │         │ (canned     │
//!          │  iostat)    │         │  output)    │
//!          └─────────────┘         └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use iostatd::collector::{IostatCollector, MockCmd};
//!
//! let collector = IostatCollector::new(MockCmd::typical_report());
//! collector.start().unwrap();
//! assert!(!collector.metric_types().is_empty());
//! ```

use std::fmt;
use std::io;

pub mod command;
pub mod mock;
pub mod namespace;
pub mod parser;
pub mod version;

#[allow(clippy::module_inception)]
mod collector;

pub use collector::{IostatCollector, Metric};
pub use command::{CommandRunner, RealCmd};
pub use mock::MockCmd;
pub use namespace::NamespaceError;
pub use parser::ReportParser;
pub use version::SysstatVersion;

/// Errors surfaced by the collector core.
///
/// Tolerable anomalies in the report (blank padding, misaligned device rows,
/// non-numeric values) are absorbed by the parser and never show up here.
#[derive(Debug)]
pub enum CollectError {
    /// The report's shape violates the grammar in a way that makes further
    /// parsing meaningless (data row before any header, interval value count
    /// disagreeing with the frozen key set).
    Format(String),
    /// The version banner does not look like `name version MAJOR.MINOR.PATCH`.
    Version(String),
    /// The installed utility is older than [`version::MIN_SUPPORTED`].
    Unsupported(SysstatVersion),
    /// No complete interval observed within the allotted wait.
    Timeout(String),
    /// Locating, spawning or reading the utility failed.
    Io(io::Error),
}

impl fmt::Display for CollectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectError::Format(msg) => write!(f, "invalid iostat report: {}", msg),
            CollectError::Version(msg) => write!(f, "invalid version banner: {}", msg),
            CollectError::Unsupported(v) => write!(
                f,
                "unsupported sysstat version {} (minimum {})",
                v,
                version::MIN_SUPPORTED
            ),
            CollectError::Timeout(msg) => write!(f, "timed out: {}", msg),
            CollectError::Io(e) => write!(f, "iostat execution failed: {}", e),
        }
    }
}

impl std::error::Error for CollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollectError::Io(e) => Some(e),
            _ => None,
        }
    }
}
