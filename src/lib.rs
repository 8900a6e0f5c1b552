//! iostatd — collector core for the iostat tabular report.
//!
//! Provides:
//! - `collector::parser` — stateful line parser turning the report stream
//!   into an ordered key list and a key → value map
//! - `collector::version` — sysstat version banner parsing and gating
//! - `collector::namespace` — canonical metric keys and wildcard resolution
//! - `collector::command` — execution shim for the iostat utility
//! - `collector::mock` — canned runner for tests and demos
//! - `collector::IostatCollector` — background collection with a shared
//!   latest-interval store

pub mod collector;
