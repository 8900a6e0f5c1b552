//! Collector host: runs the utility, feeds the parser from a background
//! thread and serves metric queries from the latest complete interval.

use std::collections::HashMap;
use std::io::BufRead;
use std::sync::{Arc, RwLock, mpsc};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::collector::CollectError;
use crate::collector::command::CommandRunner;
use crate::collector::namespace::{self, NamespaceError, WILDCARD};
use crate::collector::parser::{ReportParser, Step};
use crate::collector::version::SysstatVersion;

/// iostat invocation: CPU + device reports, partitions, the ALL device
/// group, extended statistics, kilobytes, report timestamps. The report
/// interval in seconds is appended at spawn time.
const IOSTAT_ARGS: &[&str] = &["-c", "-d", "-p", "-g", "ALL", "-x", "-k", "-t"];

/// Ceiling for waiting on the first complete interval.
pub const FIRST_INTERVAL_TIMEOUT: Duration = Duration::from_secs(2);

/// One resolved metric reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    /// Canonical `/`-joined metric key.
    pub namespace: String,
    /// Latest reading; `None` when the report carried a non-numeric value.
    pub value: Option<f64>,
    /// Unix timestamp of the interval the reading belongs to.
    pub timestamp: i64,
}

/// Latest complete interval, shared between the reader thread (single
/// writer, one write per interval boundary) and query callers (readers).
#[derive(Debug, Default)]
struct MetricStore {
    keys: Vec<String>,
    data: HashMap<String, Option<f64>>,
    timestamp: i64,
}

/// Runs iostat in the background and answers metric queries.
///
/// One collector owns one utility invocation; construct a separate instance
/// per concurrent collection.
pub struct IostatCollector<C: CommandRunner> {
    runner: C,
    interval_secs: u64,
    store: Arc<RwLock<MetricStore>>,
}

impl<C: CommandRunner + 'static> IostatCollector<C> {
    pub fn new(runner: C) -> Self {
        Self {
            runner,
            interval_secs: 1,
            store: Arc::new(RwLock::new(MetricStore::default())),
        }
    }

    /// Sets the report interval in seconds passed to iostat (default 1).
    pub fn with_interval(mut self, secs: u64) -> Self {
        self.interval_secs = secs.max(1);
        self
    }

    /// Checks the utility version, spawns it and waits for the first
    /// complete interval.
    ///
    /// Returns the gated version on success. A stream that never produces a
    /// complete interval yields [`CollectError::Timeout`], distinct from the
    /// format errors a garbage stream produces.
    pub fn start(&self) -> Result<SysstatVersion, CollectError> {
        let binary = self.runner.locate()?;

        let banner = self.runner.capture(&binary, &["-V"])?;
        let version = SysstatVersion::parse(&banner)?;
        if !version.is_supported() {
            return Err(CollectError::Unsupported(version));
        }

        let interval = self.interval_secs.to_string();
        let mut args: Vec<&str> = IOSTAT_ARGS.to_vec();
        args.push(interval.as_str());
        let reader = self.runner.stream(&binary, &args)?;

        let store = Arc::clone(&self.store);
        let (first_tx, first_rx) = mpsc::channel();
        thread::spawn(move || run_reader(reader, store, first_tx));

        match first_rx.recv_timeout(FIRST_INTERVAL_TIMEOUT) {
            Ok(Ok(())) => Ok(version),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CollectError::Timeout(format!(
                "no complete interval within {:?}",
                FIRST_INTERVAL_TIMEOUT
            ))),
        }
    }

    /// Ordered canonical keys discovered in the first interval.
    pub fn metric_types(&self) -> Vec<String> {
        self.read_store().keys.clone()
    }

    /// Resolves requests — exact keys or single-wildcard patterns — against
    /// the latest interval. Unknown exact keys are skipped.
    pub fn collect(&self, requests: &[String]) -> Result<Vec<Metric>, NamespaceError> {
        let store = self.read_store();
        let mut metrics = Vec::new();

        for request in requests {
            if request.contains(WILDCARD) {
                for m in namespace::resolve_wildcard(request, &store.keys)? {
                    if let Some(value) = store.data.get(&m.key) {
                        metrics.push(Metric {
                            namespace: m.key,
                            value: *value,
                            timestamp: store.timestamp,
                        });
                    }
                }
            } else if let Some(value) = store.data.get(request.as_str()) {
                metrics.push(Metric {
                    namespace: request.clone(),
                    value: *value,
                    timestamp: store.timestamp,
                });
            } else {
                debug!(namespace = %request, "requested metric not present");
            }
        }

        Ok(metrics)
    }

    fn read_store(&self) -> std::sync::RwLockReadGuard<'_, MetricStore> {
        // A poisoned lock still holds the last published interval.
        match self.store.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Consumes the report stream, publishing every completed interval into the
/// shared store. The first completion (or the error preventing it) is
/// signalled through `first_tx` so `start` can stop waiting.
fn run_reader(
    mut reader: Box<dyn BufRead + Send>,
    store: Arc<RwLock<MetricStore>>,
    first_tx: mpsc::Sender<Result<(), CollectError>>,
) {
    let mut parser = ReportParser::new();
    let mut signalled = false;
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "report stream read failed");
                break;
            }
        }

        match parser.step(line.trim_end_matches(['\r', '\n'])) {
            Ok(Step::Continue) => {}
            Ok(Step::IntervalComplete) => {
                publish(&parser, &store);
                if !signalled {
                    let _ = first_tx.send(Ok(()));
                    signalled = true;
                }
            }
            Ok(Step::EndOfReport) => break,
            Err(e) => {
                warn!(error = %e, "report parse aborted");
                if !signalled {
                    let _ = first_tx.send(Err(e));
                }
                return;
            }
        }
    }

    if !signalled {
        let _ = first_tx.send(Err(CollectError::Timeout(
            "report stream ended before the first complete interval".to_string(),
        )));
    }
}

fn publish(parser: &ReportParser, store: &Arc<RwLock<MetricStore>>) {
    let mut store = match store.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if store.keys.is_empty() {
        store.keys = parser.keys().to_vec();
    }
    store.data = parser.data().clone();
    store.timestamp = parser.timestamp();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{MockCmd, TYPICAL_REPORT};

    #[test]
    fn start_discovers_keys_and_values() {
        let collector = IostatCollector::new(MockCmd::typical_report());
        let version = collector.start().unwrap();
        assert_eq!(version.to_string(), "11.5.7");

        let keys = collector.metric_types();
        // 6 avg-cpu columns + 6 device rows * 13 columns
        assert_eq!(keys.len(), 6 + 6 * 13);
        assert!(keys.contains(&"/intel/linux/iostat/avg-cpu/%idle".to_string()));
        assert!(keys.contains(&"/intel/linux/iostat/device/ALL/wkB_per_sec".to_string()));

        let metrics = collector.collect(&keys).unwrap();
        assert_eq!(metrics.len(), keys.len());

        let all_wkb = metrics
            .iter()
            .find(|m| m.namespace == "/intel/linux/iostat/device/ALL/wkB_per_sec")
            .unwrap();
        assert_eq!(all_wkb.value, Some(30.68));
        assert!(all_wkb.timestamp > 0);
    }

    #[test]
    fn collect_expands_wildcards() {
        let collector = IostatCollector::new(MockCmd::typical_report());
        collector.start().unwrap();

        let metrics = collector
            .collect(&["/intel/linux/iostat/device/*/await".to_string()])
            .unwrap();
        // sda, sda1, sda2, sdb, sdb1 and the ALL group row
        assert_eq!(metrics.len(), 6);
        assert!(
            metrics
                .iter()
                .any(|m| m.namespace == "/intel/linux/iostat/device/sdb/await"
                    && m.value == Some(1.83))
        );
    }

    #[test]
    fn collect_skips_unknown_exact_keys() {
        let collector = IostatCollector::new(MockCmd::typical_report());
        collector.start().unwrap();

        let metrics = collector
            .collect(&[
                "/intel/linux/iostat/device/sda/%util".to_string(),
                "/intel/linux/iostat/device/sdz/%util".to_string(),
            ])
            .unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].namespace, "/intel/linux/iostat/device/sda/%util");
    }

    #[test]
    fn empty_stream_reports_timeout() {
        let collector = IostatCollector::new(MockCmd::empty_report());
        let err = collector.start().unwrap_err();
        assert!(matches!(err, CollectError::Timeout(_)), "{err}");
        assert!(collector.metric_types().is_empty());
    }

    #[test]
    fn blank_noise_reports_timeout_not_crash() {
        let collector =
            IostatCollector::new(MockCmd::empty_report().with_report("\n\n\n\n\n\n\n\n"));
        let err = collector.start().unwrap_err();
        assert!(matches!(err, CollectError::Timeout(_)), "{err}");
        assert!(collector.metric_types().is_empty());
    }

    #[test]
    fn missing_aggregate_row_reports_timeout() {
        let report = TYPICAL_REPORT.replacen(" ALL ", " ", 1);
        let collector = IostatCollector::new(MockCmd::empty_report().with_report(report));
        let err = collector.start().unwrap_err();
        assert!(matches!(err, CollectError::Timeout(_)), "{err}");
    }

    #[test]
    fn header_without_colon_is_a_format_error() {
        let report = TYPICAL_REPORT.replacen("avg-cpu:", "avg-cpu", 1);
        let collector = IostatCollector::new(MockCmd::empty_report().with_report(report));
        let err = collector.start().unwrap_err();
        assert!(matches!(err, CollectError::Format(_)), "{err}");
    }

    #[test]
    fn old_sysstat_is_refused() {
        let collector = IostatCollector::new(
            MockCmd::typical_report().with_version("sysstat version 10.1.5\n"),
        );
        let err = collector.start().unwrap_err();
        assert!(matches!(err, CollectError::Unsupported(_)), "{err}");
    }

    #[test]
    fn garbage_version_banner_is_refused() {
        let collector = IostatCollector::new(MockCmd::typical_report().with_version("iostat\n"));
        let err = collector.start().unwrap_err();
        assert!(matches!(err, CollectError::Version(_)), "{err}");
    }

    #[test]
    fn wildcard_on_cpu_section_is_rejected() {
        let collector = IostatCollector::new(MockCmd::typical_report());
        collector.start().unwrap();

        let err = collector
            .collect(&["/intel/linux/iostat/avg-cpu/*/%idle".to_string()])
            .unwrap_err();
        assert!(matches!(err, NamespaceError::DynamicNotSupported(_)), "{err}");
    }
}
