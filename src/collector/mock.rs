//! Canned command runner for tests, demos and non-Linux development.

use std::io::{BufRead, Cursor};
use std::path::{Path, PathBuf};

use crate::collector::CollectError;
use crate::collector::command::CommandRunner;

/// Version banner of a sysstat release the collector supports.
pub const TYPICAL_VERSION: &str = "sysstat version 11.5.7\n(C) Sebastien Godard (sysstat <at> orange.fr)\n";

/// One complete report interval captured from a real host, including the
/// indentation noise the utility is allowed to produce.
pub const TYPICAL_REPORT: &str = "\
Linux 3.10.0-229.11.1.el7.x86_64 (gklab-108-166) \t10/26/2015 \t_x86_64_\t(8 CPU)

10/26/2015 06:36:57 AM
avg-cpu:  %user   %nice %system %iowait  %steal   %idle
           0.50    0.00    0.13    0.00    0.00   99.37

Device:         rrqm/s   wrqm/s     r/s     w/s    rkB/s    wkB/s avgrq-sz avgqu-sz   await r_await w_await  svctm  %util
sda               0.00     0.00    0.00    0.00     0.01     0.00     8.06     0.00    0.10    0.10    0.00   0.04   0.00
sda1              0.00     0.00    0.00    0.00     0.00     0.00     8.19     0.00    0.12    0.12    0.00   0.12   0.00
sda2              0.00     0.00    0.00    0.00     0.00     0.00     7.80     0.00    0.08    0.08    0.00   0.08   0.00
sdb               0.02     0.33    0.13    0.64     2.08    15.34    45.70     0.00    1.83    0.94    2.00   0.06   0.00
sdb1              0.00     0.07    0.04    0.08     0.26    10.79   185.22     0.00    9.81    0.23   14.21   0.25   0.00
 ALL              0.05     0.66    0.26    1.27     4.17    30.68    45.65     0.00    1.82    0.92    2.00   0.06   0.00

";

/// Runner that replays canned version and report text.
#[derive(Debug, Clone)]
pub struct MockCmd {
    version_output: String,
    report_output: String,
}

impl MockCmd {
    pub fn new(version_output: impl Into<String>, report_output: impl Into<String>) -> Self {
        Self {
            version_output: version_output.into(),
            report_output: report_output.into(),
        }
    }

    /// A supported version and one complete interval.
    pub fn typical_report() -> Self {
        Self::new(TYPICAL_VERSION, TYPICAL_REPORT)
    }

    /// A supported version but an empty report stream.
    pub fn empty_report() -> Self {
        Self::new(TYPICAL_VERSION, "")
    }

    /// Replaces the canned report, keeping the version banner.
    pub fn with_report(mut self, report: impl Into<String>) -> Self {
        self.report_output = report.into();
        self
    }

    /// Replaces the canned version banner, keeping the report.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version_output = version.into();
        self
    }
}

impl CommandRunner for MockCmd {
    fn locate(&self) -> Result<PathBuf, CollectError> {
        Ok(PathBuf::from("/usr/bin/iostat"))
    }

    fn stream(
        &self,
        _program: &Path,
        _args: &[&str],
    ) -> Result<Box<dyn BufRead + Send>, CollectError> {
        Ok(Box::new(Cursor::new(
            self.report_output.clone().into_bytes(),
        )))
    }

    fn capture(&self, _program: &Path, _args: &[&str]) -> Result<String, CollectError> {
        Ok(self.version_output.clone())
    }
}
