//! Execution shim for the iostat utility.
//!
//! The collector only ever sees a [`CommandRunner`], so tests drive it with
//! canned output (see [`crate::collector::mock`]) the same way the real
//! implementation drives a spawned process.

use std::env;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::collector::CollectError;

/// Environment variable overriding the directory the binary is looked up in.
pub const PATH_OVERRIDE_ENV: &str = "IOSTAT_PATH";

/// How long a one-shot capture may run before it is abandoned.
pub(crate) const CAPTURE_TIMEOUT: Duration = Duration::from_secs(2);

/// Abstraction over running the iostat utility.
pub trait CommandRunner: Send + Sync {
    /// Locates the utility binary: [`PATH_OVERRIDE_ENV`] first, then `$PATH`.
    fn locate(&self) -> Result<PathBuf, CollectError>;

    /// Spawns the program and hands back its stdout as a buffered line
    /// stream. The program keeps producing until the stream is dropped.
    fn stream(
        &self,
        program: &Path,
        args: &[&str],
    ) -> Result<Box<dyn BufRead + Send>, CollectError>;

    /// Runs the program to completion and captures stdout + stderr, bounded
    /// by [`CAPTURE_TIMEOUT`].
    fn capture(&self, program: &Path, args: &[&str]) -> Result<String, CollectError>;
}

/// Runner backed by real process execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealCmd;

impl RealCmd {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for RealCmd {
    fn locate(&self) -> Result<PathBuf, CollectError> {
        if let Ok(dir) = env::var(PATH_OVERRIDE_ENV)
            && !dir.is_empty()
        {
            let binary = Path::new(&dir).join("iostat");
            debug!(path = %binary.display(), "using {} override", PATH_OVERRIDE_ENV);
            return Ok(binary);
        }

        search_path("iostat").ok_or_else(|| {
            CollectError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!(
                    "iostat not found in $PATH; install the sysstat package or set {}",
                    PATH_OVERRIDE_ENV
                ),
            ))
        })
    }

    fn stream(
        &self,
        program: &Path,
        args: &[&str],
    ) -> Result<Box<dyn BufRead + Send>, CollectError> {
        let mut child = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(CollectError::Io)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CollectError::Io(io::Error::other("child stdout unavailable")))?;

        // The child is not waited on; it runs until the consumer drops the
        // pipe and the next write fails.
        debug!(program = %program.display(), ?args, "iostat spawned");
        Ok(Box::new(BufReader::new(stdout)))
    }

    fn capture(&self, program: &Path, args: &[&str]) -> Result<String, CollectError> {
        let program = program.to_path_buf();
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(Command::new(&program).args(&args).output());
        });

        match rx.recv_timeout(CAPTURE_TIMEOUT) {
            Ok(Ok(output)) => {
                // iostat writes its version banner to stderr on some
                // releases; combine both streams.
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                Ok(text)
            }
            Ok(Err(e)) => Err(CollectError::Io(e)),
            Err(_) => Err(CollectError::Timeout(format!(
                "command did not finish within {:?}",
                CAPTURE_TIMEOUT
            ))),
        }
    }
}

/// Searches `$PATH` for an executable file with the given name.
fn search_path(binary: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_times_out_on_long_running_command() {
        let runner = RealCmd::new();
        let err = runner
            .capture(Path::new("sleep"), &["10"])
            .map(|_| ())
            .unwrap_err();
        // "sleep" may be missing from a minimal environment; both outcomes
        // are acceptable, a hang is not.
        assert!(
            matches!(err, CollectError::Timeout(_) | CollectError::Io(_)),
            "{err}"
        );
    }

    #[test]
    fn capture_returns_combined_output() {
        let runner = RealCmd::new();
        if let Ok(out) = runner.capture(Path::new("echo"), &["hello"]) {
            assert!(out.contains("hello"));
        }
    }
}
