//! Crash-restart supervisor for the bot process.
//!
//! Launches the bot as a child process, blocks until it exits, records the
//! exit in an append-only log and relaunches after a fixed delay. Every
//! exit code, including 0, is treated the same: the child is always
//! restarted, with no retry cap and no backoff growth. The loop has no
//! termination condition of its own and must be stopped externally.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::Duration;
use tracing::info;

/// Pause between a child exit and the next launch.
pub const RESTART_DELAY: Duration = Duration::from_secs(5);

pub struct Supervisor {
    program: PathBuf,
    args: Vec<String>,
    log: File,
    delay: Duration,
}

impl Supervisor {
    /// Open the supervisor with the default 5 second restart delay.
    ///
    /// The log file is opened in append mode once and held for the
    /// lifetime of the supervisor; it is never truncated or rotated.
    pub fn new(
        program: impl Into<PathBuf>,
        args: Vec<String>,
        log_path: impl AsRef<Path>,
    ) -> Result<Self> {
        Self::with_delay(program, args, log_path, RESTART_DELAY)
    }

    /// Same as [`Supervisor::new`] with an explicit delay. Used by tests;
    /// the delay is deliberately not exposed on the command line.
    pub fn with_delay(
        program: impl Into<PathBuf>,
        args: Vec<String>,
        log_path: impl AsRef<Path>,
        delay: Duration,
    ) -> Result<Self> {
        let log_path = log_path.as_ref();
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .with_context(|| format!("cannot open restart log {}", log_path.display()))?;

        Ok(Self {
            program: program.into(),
            args,
            log,
            delay,
        })
    }

    /// Append one `[<date> <time>] <message>` line to the restart log.
    fn log_event(&mut self, message: &str) -> Result<()> {
        let line = format!("[{}] {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"), message);
        self.log
            .write_all(line.as_bytes())
            .context("restart log write failed")?;
        self.log.flush().context("restart log flush failed")?;
        Ok(())
    }

    fn exit_label(status: ExitStatus) -> String {
        status
            .code()
            .map_or_else(|| "signal".to_string(), |c| c.to_string())
    }

    /// One launch-wait-log-sleep cycle. Produces exactly two log lines:
    /// a "starting" line and an "exited with code X" line.
    pub fn run_cycle(&mut self) -> Result<()> {
        self.log_event(&format!("starting {}", self.program.display()))?;
        info!("supervisor: starting {}", self.program.display());

        let outcome = Command::new(&self.program).args(&self.args).status();
        let delay_secs = self.delay.as_secs_f64();

        match outcome {
            Ok(status) => {
                let code = Self::exit_label(status);
                self.log_event(&format!(
                    "exited with code {code}, restarting in {delay_secs} seconds"
                ))?;
                info!("supervisor: child exited with code {code}");
            }
            Err(e) => {
                // A spawn failure is handled like a crash: log and retry.
                self.log_event(&format!(
                    "failed to start ({e}), restarting in {delay_secs} seconds"
                ))?;
                info!("supervisor: spawn failed: {e}");
            }
        }

        std::thread::sleep(self.delay);
        Ok(())
    }

    /// Run a bounded number of cycles. Test hook for the unbounded loop.
    pub fn run_cycles(&mut self, cycles: usize) -> Result<()> {
        for _ in 0..cycles {
            self.run_cycle()?;
        }
        Ok(())
    }

    /// Restart the child forever. Only returns on a log I/O error.
    pub fn run(&mut self) -> Result<()> {
        loop {
            self.run_cycle()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn log_lines_are_timestamped_and_appended() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let log_path = dir.path().join("restart.log");

        let mut sup = Supervisor::with_delay(
            "/bin/true",
            vec![],
            &log_path,
            Duration::from_millis(0),
        )?;
        sup.log_event("starting /bin/true")?;
        sup.log_event("exited with code 0, restarting in 5 seconds")?;

        let content = std::fs::read_to_string(&log_path)?;
        let re = Regex::new(r"^\[\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\] ")?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            assert!(re.is_match(line), "bad log line: {line}");
        }
        assert!(lines[0].ends_with("starting /bin/true"));
        Ok(())
    }

    #[test]
    fn reopening_appends_instead_of_truncating() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let log_path = dir.path().join("restart.log");

        for _ in 0..2 {
            let mut sup = Supervisor::with_delay(
                "/bin/true",
                vec![],
                &log_path,
                Duration::from_millis(0),
            )?;
            sup.log_event("starting /bin/true")?;
        }

        let content = std::fs::read_to_string(&log_path)?;
        assert_eq!(content.lines().count(), 2);
        Ok(())
    }

    #[test]
    fn signal_exits_get_a_label() {
        use std::os::unix::process::ExitStatusExt;
        // Raw wait status 9 = killed by SIGKILL, so there is no exit code.
        let status = ExitStatus::from_raw(9);
        assert_eq!(Supervisor::exit_label(status), "signal");
    }
}
