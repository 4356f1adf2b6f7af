//! Thin helpers over `std::process` for the external tools we drive.

use std::ffi::OsStr;
use std::io;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Error, Result};

const POLL_STEP: Duration = Duration::from_millis(20);

/// Run a command to completion and return its stdout as text.
pub fn output<I, S>(program: impl AsRef<OsStr>, args: I) -> io::Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let program = program.as_ref();
    let output = Command::new(program).args(args).output()?;
    debug!(program = ?program, status = %output.status, "command finished");
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Start `argv[0]` with the remaining arguments and forget about it.
pub fn spawn_detached(argv: &[String]) -> Result<()> {
    let (program, args) = argv.split_first().ok_or_else(|| Error::InvalidConfig {
        field: "command",
        value: String::new(),
    })?;
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| Error::io(err, format!("failed to start {program}")))?;
    debug!(pid = child.id(), %program, "spawned detached");
    Ok(())
}

/// Wait for `child` up to `deadline`. Kills it and returns `None` on overrun.
pub fn wait_with_deadline(child: &mut Child, deadline: Duration) -> io::Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= deadline {
            child.kill()?;
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_STEP);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn output_captures_stdout() {
        let text = output("echo", ["hello"]).unwrap();
        assert_eq!(text.trim(), "hello");
    }

    #[test]
    fn deadline_kills_slow_child() {
        let mut child = Command::new("sleep").arg("5").spawn().unwrap();
        let status = wait_with_deadline(&mut child, Duration::from_millis(100)).unwrap();
        assert!(status.is_none());
    }

    #[test]
    fn deadline_returns_status_of_fast_child() {
        let mut child = Command::new("true").spawn().unwrap();
        let status = wait_with_deadline(&mut child, Duration::from_secs(5)).unwrap();
        assert!(status.is_some_and(|s| s.success()));
    }

    #[test]
    fn spawn_detached_rejects_empty_command() {
        assert!(spawn_detached(&[]).is_err());
    }
}
