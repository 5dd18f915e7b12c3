//! Bounded-timeout command runner.

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use volshare_common::{VolshareError, VolshareResult};

/// How often a running child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs host binaries such as `fstrim`, `blkid` and `cryptsetup`.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, feeding `stdin` if given.
    ///
    /// Returns captured standard output on a zero exit status. The child is
    /// killed once `timeout` has elapsed.
    fn run(
        &self,
        program: &str,
        args: &[&str],
        stdin: Option<&str>,
        timeout: Duration,
    ) -> VolshareResult<String>;

    /// Run a command without standard input.
    fn execute(&self, program: &str, args: &[&str], timeout: Duration) -> VolshareResult<String> {
        self.run(program, args, None, timeout)
    }
}

/// [`CommandRunner`] backed by [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        stdin: Option<&str>,
        timeout: Duration,
    ) -> VolshareResult<String> {
        let command_line = render(program, args);
        tracing::debug!(command = %command_line, ?timeout, "Executing command");

        let mut child = Command::new(program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| VolshareError::Internal {
                message: format!("Failed to execute {command_line}: {e}"),
            })?;

        // Readers run before stdin is written so a chatty child never blocks on a full pipe.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            if let Err(e) = pipe.write_all(input.as_bytes()) {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(command = %command_line, error = %e, "Failed to feed command input");
                return Err(e.into());
            }
        }

        let deadline = Instant::now() + timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(command = %command_line, ?timeout, "Command timed out");
                return Err(VolshareError::CommandTimeout {
                    command: command_line,
                    timeout,
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if !status.success() {
            return Err(VolshareError::Command {
                command: command_line,
                exit_code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(stdout)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    })
}

fn render(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
