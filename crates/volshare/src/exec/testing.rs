//! Scripted command runner for adapter tests.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use volshare_common::{VolshareError, VolshareResult};

use super::CommandRunner;

/// Returns canned output per program and records invocations.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    outputs: HashMap<&'static str, Result<String, Option<i32>>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedRunner {
    /// Answer `program` with `output`, or fail with the given exit code.
    pub(crate) fn with(mut self, program: &'static str, output: Result<&str, Option<i32>>) -> Self {
        self.outputs.insert(program, output.map(str::to_string));
        self
    }

    /// Whether a recorded command line starts with `prefix`.
    pub(crate) fn called(&self, prefix: &str) -> bool {
        self.calls.lock().iter().any(|(c, _)| c.starts_with(prefix))
    }

    /// Standard input fed to the first command line starting with `prefix`.
    pub(crate) fn stdin_of(&self, prefix: &str) -> Option<String> {
        self.calls
            .lock()
            .iter()
            .find(|(c, _)| c.starts_with(prefix))
            .and_then(|(_, stdin)| stdin.clone())
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        stdin: Option<&str>,
        _timeout: Duration,
    ) -> VolshareResult<String> {
        self.calls.lock().push((
            format!("{program} {}", args.join(" ")),
            stdin.map(str::to_string),
        ));
        match self.outputs.get(program) {
            Some(Ok(out)) => Ok(out.clone()),
            Some(Err(exit_code)) => Err(VolshareError::Command {
                command: program.to_string(),
                exit_code: *exit_code,
                stderr: String::new(),
            }),
            None => Ok(String::new()),
        }
    }
}
