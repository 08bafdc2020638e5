//! Shell-script stand-ins for external tools.
//!
//! Each stub records its arguments, one invocation per line with arguments
//! separated by `|`, and keeps an invocation counter so it can fail a fixed
//! number of times before succeeding. Stubs are run through `sh <script>`
//! so they never need the executable bit.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A scripted external tool
#[derive(Debug)]
pub struct ToolStub {
    _dir: TempDir,
    script: PathBuf,
    log: PathBuf,
}

impl ToolStub {
    /// Exit with `code` on the first `failures` invocations, then exit 0
    pub fn fail_then_succeed(failures: u32, code: i32) -> io::Result<Self> {
        Self::write(failures, code, 0)
    }

    /// Exit with `code` on every invocation
    pub fn always_fail(code: i32) -> io::Result<Self> {
        Self::write(u32::MAX, code, 0)
    }

    /// Exit with `code` on every invocation
    pub fn exit_with(code: i32) -> io::Result<Self> {
        if code == 0 {
            Self::write(0, 0, 0)
        } else {
            Self::always_fail(code)
        }
    }

    /// Sleep `seconds` on every invocation, then exit 0
    pub fn sleeping(seconds: u32) -> io::Result<Self> {
        Self::write(0, 0, seconds)
    }

    fn write(failures: u32, code: i32, sleep_secs: u32) -> io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let script = dir.path().join("tool.sh");
        let log = dir.path().join("invocations.log");
        let counter = dir.path().join("count");

        let sleep_line = if sleep_secs > 0 {
            format!("sleep {sleep_secs}\n")
        } else {
            String::new()
        };

        let body = format!(
            "#!/bin/sh\n\
             for a in \"$@\"; do printf '%s|' \"$a\" >> '{log}'; done\n\
             echo >> '{log}'\n\
             n=$(cat '{counter}' 2>/dev/null || echo 0)\n\
             n=$((n + 1))\n\
             echo \"$n\" > '{counter}'\n\
             {sleep_line}\
             if [ \"$n\" -le {failures} ]; then\n\
             \techo \"stub failure $n\" >&2\n\
             \texit {code}\n\
             fi\n\
             echo \"stub ok $n\"\n\
             exit 0\n",
            log = log.display(),
            counter = counter.display(),
        );
        fs::write(&script, body)?;

        Ok(Self {
            _dir: dir,
            script,
            log,
        })
    }

    /// Path of the generated script
    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Command prefix that runs the stub, e.g. `sh /tmp/x/tool.sh`
    pub fn program(&self) -> String {
        format!("sh {}", self.script.display())
    }

    /// Flash command template that runs the stub with every placeholder
    pub fn flash_template(&self) -> String {
        format!(
            "{} --port {{port}} --baud {{baudrate}} --image {{firmware}}",
            self.program()
        )
    }

    /// Recorded invocations, each as its argument list
    pub fn invocations(&self) -> io::Result<Vec<Vec<String>>> {
        let contents = match fs::read_to_string(&self.log) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(contents
            .lines()
            .map(|line| {
                line.split('|')
                    .filter(|arg| !arg.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .collect())
    }

    /// Number of times the stub has run
    pub fn invocation_count(&self) -> usize {
        self.invocations().map(|calls| calls.len()).unwrap_or(0)
    }
}
