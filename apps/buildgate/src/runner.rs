//! External process execution with output teed to a log file.
//!
//! Every invocation is blocking: the child is spawned, stdout and stderr are
//! drained line by line into the log (and optionally echoed to the console),
//! and the call returns once the child exits. There is no timeout; a hung
//! tool blocks the pipeline until the operator kills it.

use crate::error::{GateError, Result};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Debug, Clone, PartialEq)]
/// A fully-specified command line.
pub struct ToolInvocation {
    /// Human-readable tool name used in diagnostics
    pub tool: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl ToolInvocation {
    pub fn display(&self) -> String {
        let mut s = self.program.to_string_lossy().to_string();
        for a in &self.args {
            s.push(' ');
            if a.contains(' ') {
                s.push('"');
                s.push_str(a);
                s.push('"');
            } else {
                s.push_str(a);
            }
        }
        s
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub exit_code: i32,
    /// Captured stdout and stderr lines in arrival order
    pub lines: Vec<String>,
}

/// Seam between the pipeline and process execution.
pub trait ToolRunner {
    /// Run `inv` to completion, writing its output to `log_path`.
    fn run(&self, inv: &ToolInvocation, log_path: &Path) -> Result<ToolOutput>;
}

/// Runs tools as child processes.
pub struct ProcessRunner {
    /// Echo tool output to stdout while it runs
    pub echo: bool,
}

impl ProcessRunner {
    pub fn new(echo: bool) -> Self {
        ProcessRunner { echo }
    }
}

struct Tee {
    log: File,
    log_path: PathBuf,
    log_failed: bool,
    lines: Vec<String>,
    echo: bool,
}

impl Tee {
    fn push(&mut self, line: String) {
        // The line stays captured for classification even when the log write fails
        if let Err(e) = writeln!(self.log, "{}", line) {
            if !self.log_failed {
                tracing::warn!(
                    log = %self.log_path.display(),
                    error = %e,
                    "failed writing tool output to log; further write errors suppressed"
                );
                self.log_failed = true;
            }
        }
        if self.echo {
            println!("{}", line);
        }
        self.lines.push(line);
    }
}

fn drain<R: std::io::Read>(reader: R, tee: &Arc<Mutex<Tee>>) {
    let reader = BufReader::new(reader);
    for line in reader.split(b'\n').map_while(|l| l.ok()) {
        let text = String::from_utf8_lossy(&line)
            .trim_end_matches('\r')
            .to_string();
        let mut t = tee.lock().unwrap_or_else(|p| p.into_inner());
        t.push(text);
    }
}

impl ToolRunner for ProcessRunner {
    fn run(&self, inv: &ToolInvocation, log_path: &Path) -> Result<ToolOutput> {
        if !inv.program.is_file() {
            return Err(GateError::ToolNotFound {
                tool: inv.tool.clone(),
                path: inv.program.clone(),
            });
        }
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent).map_err(|e| GateError::io(parent, e))?;
        }
        let log = File::create(log_path).map_err(|e| GateError::io(log_path, e))?;

        tracing::info!(tool = %inv.tool, command = %inv.display(), "starting");
        let mut child = Command::new(&inv.program)
            .args(&inv.args)
            .current_dir(&inv.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| GateError::Spawn {
                program: inv.program.to_string_lossy().to_string(),
                source,
            })?;

        let tee = Arc::new(Mutex::new(Tee {
            log,
            log_path: log_path.to_path_buf(),
            log_failed: false,
            lines: Vec::new(),
            echo: self.echo,
        }));

        // stderr drains on a helper thread so neither pipe can fill up
        let stderr_handle = child.stderr.take().map(|stderr| {
            let tee = Arc::clone(&tee);
            thread::spawn(move || drain(stderr, &tee))
        });
        if let Some(stdout) = child.stdout.take() {
            drain(stdout, &tee);
        }
        let stderr_joined = stderr_handle.map_or(true, |h| h.join().is_ok());

        let status = child.wait().map_err(|source| GateError::Spawn {
            program: inv.program.to_string_lossy().to_string(),
            source,
        })?;
        if !stderr_joined {
            tracing::warn!(tool = %inv.tool, "stderr reader panicked; output is incomplete");
            return Err(GateError::Spawn {
                program: inv.program.to_string_lossy().to_string(),
                source: std::io::Error::other("stderr reader panicked"),
            });
        }
        let exit_code = status.code().unwrap_or(-1);
        tracing::info!(tool = %inv.tool, exit_code, "finished");

        let lines = match Arc::try_unwrap(tee) {
            Ok(m) => m.into_inner().unwrap_or_else(|p| p.into_inner()).lines,
            Err(shared) => shared.lock().unwrap_or_else(|p| p.into_inner()).lines.clone(),
        };
        Ok(ToolOutput { exit_code, lines })
    }
}
