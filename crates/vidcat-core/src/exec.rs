use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },
    #[error("{tool} timed out after {timeout:?}")]
    Timeout { tool: String, timeout: Duration },
    #[error("i/o error while running {tool}: {source}")]
    Io {
        tool: String,
        source: std::io::Error,
    },
}

/// Captured result of a completed child process.
#[derive(Debug)]
pub struct ExecOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Run a command to completion, killing it once `timeout` elapses.
/// A timeout counts as a failure, same as a non-zero exit.
///
/// Both pipes are drained on reader threads so a chatty child can never
/// block on a full pipe buffer.
pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<ExecOutput, ExecError> {
    let tool = cmd.get_program().to_string_lossy().into_owned();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
        tool: tool.clone(),
        source,
    })?;
    let out_reader = drain(child.stdout.take());
    let err_reader = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = out_reader.join();
                    let _ = err_reader.join();
                    return Err(ExecError::Timeout { tool, timeout });
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(source) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExecError::Io { tool, source });
            }
        }
    };

    Ok(ExecOutput {
        status,
        stdout: out_reader.join().unwrap_or_default(),
        stderr: err_reader.join().unwrap_or_default(),
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// External tools the pipelines can call. Either may be absent; callers
/// fall back to heuristics or skip the file.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

impl ToolSet {
    /// Locate ffmpeg/ffprobe on PATH and confirm each answers `-version`.
    pub fn detect() -> Self {
        Self {
            ffmpeg: detect_tool("ffmpeg"),
            ffprobe: detect_tool("ffprobe"),
        }
    }

    pub fn ffmpeg_available(&self) -> bool {
        self.ffmpeg.is_some()
    }
}

fn detect_tool(name: &str) -> Option<PathBuf> {
    let path = which::which(name).ok()?;
    let mut cmd = Command::new(&path);
    cmd.arg("-version");
    match run_with_timeout(cmd, VERSION_CHECK_TIMEOUT) {
        Ok(out) if out.success() => Some(path),
        _ => None,
    }
}
