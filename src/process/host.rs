//! Host process runner - launches step commands as local subprocesses

use crate::process::{Invocation, ProcessError, ProcessOutput, ProcessRunner};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long to keep draining pipes after the process exits
///
/// Background grandchildren can hold the pipes open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Runs invocations directly on the host (no shell)
#[derive(Debug, Clone, Default)]
pub struct HostProcessRunner;

impl HostProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

type SharedBuffer = Arc<Mutex<Vec<u8>>>;

/// Copy a pipe into a shared buffer until EOF
fn capture<R>(reader: Option<R>) -> (SharedBuffer, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer: SharedBuffer = Arc::new(Mutex::new(Vec::new()));
    let sink = buffer.clone();

    let handle = tokio::spawn(async move {
        let Some(mut reader) = reader else { return };
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink.lock().await.extend_from_slice(&chunk[..n]),
            }
        }
    });

    (buffer, handle)
}

/// Wait briefly for a capture task, then return whatever it collected
async fn collect(mut handle: JoinHandle<()>, buffer: SharedBuffer) -> String {
    if tokio::time::timeout(DRAIN_GRACE, &mut handle).await.is_err() {
        handle.abort();
    }
    let bytes = buffer.lock().await;
    String::from_utf8_lossy(&bytes).into_owned()
}

/// SIGKILL the step's whole process group
#[cfg(unix)]
fn kill_process_group(child: &Child) {
    let Some(pgid) = child.id().and_then(|id| libc::pid_t::try_from(id).ok()) else {
        return;
    };
    // SAFETY: kill(2) takes no pointers; a negative pid addresses the group
    // created by `process_group(0)`, whose id is the child's pid.
    if unsafe { libc::kill(-pgid, libc::SIGKILL) } != 0 {
        debug!(
            "Failed to signal process group {}: {}",
            pgid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

#[async_trait]
impl ProcessRunner for HostProcessRunner {
    async fn run(&self, invocation: &Invocation, timeout: Duration) -> Result<ProcessOutput, ProcessError> {
        debug!(
            "Spawning {} {:?} in {}",
            invocation.program,
            invocation.args,
            invocation.working_dir.display()
        );

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group: terminal Ctrl-C stays with us, and a timeout can
        // take down everything the step forked.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        let (stdout_buf, stdout_task) = capture(child.stdout.take());
        let (stderr_buf, stderr_task) = capture(child.stderr.take());

        let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => {
                let status = status.map_err(|source| ProcessError::Io {
                    program: invocation.program.clone(),
                    source,
                })?;
                (status.code(), false)
            }
            Err(_) => {
                warn!(
                    "{} exceeded timeout of {}s, killing",
                    invocation.program,
                    timeout.as_secs()
                );
                kill_process_group(&child);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {}: {}", invocation.program, e);
                }
                (None, true)
            }
        };

        let stdout = collect(stdout_task, stdout_buf).await;
        let stderr = collect(stderr_task, stderr_buf).await;

        debug!(
            "{} finished (exit {:?}, timed out: {}), {} bytes stdout, {} bytes stderr",
            invocation.program,
            exit_code,
            timed_out,
            stdout.len(),
            stderr.len()
        );

        Ok(ProcessOutput {
            stdout,
            stderr,
            exit_code,
            timed_out,
        })
    }
}
