//! Process glue: backend subprocess lifecycle and the stdio proxy loops.
//!
//! Spawns the backend MCP server with piped stdin/stdout (stderr inherited,
//! relayed unmodified), wires the governance pipeline to the real handles,
//! and runs two read loops until the client closes stdin, the backend exits,
//! or a terminating signal arrives. The guard's exit code mirrors the
//! backend's — its lifetime is bound to the backend process.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::GuardConfig;
use crate::error::{FramingError, GuardError, GuardResult, StreamDirection};
use crate::pipeline::Pipeline;

/// Maximum NDJSON line size (10 MB).
///
/// Lines exceeding this are skipped before JSON parsing so a peer streaming
/// bytes without a newline cannot force unbounded allocation.
pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

/// Grace period after the proxy loops stop before escalating to SIGTERM.
const STDIN_CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Grace period after SIGTERM before escalating to SIGKILL.
const SIGTERM_GRACE: Duration = Duration::from_secs(2);

/// Upper bound on skipping the remainder of an oversized line.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Run the guard proxy around one backend server process.
///
/// Returns the backend's exit code. Spawn failure is fatal — the guard never
/// runs ungoverned.
pub async fn run_proxy(
    config: GuardConfig,
    command: String,
    args: Vec<String>,
) -> GuardResult<i32> {
    if config.log_to_file {
        if let Err(e) = tokio::fs::create_dir_all(&config.log_dir).await {
            warn!(
                dir = %config.log_dir.display(),
                error = %e,
                "failed to create log directory, file logging degraded"
            );
        }
    }

    let mut cmd = Command::new(&command);
    cmd.args(&args)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::inherit())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|e| GuardError::BackendSpawn {
        command: command.clone(),
        reason: e.to_string(),
    })?;

    info!(
        command = %command,
        rate_limit = config.max_ops_per_hour,
        batch_size = config.batch_size,
        batch_delay_ms = config.batch_delay.as_millis() as u64,
        file_logging = config.log_to_file,
        log_dir = %config.log_dir.display(),
        "backend server spawned, guard active"
    );

    let child_stdin = child.stdin.take().ok_or_else(|| GuardError::BackendSpawn {
        command: command.clone(),
        reason: "failed to capture backend stdin".to_string(),
    })?;
    let child_stdout = child
        .stdout
        .take()
        .ok_or_else(|| GuardError::BackendSpawn {
            command: command.clone(),
            reason: "failed to capture backend stdout".to_string(),
        })?;

    let pipeline = Pipeline::new(config, child_stdin, tokio::io::stdout());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Client → backend: governed path.
    let c2b_handle = {
        let pipeline = pipeline.clone();
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let reader = BufReader::new(tokio::io::stdin());
            client_to_backend(pipeline, reader, &mut shutdown_rx).await
        })
    };

    // Backend → client: relay plus correlation.
    let b2c_handle = {
        let pipeline = pipeline.clone();
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let reader = BufReader::new(child_stdout);
            backend_to_client(pipeline, reader, &mut shutdown_rx).await
        })
    };

    tokio::select! {
        result = c2b_handle => {
            match result {
                Ok(Ok(())) => info!("client stream closed (stdin EOF)"),
                Ok(Err(ref e)) => error!(error = %e, "client→backend task failed"),
                Err(ref e) => error!(error = %e, "client→backend task panicked"),
            }
        }
        result = b2c_handle => {
            match result {
                Ok(Ok(())) => info!("backend stream closed (backend stdout EOF)"),
                Ok(Err(ref e)) => error!(error = %e, "backend→client task failed"),
                Err(ref e) => error!(error = %e, "backend→client task panicked"),
            }
        }
        status = child.wait() => {
            match status {
                Ok(ref s) => info!(?s, "backend process exited"),
                Err(ref e) => error!(error = %e, "failed to wait on backend process"),
            }
        }
        _ = terminate_signal() => {
            info!("termination signal received");
        }
    }
    let _ = shutdown_tx.send(true);

    // Explicit teardown: session statistics, then backend shutdown.
    let stats = pipeline.stats().await;
    info!(
        total = stats.total,
        successful = stats.successful,
        failed = stats.failed,
        pending = stats.pending,
        last_hour = stats.last_hour,
        "session statistics"
    );

    shutdown_backend(&mut child).await
}

/// Wait for SIGINT or SIGTERM.
async fn terminate_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler");
                    // Fall back to SIGINT only.
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Read client stdin line-by-line and feed the governance pipeline.
async fn client_to_backend<R, B, C>(
    pipeline: Pipeline<B, C>,
    mut reader: R,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> GuardResult<()>
where
    R: AsyncBufRead + Unpin,
    B: tokio::io::AsyncWrite + Unpin + Send + 'static,
    C: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let bytes_read = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                debug!("client→backend: shutdown signal received");
                return Ok(());
            }
            result = bounded_read_line(&mut reader, &mut buf, MAX_LINE_BYTES) => {
                match result {
                    Ok(n) => n,
                    Err(FramingError::LineTooLarge { .. }) => {
                        warn!("client→backend: line exceeded size limit, skipping");
                        continue;
                    }
                    Err(e) => {
                        return Err(GuardError::Framing {
                            direction: StreamDirection::ClientToBackend,
                            source: e,
                        });
                    }
                }
            }
        };
        if bytes_read == 0 {
            debug!("client stdin EOF");
            return Ok(());
        }

        // A batched disposition keeps dispatching on its own task; the loop
        // stays free to drain further inbound lines meanwhile.
        pipeline.handle_client_line(&buf).await?;
    }
}

/// Read backend stdout line-by-line: relay raw, correlate responses.
async fn backend_to_client<R, B, C>(
    pipeline: Pipeline<B, C>,
    mut reader: R,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> GuardResult<()>
where
    R: AsyncBufRead + Unpin,
    B: tokio::io::AsyncWrite + Unpin + Send + 'static,
    C: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let bytes_read = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                debug!("backend→client: shutdown signal received");
                return Ok(());
            }
            result = bounded_read_line(&mut reader, &mut buf, MAX_LINE_BYTES) => {
                match result {
                    Ok(n) => n,
                    Err(FramingError::LineTooLarge { .. }) => {
                        warn!("backend→client: line exceeded size limit, skipping");
                        continue;
                    }
                    Err(e) => {
                        return Err(GuardError::Framing {
                            direction: StreamDirection::BackendToClient,
                            source: e,
                        });
                    }
                }
            }
        };
        if bytes_read == 0 {
            debug!("backend stdout EOF");
            return Ok(());
        }

        pipeline.handle_backend_line(&buf).await?;
    }
}

/// Read a single line, enforcing a byte limit.
///
/// Unlike bare `read_until`, this will not allocate unbounded memory if the
/// peer streams bytes without a newline: once the accumulated length exceeds
/// `max_bytes`, the remainder of the offending line is drained and
/// [`FramingError::LineTooLarge`] is returned, leaving the reader positioned
/// at the start of the next line.
///
/// Returns `Ok(0)` on EOF; the returned buffer includes the trailing newline
/// when one was present.
pub async fn bounded_read_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_bytes: usize,
) -> Result<usize, FramingError> {
    let mut total = 0usize;
    loop {
        let available = reader.fill_buf().await.map_err(FramingError::Io)?;
        if available.is_empty() {
            // EOF — return what was accumulated (0 if nothing).
            return Ok(total);
        }

        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let to_consume = pos + 1;
                if total + to_consume > max_bytes {
                    reader.consume(to_consume);
                    return Err(FramingError::LineTooLarge { max_bytes });
                }
                buf.extend_from_slice(&available[..to_consume]);
                total += to_consume;
                reader.consume(to_consume);
                return Ok(total);
            }
            None => {
                let len = available.len();
                if total + len > max_bytes {
                    reader.consume(len);
                    drain_until_newline(reader).await;
                    return Err(FramingError::LineTooLarge { max_bytes });
                }
                buf.extend_from_slice(available);
                total += len;
                reader.consume(len);
            }
        }
    }
}

/// Skip bytes until a newline or EOF, repositioning after an oversized line.
///
/// Bounded by a 30-second timeout so a peer that stalls mid-oversized-line
/// cannot wedge the read loop.
async fn drain_until_newline<R: AsyncBufRead + Unpin>(reader: &mut R) {
    let drain = async {
        loop {
            match reader.fill_buf().await {
                Ok([]) => return,
                Ok(available) => {
                    if let Some(pos) = available.iter().position(|&b| b == b'\n') {
                        reader.consume(pos + 1);
                        return;
                    }
                    let len = available.len();
                    reader.consume(len);
                }
                Err(e) => {
                    warn!(error = %e, "IO error while draining oversized line");
                    return;
                }
            }
        }
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        warn!("timed out draining oversized line");
    }
}

/// Graceful shutdown escalation for the backend child process.
///
/// 1. Wait `STDIN_CLOSE_GRACE` for a clean exit
/// 2. SIGTERM to the process group (Unix)
/// 3. Wait `SIGTERM_GRACE`
/// 4. SIGKILL, then reap
async fn shutdown_backend(child: &mut Child) -> GuardResult<i32> {
    match tokio::time::timeout(STDIN_CLOSE_GRACE, child.wait()).await {
        Ok(Ok(status)) => {
            let code = status.code().unwrap_or(-1);
            info!(code, "backend exited");
            return Ok(code);
        }
        Ok(Err(e)) => error!(error = %e, "wait failed during shutdown"),
        Err(_) => info!("backend did not exit within grace period"),
    }

    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;
        if let Some(pid) = child.id() {
            info!(pid, "sending SIGTERM to backend process group");
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!(pid, error = ?e, "killpg SIGTERM failed");
            }
        }
    }

    match tokio::time::timeout(SIGTERM_GRACE, child.wait()).await {
        Ok(Ok(status)) => {
            let code = status.code().unwrap_or(-1);
            info!(code, "backend exited after SIGTERM");
            return Ok(code);
        }
        Ok(Err(e)) => error!(error = %e, "wait failed after SIGTERM"),
        Err(_) => warn!("backend did not exit after SIGTERM"),
    }

    warn!("sending SIGKILL to backend");
    if let Err(e) = child.kill().await {
        error!(error = %e, "SIGKILL failed");
    }
    let status = child.wait().await.map_err(GuardError::StdioIo)?;
    let code = status.code().unwrap_or(-1);
    info!(code, "backend exited after SIGKILL");
    Ok(code)
}
