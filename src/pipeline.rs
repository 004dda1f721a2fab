//! The governance pipeline: per-line interception on the client→backend path
//! and response correlation on the backend→client path.
//!
//! Per inbound line: parse → classify → rate-check → deny | batched-dispatch |
//! log-and-forward, with bypass-forward for everything non-mutating and
//! fail-open forwarding for anything unparseable. Governance never blocks
//! traffic it cannot understand.
//!
//! Both writers are serialized through a `Mutex` so NDJSON lines from
//! interleaved tasks (a pacing batch dispatch, a concurrent bypass forward)
//! are never torn. The pipeline is generic over its writers; the proxy wires
//! it to the real child stdin and process stdout, tests wire it to in-memory
//! sinks.

use std::sync::Arc;

use chrono::Utc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::batch::{split_request, SubRequest};
use crate::classify::{is_mutating, tool_name, BATCHABLE_TOOL};
use crate::config::GuardConfig;
use crate::error::{FramingError, GuardError, GuardResult, StreamDirection};
use crate::jsonrpc::{classify, parse_line, JsonRpcId, MessageKind};
use crate::oplog::{LogFileSink, OperationLog, SessionStats};
use crate::ratelimit::check_rate_limit;

/// How the pipeline disposed of one inbound line.
#[derive(Debug)]
pub enum Disposition {
    /// Written to the backend: bypass, fail-open, or a governed single
    /// dispatch.
    Forwarded,
    /// Rate-limited; a JSON-RPC error response went to the client and nothing
    /// went to the backend.
    Denied,
    /// Split into sub-batches; dispatch continues on the returned task while
    /// the read loop keeps draining input.
    Batched(JoinHandle<()>),
}

/// One guard session: configuration, operation log, and the two shared
/// writers.
///
/// Constructed once per process lifetime and explicitly torn down (stats
/// emission) on termination — no ambient singleton.
pub struct Pipeline<B, C> {
    config: Arc<GuardConfig>,
    log: Arc<Mutex<OperationLog>>,
    sink: Option<LogFileSink>,
    backend: Arc<Mutex<B>>,
    client: Arc<Mutex<C>>,
}

impl<B, C> Clone for Pipeline<B, C> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            log: Arc::clone(&self.log),
            sink: self.sink.clone(),
            backend: Arc::clone(&self.backend),
            client: Arc::clone(&self.client),
        }
    }
}

impl<B, C> Pipeline<B, C>
where
    B: AsyncWrite + Unpin + Send + 'static,
    C: AsyncWrite + Unpin + Send + 'static,
{
    /// Build a pipeline around the backend-input and client-output writers.
    pub fn new(config: GuardConfig, backend: B, client: C) -> Self {
        let sink = config
            .log_to_file
            .then(|| LogFileSink::new(&config.log_dir));
        Self {
            config: Arc::new(config),
            log: Arc::new(Mutex::new(OperationLog::new())),
            sink,
            backend: Arc::new(Mutex::new(backend)),
            client: Arc::new(Mutex::new(client)),
        }
    }

    /// Shared handle to the operation log (stats emission, tests).
    pub fn log(&self) -> Arc<Mutex<OperationLog>> {
        Arc::clone(&self.log)
    }

    /// Shared handle to the backend writer (tests).
    pub fn backend_writer(&self) -> Arc<Mutex<B>> {
        Arc::clone(&self.backend)
    }

    /// Shared handle to the client writer (tests).
    pub fn client_writer(&self) -> Arc<Mutex<C>> {
        Arc::clone(&self.client)
    }

    /// Session statistics snapshot.
    pub async fn stats(&self) -> SessionStats {
        self.log.lock().await.stats(Utc::now())
    }

    /// Handle one raw line from the client.
    ///
    /// `raw` is the full NDJSON line including its trailing newline; it is
    /// forwarded byte-identical on every path that reaches the backend.
    pub async fn handle_client_line(&self, raw: &[u8]) -> GuardResult<Disposition> {
        let msg = match parse_line(strip_newline(raw)) {
            Ok(msg) => msg,
            Err(_) => {
                // Fail-open: forward malformed input verbatim, ungoverned.
                self.write_backend(raw).await?;
                return Ok(Disposition::Forwarded);
            }
        };
        let kind = msg.kind;
        let params = msg.params.as_ref();

        if !is_mutating(&kind, params) {
            self.write_backend(raw).await?;
            return Ok(Disposition::Forwarded);
        }

        let tool = tool_name(params).unwrap_or_default().to_string();
        let method = kind.method().unwrap_or_default().to_string();

        // One rate check gates the whole request, batched or not.
        let check = {
            let log = self.log.lock().await;
            check_rate_limit(&log, self.config.max_ops_per_hour, Utc::now())
        };
        if !check.allowed {
            let reason = check.reason.unwrap_or_default();
            warn!(tool = %tool, reason = %reason, "mutating operation blocked");
            if let Some(id) = kind.id() {
                self.send_deny(id, &reason).await?;
            }
            return Ok(Disposition::Denied);
        }

        if let Some(params) = params {
            if let Some(subs) = split_request(&kind, params, self.config.batch_size) {
                let pipeline = self.clone();
                let handle = tokio::spawn(async move {
                    pipeline.dispatch_batches(subs).await;
                });
                return Ok(Disposition::Batched(handle));
            }
        }

        let request_id = kind
            .id()
            .map(JsonRpcId::key)
            .unwrap_or_else(|| "null".to_string());
        self.log_operation(request_id, Some(method), Some(tool))
            .await;
        self.write_backend(raw).await?;
        Ok(Disposition::Forwarded)
    }

    /// Handle one raw line of backend output.
    ///
    /// The bytes are always relayed to the client first; correlation is
    /// best-effort bookkeeping on top.
    pub async fn handle_backend_line(&self, raw: &[u8]) -> GuardResult<()> {
        {
            let mut client = self.client.lock().await;
            client
                .write_all(raw)
                .await
                .map_err(GuardError::StdioIo)?;
            client.flush().await.map_err(GuardError::StdioIo)?;
        }

        let Ok(value) = serde_json::from_slice::<serde_json::Value>(strip_newline(raw)) else {
            return Ok(());
        };
        let Ok(MessageKind::Response { id }) = classify(&value) else {
            return Ok(());
        };

        let failed = value.get("error").is_some();
        let entry = {
            let mut log = self.log.lock().await;
            log.correlate(&id.key(), failed, Utc::now())
        };
        if let Some(entry) = entry {
            info!(
                request_id = %entry.request_id,
                status = ?entry.status,
                "operation completed"
            );
            self.mirror(&entry).await;
        }
        Ok(())
    }

    /// Dispatch sub-batches sequentially with pacing between them.
    ///
    /// A failed write aborts the remaining dispatches (the backend pipe is
    /// gone); a sub-batch's JSON-RPC failure does not — each sub-batch is
    /// tracked independently via response correlation.
    async fn dispatch_batches(&self, subs: Vec<SubRequest>) {
        let total = subs.len();
        info!(batches = total, "splitting large request into batches");

        for (i, sub) in subs.into_iter().enumerate() {
            info!(
                batch = i + 1,
                total,
                items = sub.items,
                id = %sub.id,
                "dispatching batch"
            );
            self.log_operation(
                sub.id.clone(),
                Some("tools/call".to_string()),
                Some(BATCHABLE_TOOL.to_string()),
            )
            .await;

            let mut line = sub.line.into_bytes();
            line.push(b'\n');
            if let Err(e) = self.write_backend(&line).await {
                error!(batch = i + 1, total, error = %e, "batch dispatch failed");
                return;
            }

            if i + 1 < total {
                tokio::time::sleep(self.config.batch_delay).await;
            }
        }
        info!(batches = total, "all batches dispatched");
    }

    /// Append a pending entry and mirror it to the daily file.
    async fn log_operation(
        &self,
        request_id: String,
        method: Option<String>,
        tool: Option<String>,
    ) {
        let entry = {
            let mut log = self.log.lock().await;
            log.append_pending(request_id, method, tool, Utc::now())
        };
        info!(
            tool = entry.tool.as_deref().unwrap_or("-"),
            request_id = %entry.request_id,
            "operation logged"
        );
        self.mirror(&entry).await;
    }

    /// Mirror an entry to the file sink, degrading to a warning on failure.
    async fn mirror(&self, entry: &crate::oplog::LogEntry) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.append(entry).await {
                warn!(error = %e, dir = %sink.dir().display(), "failed to write log file");
            }
        }
    }

    /// Emit a JSON-RPC error response to the client for a denied request.
    async fn send_deny(&self, id: &JsonRpcId, reason: &str) -> GuardResult<()> {
        let response = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32000, "message": reason },
        });
        // The json!() value above always serializes; guard against truly
        // pathological id values rather than panicking mid-session.
        let mut line = serde_json::to_string(&response).unwrap_or_else(|_| {
            format!(r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":-32000,"message":"{reason}"}}}}"#)
        });
        line.push('\n');

        let mut client = self.client.lock().await;
        client
            .write_all(line.as_bytes())
            .await
            .map_err(GuardError::StdioIo)?;
        client.flush().await.map_err(GuardError::StdioIo)
    }

    /// Atomically write bytes to the backend and flush.
    async fn write_backend(&self, raw: &[u8]) -> GuardResult<()> {
        let mut backend = self.backend.lock().await;
        let write = async {
            backend.write_all(raw).await?;
            if !raw.ends_with(b"\n") {
                backend.write_all(b"\n").await?;
            }
            backend.flush().await
        };
        write.await.map_err(|e| GuardError::Framing {
            direction: StreamDirection::ClientToBackend,
            source: FramingError::Io(e),
        })
    }
}

/// Trim a single trailing newline (and carriage return) for parsing.
fn strip_newline(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}
