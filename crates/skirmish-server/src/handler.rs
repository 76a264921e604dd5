//! Per-connection request/response protocol.

use std::sync::Arc;
use std::time::Duration;

use skirmish_policy::Policy;
use skirmish_types::{Decision, Observation, SkirmishError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Upper bound on the bytes read for one request.
pub const MAX_REQUEST_BYTES: usize = 8192;

const READ_CHUNK: usize = 4096;

/// Sent verbatim whenever a request cannot be processed.
pub const FALLBACK_RESPONSE: &[u8] = b"{\"action\":\"idle\",\"confidence\":0.5}\n";

/// Which path a connection took.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionOutcome {
    /// The policy answered and its decision was written.
    Decided(Decision),
    /// Processing failed and [`FALLBACK_RESPONSE`] was written.
    Fallback,
    /// The peer sent nothing; no response was written.
    Empty,
}

/// Serve one request on `stream`, then close it.
///
/// Decode failures and policy panics never escape: they are answered with
/// [`FALLBACK_RESPONSE`]. The write half is shut down and `stream` dropped on
/// every path, so the connection is closed exactly once.
///
/// `read_timeout` bounds the whole read phase. When it elapses the bytes
/// received so far are treated as the complete request.
///
/// # Errors
///
/// Returns [`SkirmishError::Io`] only when writing the response fails.
pub async fn handle_connection<S>(
    mut stream: S,
    policy: Arc<dyn Policy>,
    read_timeout: Option<Duration>,
) -> Result<ConnectionOutcome, SkirmishError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = serve_request(&mut stream, policy, read_timeout).await;
    if let Err(e) = stream.shutdown().await {
        debug!(error = %e, "shutdown failed");
    }
    result
}

async fn serve_request<S>(
    stream: &mut S,
    policy: Arc<dyn Policy>,
    read_timeout: Option<Duration>,
) -> Result<ConnectionOutcome, SkirmishError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let processed = match read_request(stream, read_timeout).await {
        Ok(raw) if raw.is_empty() => {
            debug!("peer closed before sending data");
            return Ok(ConnectionOutcome::Empty);
        }
        Ok(raw) => process(&raw, policy).await,
        Err(e) => Err(SkirmishError::Io(e.to_string())),
    };

    let (outcome, response) = match processed {
        Ok((decision, response)) => (ConnectionOutcome::Decided(decision), response),
        Err(e) => {
            warn!(error = %e, "request failed; sending fallback");
            (ConnectionOutcome::Fallback, FALLBACK_RESPONSE.to_vec())
        }
    };

    stream
        .write_all(&response)
        .await
        .map_err(|e| SkirmishError::Io(format!("write response: {e}")))?;
    Ok(outcome)
}

/// Accumulate bytes until a newline, EOF, the size cap or the deadline.
async fn read_request<S>(stream: &mut S, read_timeout: Option<Duration>) -> std::io::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let deadline = read_timeout.map(|t| Instant::now() + t);
    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    while buf.len() < MAX_REQUEST_BYTES {
        let want = READ_CHUNK.min(MAX_REQUEST_BYTES - buf.len());
        let read = stream.read(&mut chunk[..want]);
        let n = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, read).await {
                Ok(res) => res?,
                Err(_) => {
                    debug!(received = buf.len(), "read timed out");
                    break;
                }
            },
            None => read.await?,
        };
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if chunk[..n].contains(&b'\n') {
            break;
        }
    }
    Ok(buf)
}

/// The request body: everything read, ASCII-trimmed. Bytes that arrived
/// after the newline are part of it and make the record malformed.
fn frame(raw: &[u8]) -> &[u8] {
    raw.trim_ascii()
}

async fn process(
    raw: &[u8],
    policy: Arc<dyn Policy>,
) -> Result<(Decision, Vec<u8>), SkirmishError> {
    let observation: Observation = serde_json::from_slice(frame(raw))
        .map_err(|e| SkirmishError::Decode(e.to_string()))?;

    // Model-backed policies block on HTTP; keep them off the async workers.
    let decision = tokio::task::spawn_blocking(move || policy.decide(&observation))
        .await
        .map_err(|e| SkirmishError::ModelInference(format!("policy aborted: {e}")))?;

    let mut response =
        serde_json::to_vec(&decision).map_err(|e| SkirmishError::Decode(e.to_string()))?;
    response.push(b'\n');
    Ok((decision, response))
}
