//! [`DecisionServer`] – loopback TCP listener for the decision service.
//!
//! Every accepted connection is handed to [`handle_connection`] on its own
//! Tokio task. Tasks share nothing but the read-only policy, so a slow or
//! stalled peer never delays anyone else.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use skirmish_policy::Policy;
use skirmish_types::SkirmishError;
use tokio::net::TcpListener;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::handler::{ConnectionOutcome, handle_connection};

/// Default TCP port for the decision service.
pub const DEFAULT_PORT: u16 = 12345;

/// Default bound on the read phase of a single connection.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// DecisionServer
// ---------------------------------------------------------------------------

/// Accepts connections on `127.0.0.1` and answers one observation each.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use skirmish_policy::HeuristicPolicy;
/// use skirmish_server::DecisionServer;
///
/// # async fn demo() {
/// DecisionServer::new(Arc::new(HeuristicPolicy::new()))
///     .with_port(4000)
///     .with_read_timeout(None)
///     .run()
///     .await
///     .expect("decision server failed");
/// # }
/// ```
pub struct DecisionServer {
    policy: Arc<dyn Policy>,
    port: u16,
    read_timeout: Option<Duration>,
}

impl DecisionServer {
    /// Create a server answering with `policy` on the [`DEFAULT_PORT`].
    pub fn new(policy: Arc<dyn Policy>) -> Self {
        Self {
            policy,
            port: DEFAULT_PORT,
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
        }
    }

    /// Override the listening port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Override the per-connection read timeout. `None` waits forever.
    pub fn with_read_timeout(mut self, read_timeout: Option<Duration>) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Return the configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Return the configured read timeout.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Bind `127.0.0.1:<port>` and serve until the task is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SkirmishError::Bind`] if the listener cannot bind.
    pub async fn run(self) -> Result<(), SkirmishError> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SkirmishError::Bind(format!("{addr}: {e}")))?;
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener.
    ///
    /// Accept errors are logged and the loop continues; this only returns
    /// if the listener's address cannot be read.
    pub async fn serve(self, listener: TcpListener) -> Result<(), SkirmishError> {
        let local = listener
            .local_addr()
            .map_err(|e| SkirmishError::Bind(e.to_string()))?;
        info!(
            addr = %local,
            policy = self.policy.name(),
            read_timeout_ms = self.read_timeout.map(|t| t.as_millis() as u64),
            "decision server ready"
        );

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let policy = Arc::clone(&self.policy);
                    let read_timeout = self.read_timeout;
                    let span = info_span!("conn", id = %Uuid::new_v4(), peer = %peer);
                    tokio::spawn(
                        async move {
                            match handle_connection(stream, policy, read_timeout).await {
                                Ok(ConnectionOutcome::Decided(d)) => {
                                    debug!(action = %d.action, confidence = d.confidence, "decision sent");
                                }
                                Ok(ConnectionOutcome::Fallback) => {
                                    debug!("fallback sent");
                                }
                                Ok(ConnectionOutcome::Empty) => {}
                                Err(e) => {
                                    warn!(error = %e, "connection error");
                                }
                            }
                        }
                        .instrument(span),
                    );
                }
                Err(e) => {
                    error!(error = %e, "accept error");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
