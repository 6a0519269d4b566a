use super::connection::{handle_connection, reject_connection, ConnectionContext};
use crate::common::Dispatcher;
use crate::dispatch::{RouteRule, RouteTable};
use crate::http::MockConfig;
use crate::record::{RecordedRequest, RequestJournal, RequestRecorder};
use crate::{MockError, Result};
use http::Uri;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn, Instrument};

/// Scriptable HTTP server for tests
///
/// The server binds an ephemeral port on [`start`](MockServer::start), answers
/// each request with the canned response registered for its exact path (or
/// `404` with an empty body), and records every request before answering it.
/// Recorded requests are drained in arrival order with
/// [`take_request`](MockServer::take_request).
///
/// Lifecycle is one-way: idle, running, stopped. `start` on a running server
/// fails with [`MockError::AlreadyStarted`]; `stop` on a stopped server fails
/// with [`MockError::AlreadyStopped`]. Dropping a running server stops it.
///
/// # Examples
///
/// ```no_run
/// use mocksrv::{CannedResponse, HttpClient, MockServer, RouteRule};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut server = MockServer::with_base_path("/api/v1");
///     server.set_routes([RouteRule::new(
///         "/api/v1/hello-world",
///         CannedResponse::ok("Hello, World!"),
///     )]);
///     server.start().await?;
///
///     let response = HttpClient::new().get(&server.url("/hello-world")?).await?;
///     assert_eq!(response.status, 200);
///     assert_eq!(response.text()?, "Hello, World!");
///
///     let recorded = server.take_request(Duration::from_secs(1)).await?;
///     assert_eq!(recorded.method, "GET");
///     assert_eq!(recorded.path, "/api/v1/hello-world");
///
///     server.stop().await?;
///     Ok(())
/// }
/// ```
pub struct MockServer {
    config: MockConfig,
    routes: Arc<RwLock<RouteTable>>,
    journal: RequestJournal,
    recorder: Option<RequestRecorder>,
    state: ServerState,
}

enum ServerState {
    Idle,
    Running(RunningServer),
    Stopped { addr: SocketAddr },
}

struct RunningServer {
    addr: SocketAddr,
    shutdown_signal: broadcast::Sender<()>,
    accept_task: JoinHandle<()>,
}

impl MockServer {
    /// Creates an idle server with the given configuration
    pub fn new(config: MockConfig) -> Self {
        let (journal, recorder) = RequestJournal::new();
        Self {
            config,
            routes: Arc::new(RwLock::new(RouteTable::new())),
            journal,
            recorder: Some(recorder),
            state: ServerState::Idle,
        }
    }

    /// Creates an idle server on an ephemeral loopback port under `base_path`
    pub fn with_base_path(base_path: impl Into<String>) -> Self {
        Self::new(MockConfig {
            base_path: base_path.into(),
            ..MockConfig::default()
        })
    }

    pub fn config(&self) -> &MockConfig {
        &self.config
    }

    /// Binds the listener and starts accepting connections
    ///
    /// Returns the base URL once the listener is bound; requests are served
    /// on a background task from then on.
    pub async fn start(&mut self) -> Result<Uri> {
        match self.state {
            ServerState::Idle => {}
            ServerState::Running(_) => return Err(MockError::AlreadyStarted),
            ServerState::Stopped { .. } => return Err(MockError::AlreadyStopped),
        }
        self.config.validate()?;

        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(MockError::Bind)?;
        let addr = listener.local_addr().map_err(MockError::Bind)?;
        let recorder = self.recorder.take().ok_or(MockError::AlreadyStopped)?;

        let (shutdown_signal, shutdown_rx) = broadcast::channel(1);
        let ctx = Arc::new(ConnectionContext {
            config: self.config.clone(),
            routes: self.routes.clone(),
            recorder,
        });
        let span = tracing::info_span!("mock_server", %addr);
        let accept_task = tokio::spawn(accept_loop(listener, ctx, shutdown_rx).instrument(span));

        self.state = ServerState::Running(RunningServer {
            addr,
            shutdown_signal,
            accept_task,
        });
        info!(%addr, base_path = %self.config.base_path, "Mock server listening");

        self.base_url()
    }

    /// Replaces the route table
    ///
    /// Safe to call before `start` or between requests; a request already
    /// being dispatched sees either the old or the new table.
    pub fn set_routes(&self, rules: impl IntoIterator<Item = RouteRule>) {
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace_rules(rules);
    }

    /// Answers every request that has no route rule with `dispatcher`
    ///
    /// Rules set with [`set_routes`](MockServer::set_routes) or
    /// [`add_route`](MockServer::add_route) still take precedence. Without a
    /// dispatcher unmatched requests get `404`.
    pub fn set_dispatcher(&self, dispatcher: impl Dispatcher + 'static) {
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set_fallback(dispatcher);
    }

    /// Adds one rule to the route table, replacing any rule for the same path
    pub fn add_route(&self, rule: RouteRule) {
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(rule);
    }

    /// Bound address, once started
    pub fn addr(&self) -> Option<SocketAddr> {
        match &self.state {
            ServerState::Idle => None,
            ServerState::Running(running) => Some(running.addr),
            ServerState::Stopped { addr } => Some(*addr),
        }
    }

    /// `http://<host>:<port><base_path><suffix>`
    ///
    /// `suffix` is appended verbatim, so it normally starts with `/`.
    pub fn url(&self, suffix: &str) -> Result<Uri> {
        let addr = self.addr().ok_or(MockError::NotStarted)?;
        let path = format!("{}{}", self.config.base_path, suffix);
        let path = if path.is_empty() { "/".to_string() } else { path };

        Ok(Uri::builder()
            .scheme("http")
            .authority(addr.to_string())
            .path_and_query(path)
            .build()?)
    }

    pub fn base_url(&self) -> Result<Uri> {
        self.url("")
    }

    /// Waits up to `wait` for the oldest uncollected request
    ///
    /// Fails with [`MockError::TakeTimeout`] when nothing arrives in time and
    /// with [`MockError::Stopped`] once the server has stopped and every
    /// recorded request has been taken.
    pub async fn take_request(&self, wait: Duration) -> Result<RecordedRequest> {
        self.journal.take(wait).await
    }

    /// [`take_request`](MockServer::take_request) with the configured wait
    pub async fn take_request_default(&self) -> Result<RecordedRequest> {
        self.take_request(self.config.take_timeout).await
    }

    /// Oldest uncollected request, if one is queued right now
    pub fn try_take_request(&self) -> Option<RecordedRequest> {
        self.journal.try_take()
    }

    /// Number of requests recorded so far, taken or not
    pub fn request_count(&self) -> u64 {
        self.journal.recorded_count()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, ServerState::Running(_))
    }

    /// Closes the listener and aborts open connections
    ///
    /// When this returns the port is released. Requests recorded before the
    /// stop can still be taken.
    pub async fn stop(&mut self) -> Result<()> {
        let addr = match &self.state {
            ServerState::Idle => return Err(MockError::NotStarted),
            ServerState::Stopped { .. } => return Err(MockError::AlreadyStopped),
            ServerState::Running(running) => running.addr,
        };

        if let ServerState::Running(running) =
            std::mem::replace(&mut self.state, ServerState::Stopped { addr })
        {
            // No receiver means the accept loop already exited
            let _ = running.shutdown_signal.send(());
            if let Err(e) = running.accept_task.await {
                if !e.is_cancelled() {
                    error!(%addr, error = %e, "Accept loop failed");
                }
            }
        }

        info!(%addr, recorded = self.request_count(), "Mock server stopped");
        Ok(())
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let ServerState::Running(running) = &self.state {
            running.accept_task.abort();
        }
    }
}

impl std::fmt::Debug for MockServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockServer")
            .field("addr", &self.addr())
            .field("base_path", &self.config.base_path)
            .field("running", &self.is_running())
            .field("recorded", &self.request_count())
            .finish()
    }
}

async fn accept_loop(
    listener: TcpListener,
    ctx: Arc<ConnectionContext>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut connections = JoinSet::new();
    // Kept apart so that refused connections do not count against the cap
    let mut rejections = JoinSet::new();

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, addr)) => {
                        let current = connections.len();
                        if current >= ctx.config.max_connections {
                            warn!(%addr, current, limit = ctx.config.max_connections, "Connection rejected: limit reached");
                            let ctx = ctx.clone();
                            rejections.spawn(
                                async move {
                                    if let Err(e) = reject_connection(stream, addr, ctx).await {
                                        warn!(%addr, error = %e, "Error rejecting connection");
                                    }
                                }
                                .instrument(tracing::info_span!("rejected", %addr)),
                            );
                            continue;
                        }

                        info!(%addr, current = current + 1, "Accepted connection");
                        let span = tracing::info_span!("connection", %addr);
                        let ctx = ctx.clone();
                        connections.spawn(
                            async move {
                                if let Err(e) = handle_connection(stream, addr, ctx).await {
                                    error!(%addr, error = %e, "Error handling connection");
                                }
                            }
                            .instrument(span),
                        );
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                }
            }
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        error!(error = %e, "Connection task panicked");
                    }
                }
            }
            Some(_) = rejections.join_next(), if !rejections.is_empty() => {}
            _ = shutdown_rx.recv() => {
                info!("Received shutdown signal, stopping server");
                break;
            }
        }
    }

    // Forced close: in-flight connections are dropped, not drained
    connections.shutdown().await;
    rejections.shutdown().await;
    drop(listener);
}
