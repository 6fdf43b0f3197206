//! The server façade.
//!
//! [`Server`] owns the route table and middleware list while they are
//! mutable, then freezes both at [`Server::start`]: the middleware chain
//! is folded once, the listener is bound, the worker runtime spawns the
//! acceptor tasks and the signal handlers are installed. [`Server::stop`]
//! is idempotent and safe from the signal path; [`Server::wait`] blocks
//! the calling thread until shutdown completes.

mod acceptor;
mod dispatcher;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use http::Method;
use thiserror::Error;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::handler::Handler;
use crate::middleware::Middleware;
use crate::router::{RouteTrie, RouterError};

use dispatcher::Dispatcher;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ServerError {
    /// Routes and middleware are frozen once the server is running
    #[error("configuration is locked after server start")]
    ConfigLocked,

    #[error("server is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Route(#[from] RouterError),

    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: std::io::Error },

    #[error("failed to build worker runtime: {source}")]
    Runtime { source: std::io::Error },

    #[error("failed to create tmp dir {path}: {source}")]
    TmpDir { path: String, source: std::io::Error },
}

/// Shared stop machinery, reachable from the signal task.
struct StopSignal {
    running: AtomicBool,
    shutdown: CancellationToken,
    stopped: Mutex<bool>,
    stopped_cv: Condvar,
}

impl StopSignal {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            stopped: Mutex::new(true),
            stopped_cv: Condvar::new(),
        }
    }

    /// Flips the server out of the running state and releases waiters.
    /// Idempotent; does not touch the runtime.
    fn trigger(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        self.shutdown.cancel();

        let mut stopped = self.stopped.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *stopped = true;
        self.stopped_cv.notify_all();
    }
}

pub struct Server {
    trie: Option<RouteTrie>,
    middlewares: Vec<Arc<dyn Middleware>>,
    signal: Arc<StopSignal>,
    runtime: Mutex<Option<Runtime>>,
    bound_addr: Mutex<Option<std::net::SocketAddr>>,
}

impl Server {
    pub fn new() -> Self {
        Self {
            trie: Some(RouteTrie::new()),
            middlewares: Vec::new(),
            signal: Arc::new(StopSignal::new()),
            runtime: Mutex::new(None),
            bound_addr: Mutex::new(None),
        }
    }

    fn is_running(&self) -> bool {
        self.signal.running.load(Ordering::Acquire)
    }

    /// Registers a handler for `(method, path)`.
    ///
    /// Fails with [`ServerError::ConfigLocked`] once the server runs and
    /// with the underlying [`RouterError`] on conflicting or malformed
    /// paths.
    pub fn add_route(&mut self, method: Method, path: &str, handler: Handler) -> Result<(), ServerError> {
        if self.is_running() {
            return Err(ServerError::ConfigLocked);
        }

        let trie = self.trie.as_mut().ok_or(ServerError::ConfigLocked)?;
        trie.insert(method, path, handler)?;
        Ok(())
    }

    pub fn get(&mut self, path: &str, handler: Handler) -> Result<(), ServerError> {
        self.add_route(Method::GET, path, handler)
    }

    pub fn post(&mut self, path: &str, handler: Handler) -> Result<(), ServerError> {
        self.add_route(Method::POST, path, handler)
    }

    pub fn put(&mut self, path: &str, handler: Handler) -> Result<(), ServerError> {
        self.add_route(Method::PUT, path, handler)
    }

    pub fn delete(&mut self, path: &str, handler: Handler) -> Result<(), ServerError> {
        self.add_route(Method::DELETE, path, handler)
    }

    /// Appends a middleware to the chain-to-be.
    ///
    /// The chain is frozen at start; this fails afterwards.
    pub fn add_middleware<M: Middleware + 'static>(&mut self, middleware: M) -> Result<(), ServerError> {
        if self.is_running() {
            return Err(ServerError::ConfigLocked);
        }

        self.middlewares.push(Arc::new(middleware));
        Ok(())
    }

    /// Validates the configuration, freezes routes and middleware, binds
    /// the listener and spawns the worker runtime. Returns once the
    /// server is accepting.
    pub fn start(&mut self, mut config: ServerConfig) -> Result<(), ServerError> {
        if self.signal.running.swap(true, Ordering::AcqRel) {
            return Err(ServerError::AlreadyRunning);
        }

        init_logging(config.log_level);

        let addr = config.bind_addr();

        if !config.tmp_dir.exists() {
            std::fs::create_dir_all(&config.tmp_dir).map_err(|e| {
                self.signal.running.store(false, Ordering::Release);
                ServerError::TmpDir { path: config.tmp_dir.display().to_string(), source: e }
            })?;
            debug!(path = %config.tmp_dir.display(), "created tmp directory");
        }

        // freeze the route table and the middleware chain
        let trie = self.trie.take().unwrap_or_default();
        let dispatcher =
            Arc::new(Dispatcher::new(trie, &self.middlewares, config.multipart_limits(), config.response_class));

        let workers = if config.workers <= 0 {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
        } else {
            config.workers as usize
        };
        let (acceptors, general_workers) = acceptor::partition_workers(workers);
        debug!(acceptors, general_workers, "partitioned worker pool");

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name("oxapi-worker")
            .enable_all()
            .build()
            .map_err(|e| {
                self.signal.running.store(false, Ordering::Release);
                ServerError::Runtime { source: e }
            })?;

        let listener = {
            let _guard = runtime.enter();
            acceptor::bind_listener(addr, &config).map_err(|e| {
                self.signal.running.store(false, Ordering::Release);
                ServerError::Bind { addr: addr.to_string(), source: e }
            })?
        };
        let listener = Arc::new(listener);

        {
            let mut stopped = self.signal.stopped.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            *stopped = false;
        }
        *self.bound_addr.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(addr);

        for _ in 0..acceptors {
            runtime.spawn(acceptor::accept_loop(
                listener.clone(),
                dispatcher.clone(),
                config.connection_config(),
                config.tcp_no_delay,
                self.signal.shutdown.clone(),
            ));
        }

        runtime.spawn(wait_for_signals(self.signal.clone()));

        *self.runtime.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(runtime);

        info!("listening on {}", addr);
        Ok(())
    }

    /// Stops the server: cancels the acceptors, closes the listener and
    /// tears the runtime down with a grace period. Idempotent; safe to
    /// call from the signal path, where runtime teardown is deferred to
    /// [`Server::wait`].
    pub fn stop(&self) {
        self.signal.trigger();
        self.join_runtime();
    }

    /// Blocks the calling thread until `stop` has run, then finishes the
    /// runtime teardown.
    pub fn wait(&self) {
        info!("waiting for shutdown");

        {
            let mut stopped = self.signal.stopped.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            while !*stopped {
                stopped = self.signal.stopped_cv.wait(stopped).unwrap_or_else(|poisoned| poisoned.into_inner());
            }
        }

        self.join_runtime();
        info!("shutdown complete");
    }

    /// Tears the runtime down unless called from inside it.
    fn join_runtime(&self) {
        if tokio::runtime::Handle::try_current().is_ok() {
            // on a runtime thread (signal task); the blocked wait() call
            // finishes the teardown
            return;
        }

        let runtime = self.runtime.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take();
        if let Some(runtime) = runtime {
            runtime.shutdown_timeout(SHUTDOWN_GRACE);
            debug!("worker runtime stopped");
        }
    }

    /// The address the listener was bound to, once running.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        *self.bound_addr.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

fn init_logging(level: tracing::Level) {
    // a pre-installed subscriber wins, e.g. in tests
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
}

/// Installs SIGINT/SIGTERM/SIGQUIT handlers that flip the stop signal.
#[cfg(unix)]
async fn wait_for_signals(signal: Arc<StopSignal>) {
    use tokio::signal::unix::{signal as unix_signal, SignalKind};

    let mut interrupt = match unix_signal(SignalKind::interrupt()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("failed to install SIGINT handler: {}", e);
            return;
        }
    };
    let mut terminate = match unix_signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("failed to install SIGTERM handler: {}", e);
            return;
        }
    };
    let mut quit = match unix_signal(SignalKind::quit()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("failed to install SIGQUIT handler: {}", e);
            return;
        }
    };

    tokio::select! {
        _ = interrupt.recv() => info!("received SIGINT"),
        _ = terminate.recv() => info!("received SIGTERM"),
        _ = quit.recv() => info!("received SIGQUIT"),
        _ = signal.shutdown.cancelled() => return,
    }

    signal.trigger();
}

#[cfg(not(unix))]
async fn wait_for_signals(signal: Arc<StopSignal>) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("failed to install ctrl-c handler: {}", e);
                return;
            }
            info!("received ctrl-c");
        }
        _ = signal.shutdown.cancelled() => return,
    }

    signal.trigger();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler;
    use oxapi_http::protocol::Response;

    #[test]
    fn routes_and_middleware_lock_after_start_flag() {
        let mut server = Server::new();
        server.get("/a", handler::sync(|_| Response::text("a"))).unwrap();

        // simulate the running state without binding a socket
        server.signal.running.store(true, Ordering::Release);

        let err = server.get("/b", handler::sync(|_| Response::text("b"))).unwrap_err();
        assert!(matches!(err, ServerError::ConfigLocked));

        struct Noop;

        #[async_trait::async_trait]
        impl Middleware for Noop {
            async fn handle(
                &self,
                req: Arc<oxapi_http::protocol::Request>,
                next: crate::middleware::Next,
            ) -> crate::middleware::ChainResult {
                next.run(req).await
            }
        }

        let err = server.add_middleware(Noop).unwrap_err();
        assert!(matches!(err, ServerError::ConfigLocked));
    }

    #[test]
    fn duplicate_route_registration_fails_at_add_time() {
        let mut server = Server::new();
        server.get("/dup", handler::sync(|_| Response::text("1"))).unwrap();

        let err = server.get("/dup", handler::sync(|_| Response::text("2"))).unwrap_err();
        assert!(matches!(err, ServerError::Route(RouterError::RouteExists { .. })));
    }

    #[test]
    fn stop_before_start_is_a_no_op() {
        let server = Server::new();
        server.stop();
        server.stop();
    }

    #[test]
    fn start_stop_wait_lifecycle() {
        let mut server = Server::new();
        server.get("/", handler::sync(|_| Response::text("up"))).unwrap();

        let config = ServerConfig {
            // an unprivileged, likely-free port; REUSEADDR keeps reruns happy
            port: "18927".to_string(),
            workers: 2,
            tmp_dir: std::env::temp_dir().join("oxapi-lifecycle-test"),
            ..Default::default()
        };

        match server.start(config) {
            Ok(()) => {
                assert!(server.is_running());
                assert!(server.start(ServerConfig::default()).is_err());

                server.stop();
                server.wait();
                assert!(!server.is_running());
            }
            Err(ServerError::Bind { .. }) => {
                // port collision on a busy machine, the lifecycle logic is
                // covered by the other tests
            }
            Err(e) => panic!("unexpected start failure: {e}"),
        }
    }
}
