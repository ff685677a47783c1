//! Driving a request-serving loop from another thread.
//!
//! A [`ServerThread`] runs [`HandleRequest::handle_request`] on a background
//! thread, but only as many times as it has been granted permits. Tests use
//! this to serve exactly the requests they send:
//!
//! ```no_run
//! use remotecall::{HttpServer, HttpTransport, NotifyingTransport, ServerConfig, ServiceMapping};
//!
//! let server = HttpServer::bind(&ServerConfig::default(), ServiceMapping::new()).unwrap();
//! let url = server.url("/my/service");
//! let mut thread = server.into_thread();
//! thread.start().unwrap();
//! thread.wait_until_running();
//!
//! // Every request sent through this transport lets one request through.
//! let transport = NotifyingTransport::new(thread.control().clone(), HttpTransport::json(&url).unwrap());
//! # drop(transport);
//! ```

use crate::{
    codec::Codec,
    error::RpcError,
    net::{server::HandleRequest, transport::Transport},
};
use std::{
    io,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    NotStarted,
    /// Running and waiting for a permit.
    Idle,
    /// Inside `handle_request`.
    Serving,
    /// Shut down, but the loop has not noticed yet.
    ShuttingDown,
    Stopped,
}

#[derive(Debug)]
struct LoopState {
    state: ServerState,
    permits: usize,
    started: bool,
    serving: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<LoopState>,
    wake: Condvar,
}

/// Cloneable handle on a serving loop.
#[derive(Debug, Clone)]
pub struct ServerControl {
    shared: Arc<Shared>,
}

impl ServerControl {
    fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(LoopState {
                    state: ServerState::NotStarted,
                    permits: 0,
                    started: false,
                    serving: true,
                }),
                wake: Condvar::new(),
            }),
        }
    }

    fn locked(&self) -> MutexGuard<'_, LoopState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Lets the loop serve `count` more requests. Grants add up, and a grant
    /// made before the loop starts is kept for it. Ignored after shutdown.
    pub fn grant_permits(&self, count: usize) {
        let mut state = self.locked();
        if !state.serving {
            debug!(count, "permits granted after shutdown are dropped");
            return;
        }
        state.permits = state.permits.saturating_add(count);
        self.shared.wake.notify_all();
    }

    /// Stops the loop after the request in progress, if any. Outstanding
    /// permits are discarded.
    pub fn shutdown(&self) {
        let mut state = self.locked();
        state.serving = false;
        state.permits = 0;
        if state.state != ServerState::Stopped {
            state.state = ServerState::ShuttingDown;
        }
        self.shared.wake.notify_all();
    }

    /// Blocks until the loop has started.
    pub fn wait_until_running(&self) {
        let state = self.locked();
        let _started = self
            .shared
            .wake
            .wait_while(state, |state| !state.started)
            .unwrap_or_else(PoisonError::into_inner);
    }

    pub fn state(&self) -> ServerState {
        self.locked().state
    }

    pub fn pending_permits(&self) -> usize {
        self.locked().permits
    }

    fn run<S: HandleRequest>(&self, server: &mut S) {
        let mut state = self.locked();
        state.started = true;
        if state.serving {
            state.state = ServerState::Idle;
        }
        self.shared.wake.notify_all();
        info!("server loop started");

        while state.serving {
            if state.permits == 0 {
                state = self
                    .shared
                    .wake
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
                continue;
            }
            state.permits -= 1;
            state.state = ServerState::Serving;
            drop(state);

            if let Err(err) = server.handle_request() {
                warn!("handling request: {err}");
            }

            state = self.locked();
            if state.serving {
                state.state = ServerState::Idle;
            }
        }

        state.state = ServerState::Stopped;
        self.shared.wake.notify_all();
        info!("server loop stopped");
    }
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("server thread was already started")]
    AlreadyStarted,

    #[error("server thread was never started")]
    NotStarted,

    #[error("spawning server thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("server thread panicked")]
    Panicked,
}

/// Owns a server and the background thread that serves it.
///
/// Dropping a started `ServerThread` shuts the loop down without waiting
/// for it.
pub struct ServerThread<S: HandleRequest> {
    control: ServerControl,
    name: String,
    server: Option<S>,
    handle: Option<JoinHandle<S>>,
}

impl<S: HandleRequest> ServerThread<S> {
    pub fn new(server: S) -> Self {
        Self::with_name(server, "remotecall-server")
    }

    pub fn with_name(server: S, name: impl Into<String>) -> Self {
        Self {
            control: ServerControl::new(),
            name: name.into(),
            server: Some(server),
            handle: None,
        }
    }

    pub fn control(&self) -> &ServerControl {
        &self.control
    }

    /// The server, until it is handed to the background thread.
    pub fn server(&self) -> Option<&S> {
        self.server.as_ref()
    }

    pub fn start(&mut self) -> Result<(), ControllerError> {
        let mut server = self.server.take().ok_or(ControllerError::AlreadyStarted)?;
        let control = self.control.clone();
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                control.run(&mut server);
                server
            })
            .map_err(ControllerError::Spawn)?;
        self.handle = Some(handle);
        Ok(())
    }

    pub fn grant_permits(&self, count: usize) {
        self.control.grant_permits(count);
    }

    pub fn shutdown(&self) {
        self.control.shutdown();
    }

    pub fn wait_until_running(&self) {
        self.control.wait_until_running();
    }

    pub fn state(&self) -> ServerState {
        self.control.state()
    }

    /// Waits for the loop to finish and hands the server back. Only returns
    /// once the loop has been shut down.
    pub fn join(mut self) -> Result<S, ControllerError> {
        let handle = self.handle.take().ok_or(ControllerError::NotStarted)?;
        handle.join().map_err(|_| ControllerError::Panicked)
    }

    /// [`shutdown`](Self::shutdown) followed by [`join`](Self::join).
    pub fn stop(self) -> Result<S, ControllerError> {
        self.shutdown();
        self.join()
    }
}

impl<S: HandleRequest> Drop for ServerThread<S> {
    fn drop(&mut self) {
        if self.handle.take().is_some() {
            self.control.shutdown();
        }
    }
}

/// A transport that grants its server thread one permit before each send.
#[derive(Debug)]
pub struct NotifyingTransport<T> {
    control: ServerControl,
    inner: T,
}

impl<T: Transport> NotifyingTransport<T> {
    pub fn new(control: ServerControl, inner: T) -> Self {
        Self { control, inner }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: Transport> Transport for NotifyingTransport<T> {
    fn codec(&self) -> &dyn Codec {
        self.inner.codec()
    }

    fn send(&self, method_name: &str, encoded_request: Vec<u8>) -> Result<Vec<u8>, RpcError> {
        self.control.grant_permits(1);
        self.inner.send(method_name, encoded_request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codec::JsonCodec, net::server::ServerError};
    use std::{
        sync::mpsc::{self, Receiver, Sender},
        time::{Duration, Instant},
    };

    const PATIENCE: Duration = Duration::from_secs(5);

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("remotecall=debug")
            .with_test_writer()
            .try_init();
    }

    /// Counts requests, optionally waiting on a gate before each one.
    struct FakeServer {
        handled: usize,
        notify: Sender<usize>,
        gate: Option<Receiver<()>>,
        fail: bool,
    }

    impl FakeServer {
        fn new() -> (Self, Receiver<usize>) {
            let (notify, handled) = mpsc::channel();
            let server = Self {
                handled: 0,
                notify,
                gate: None,
                fail: false,
            };
            (server, handled)
        }
    }

    impl HandleRequest for FakeServer {
        fn handle_request(&mut self) -> Result<(), ServerError> {
            if let Some(gate) = &self.gate {
                let _ = gate.recv();
            }
            self.handled += 1;
            let _ = self.notify.send(self.handled);
            if self.fail {
                return Err(ServerError::Accept(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset",
                )));
            }
            Ok(())
        }
    }

    fn wait_for_state(control: &ServerControl, expected: ServerState) {
        let deadline = Instant::now() + PATIENCE;
        while control.state() != expected {
            assert!(Instant::now() < deadline, "stuck in {:?}", control.state());
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn assert_quiet(handled: &Receiver<usize>) {
        assert!(handled.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn grants_made_before_start_are_honored() {
        init_tracing();
        let (server, handled) = FakeServer::new();
        let mut thread = ServerThread::new(server);
        assert_eq!(thread.state(), ServerState::NotStarted);
        thread.grant_permits(2);

        thread.start().unwrap();
        thread.wait_until_running();
        assert_eq!(handled.recv_timeout(PATIENCE), Ok(1));
        assert_eq!(handled.recv_timeout(PATIENCE), Ok(2));
        assert_quiet(&handled);

        assert_eq!(thread.stop().unwrap().handled, 2);
    }

    #[test]
    fn grants_are_cumulative() {
        init_tracing();
        let (server, handled) = FakeServer::new();
        let mut thread = ServerThread::new(server);
        thread.start().unwrap();
        thread.wait_until_running();

        thread.grant_permits(1);
        thread.grant_permits(2);
        for expected in 1..=3 {
            assert_eq!(handled.recv_timeout(PATIENCE), Ok(expected));
        }
        assert_quiet(&handled);
        wait_for_state(thread.control(), ServerState::Idle);
        assert_eq!(thread.control().pending_permits(), 0);
        thread.shutdown();
    }

    #[test]
    fn shutdown_discards_outstanding_permits() {
        init_tracing();
        let (mut server, handled) = FakeServer::new();
        let (open_gate, gate) = mpsc::channel();
        server.gate = Some(gate);
        let mut thread = ServerThread::new(server);
        thread.start().unwrap();
        thread.grant_permits(3);

        wait_for_state(thread.control(), ServerState::Serving);
        thread.shutdown();
        assert_eq!(thread.state(), ServerState::ShuttingDown);
        assert_eq!(thread.control().pending_permits(), 0);
        thread.grant_permits(1);
        assert_eq!(thread.control().pending_permits(), 0);

        for _ in 0..3 {
            let _ = open_gate.send(());
        }
        assert_eq!(handled.recv_timeout(PATIENCE), Ok(1));
        let control = thread.control().clone();
        assert_eq!(thread.join().unwrap().handled, 1);
        assert_eq!(control.state(), ServerState::Stopped);
    }

    #[test]
    fn failing_requests_do_not_stop_the_loop() {
        init_tracing();
        let (mut server, handled) = FakeServer::new();
        server.fail = true;
        let mut thread = ServerThread::new(server);
        thread.start().unwrap();
        thread.grant_permits(2);

        assert_eq!(handled.recv_timeout(PATIENCE), Ok(1));
        assert_eq!(handled.recv_timeout(PATIENCE), Ok(2));
        wait_for_state(thread.control(), ServerState::Idle);
        assert_eq!(thread.stop().unwrap().handled, 2);
    }

    #[test]
    fn threads_start_once() {
        let (server, _handled) = FakeServer::new();
        let mut thread = ServerThread::with_name(server, "once");
        assert!(thread.server().is_some());
        thread.start().unwrap();
        assert!(thread.server().is_none());
        assert!(matches!(thread.start(), Err(ControllerError::AlreadyStarted)));
        thread.shutdown();
    }

    #[test]
    fn unstarted_threads_cannot_be_joined() {
        let (server, _handled) = FakeServer::new();
        assert!(matches!(
            ServerThread::new(server).join(),
            Err(ControllerError::NotStarted)
        ));
    }

    #[test]
    fn dropping_a_started_thread_stops_it() {
        let (server, _handled) = FakeServer::new();
        let mut thread = ServerThread::new(server);
        thread.start().unwrap();
        thread.wait_until_running();
        let control = thread.control().clone();
        drop(thread);
        wait_for_state(&control, ServerState::Stopped);
    }

    /// Echoes every request back.
    struct Echo;

    impl Transport for Echo {
        fn codec(&self) -> &dyn Codec {
            &JsonCodec
        }

        fn send(&self, _method_name: &str, encoded_request: Vec<u8>) -> Result<Vec<u8>, RpcError> {
            Ok(encoded_request)
        }
    }

    #[test]
    fn notifying_transport_grants_one_permit_per_send() {
        let (server, _handled) = FakeServer::new();
        let thread = ServerThread::new(server);
        let transport = NotifyingTransport::new(thread.control().clone(), Echo);

        assert_eq!(transport.send("a", b"1".to_vec()).unwrap(), b"1");
        assert_eq!(transport.send("b", b"2".to_vec()).unwrap(), b"2");
        assert_eq!(thread.control().pending_permits(), 2);
        assert_eq!(transport.codec().content_type(), "application/json");
    }
}
