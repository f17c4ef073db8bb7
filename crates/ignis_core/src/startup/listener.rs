//! Network listener collaborator and its callback-to-future adapter.

use crate::startup::error::{StartupError, StartupResult};
use futures::channel::oneshot;
use log::{error, info};
use parking_lot::Mutex;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

/// Completion callback handed to [`Listener::listen`].
pub type BindCallback = Box<dyn FnOnce(io::Result<()>) + Send>;

/// Root handle passed to every startup action.
pub type RootHandle = Arc<dyn Listener>;

/// Anything that can bind a port and report completion through a callback.
pub trait Listener: Send + Sync {
    fn listen(&self, port: u16, done: BindCallback);
}

/// Default root: binds TCP listeners and keeps them open.
pub struct TcpRoot {
    host: String,
    bound: Mutex<Vec<TcpListener>>,
}

impl Default for TcpRoot {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpRoot {
    /// Binds on every interface.
    pub fn new() -> Self {
        Self::with_host("0.0.0.0")
    }

    pub fn with_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            bound: Mutex::new(Vec::new()),
        }
    }

    /// Addresses of the listeners bound so far.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.bound
            .lock()
            .iter()
            .filter_map(|listener| listener.local_addr().ok())
            .collect()
    }
}

impl Listener for TcpRoot {
    fn listen(&self, port: u16, done: BindCallback) {
        let outcome = TcpListener::bind((self.host.as_str(), port)).map(|listener| {
            self.bound.lock().push(listener);
        });
        done(outcome)
    }
}

/// Asks `root` to bind `port` and waits for its completion callback.
pub async fn bind(root: RootHandle, port: u16) -> StartupResult {
    let (tx, rx) = oneshot::channel();
    root.listen(
        port,
        Box::new(move |outcome| {
            // Only the first report counts.
            let _ = tx.send(outcome);
        }),
    );

    let outcome = match rx.await {
        Ok(outcome) => outcome,
        Err(_) => Err(io::Error::other("listener dropped the bind callback")),
    };

    match outcome {
        Ok(()) => {
            info!("event=listen module=startup status=ok port={}", port);
            Ok(())
        }
        Err(err) => {
            error!(
                "event=listen module=startup status=error port={} error={}",
                port, err
            );
            Err(StartupError::Bind {
                port,
                source: Arc::new(err),
            })
        }
    }
}
