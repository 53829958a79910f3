use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::codec::LineCodec;
use crate::error::Result;
use crate::flow::State;
use crate::handshake;
use crate::mech::{MechanismFactory, ServerMechanism};
use crate::types::{AuthRequest, Mechanism};

/// Mechanisms offered by a server. Immutable once built, so it can be
/// shared by every connection without locking.
pub struct Registry {
    catalog: HashMap<String, Mechanism>,
    factories: HashMap<String, MechanismFactory>,
}

#[derive(Default)]
pub struct RegistryBuilder {
    catalog: HashMap<String, Mechanism>,
    factories: HashMap<String, MechanismFactory>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// What is announced in `MECH` lines
    pub fn catalog(&self) -> &HashMap<String, Mechanism> {
        &self.catalog
    }

    pub fn get(&self, name: &str) -> Option<&MechanismFactory> {
        self.factories.get(name)
    }
}

impl RegistryBuilder {
    /// Register `name`, replacing any mechanism previously registered under it.
    pub fn mechanism<F>(mut self, name: impl Into<String>, info: Mechanism, factory: F) -> Self
    where
        F: Fn(&AuthRequest) -> Box<dyn ServerMechanism> + Send + Sync + 'static,
    {
        let name = name.into();
        self.catalog.insert(name.clone(), info);
        self.factories.insert(name, Arc::new(factory));
        self
    }

    pub fn build(self) -> Registry {
        Registry {
            catalog: self.catalog,
            factories: self.factories,
        }
    }
}

/// Resolves once `stop` holds `true`, including when it already does.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Where connections come from, a [`TcpListener`] outside of tests.
#[async_trait]
trait Incoming: Send {
    type Conn: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn accept(&mut self) -> io::Result<(Self::Conn, SocketAddr)>;
}

#[async_trait]
impl Incoming for TcpListener {
    type Conn = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

pub struct Server {
    registry: Registry,
    spid: String,
    next_cuid: AtomicU64,
    io_timeout: Option<Duration>,
    stop: watch::Sender<bool>,
}

impl Server {
    pub fn new(registry: Registry) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            registry,
            spid: std::process::id().to_string(),
            next_cuid: AtomicU64::new(1),
            io_timeout: None,
            stop,
        }
    }

    /// Close connections that stay silent for longer than `timeout`.
    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Accept connections until [`Server::close`] is called. Can run on
    /// several listeners at once; each connection gets its own task.
    pub async fn serve(self: Arc<Self>, tcp: TcpListener) -> Result<()> {
        if let Ok(addr) = tcp.local_addr() {
            tracing::info!("SASL Authentication Protocol listening on {:#}", addr);
        }
        self.serve_incoming(tcp).await
    }

    async fn serve_incoming<I: Incoming>(self: Arc<Self>, mut incoming: I) -> Result<()> {
        let mut must_exit = self.stop.subscribe();
        let mut connections = FuturesUnordered::new();

        while !*must_exit.borrow() {
            let wait_conn_finished = async {
                if connections.is_empty() {
                    futures::future::pending().await
                } else {
                    connections.next().await
                }
            };

            let (socket, remote_addr) = tokio::select! {
                a = incoming.accept() => match a {
                    Ok(a) => a,
                    Err(e) => {
                        // Mostly a single aborted connection or a full fd table, keep the listener
                        tracing::error!(err=?e, "AUTH: accept failed, retrying soon");
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                        continue;
                    }
                },
                _ = wait_conn_finished => continue,
                _ = must_exit.changed() => continue,
            };

            tracing::info!("AUTH: accepted connection from {}", remote_addr);
            let server = self.clone();
            let conn = tokio::spawn(async move { server.handle_error(socket).await });

            connections.push(conn);
        }
        drop(incoming);

        tracing::info!("AUTH server shutting down, draining remaining connections...");
        while connections.next().await.is_some() {}

        Ok(())
    }

    /// Stop accepting and end every connection, whatever it is waiting on.
    /// Calling it again has no effect.
    pub fn close(&self) {
        self.stop.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.stop.borrow()
    }

    async fn handle_error<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        match self.handle(stream).await {
            Ok(()) => tracing::info!("Auth session ended"),
            Err(e) if e.is_closed() => {
                tracing::info!("Connection has been closed by the client. Exiting AUTH session.")
            }
            Err(e) => tracing::error!(err=?e, "Auth session failed"),
        }
    }

    /// Run the handshake then serve authentication attempts on `stream`
    /// until the peer leaves, a fatal error occurs, or the server closes.
    pub async fn handle<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut stop = self.stop.subscribe();
        let mut codec = LineCodec::new(stream).with_timeout(self.io_timeout);
        let cuid = self.next_cuid.fetch_add(1, Ordering::Relaxed).to_string();

        tokio::select! {
            res = self.session(&mut codec, &cuid) => res,
            _ = stopped(&mut stop) => {
                tracing::debug!(cuid=%cuid, "Server is stopping, quitting this runner");
                Ok(())
            }
        }
    }

    async fn session<S>(&self, codec: &mut LineCodec<S>, cuid: &str) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        handshake::server(codec, &self.spid, cuid, self.registry.catalog()).await?;

        let mut state = State::new();
        loop {
            let line = codec.read().await?;
            let reply = state.progress(line, &self.registry).await?;
            codec.write(&reply).await?;
        }
    }
}
