//! TCP accept loop.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::registry::Registry;
use crate::transport::tcp::TcpTransport;

/// How long connection workers get to flush their final messages.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub struct Server {
    listener: TcpListener,
    registry: Arc<Registry>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&config.bind).await?;
        tracing::info!(addr = %listener.local_addr()?, "listening");
        Ok(Self {
            listener,
            registry: Registry::new(config),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub async fn run(self) -> anyhow::Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` completes, then notify every
    /// client with `ServerClosed` and wait briefly for workers to finish.
    pub async fn run_until<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let write_timeout = self.registry.config().write_timeout;
        let mut workers = JoinSet::new();
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(%addr, error = %e, "set_nodelay failed");
                    }
                    let (tx, rx) = mpsc::unbounded_channel();
                    let Some(player) = self.registry.register(tx).await else {
                        continue;
                    };
                    tracing::debug!(%addr, %player, "accepted connection");
                    let transport = Box::new(TcpTransport::with_timeout(stream, write_timeout));
                    let conn = Connection::new(player, transport, rx, self.registry());
                    workers.spawn(conn.run());
                }
                Some(done) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(e) = done {
                        tracing::error!(error = %e, "connection worker panicked");
                    }
                }
            }
        }

        tracing::info!("shutting down");
        drop(self.listener);
        self.registry.shutdown().await;
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while workers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(remaining = workers.len(), "aborting lingering connections");
            workers.abort_all();
        }
        Ok(())
    }
}
