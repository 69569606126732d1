use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::core::codec::RequestCodec;
use crate::error::Result;
use crate::protocol::Dispatcher;
use crate::transport::connection::Connection;
use crate::utils::metrics::Metrics;

/// TCP listener plus everything a connection task needs.
pub struct Server {
    listener: TcpListener,
    dispatcher: Dispatcher,
    codec: RequestCodec,
    max_connections: usize,
    read_buffer_capacity: usize,
    shutdown_timeout: Duration,
}

/// Keeps `connections_active` right even when a task is aborted mid-frame.
struct ActiveConnection(Arc<Metrics>);

impl ActiveConnection {
    fn open(metrics: Arc<Metrics>) -> Self {
        metrics.connection_established();
        Self(metrics)
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.0.connection_closed();
    }
}

impl Server {
    /// Bind `host:port`, with the port taken from the port file when present.
    #[instrument(skip_all)]
    pub async fn bind(config: &Config, dispatcher: Dispatcher) -> Result<Self> {
        let address = config.server.bind_address();
        let listener = TcpListener::bind(&address).await?;
        info!(address = %listener.local_addr()?, "Listening");

        Ok(Self {
            listener,
            dispatcher,
            codec: RequestCodec::new(config.transport.max_payload_size),
            max_connections: config.server.max_connections,
            read_buffer_capacity: config.transport.read_buffer_capacity,
            shutdown_timeout: config.server.shutdown_timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        self.dispatcher.metrics()
    }

    /// Serve until CTRL+C.
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received CTRL+C signal, shutting down");
                    let _ = shutdown_tx.send(()).await;
                }
                Err(e) => {
                    // Holding the sender keeps the server running
                    error!(error = %e, "Cannot listen for CTRL+C");
                    std::future::pending::<()>().await;
                }
            }
        });

        self.run_with_shutdown(shutdown_rx).await
    }

    /// Serve until a message arrives on `shutdown_rx` or every sender is dropped.
    ///
    /// On shutdown the listener is closed first, then every open connection is
    /// aborted and awaited for at most the configured shutdown timeout.
    pub async fn run_with_shutdown(self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        let Server {
            listener,
            dispatcher,
            codec,
            max_connections,
            read_buffer_capacity,
            shutdown_timeout,
        } = self;
        let metrics = Arc::clone(dispatcher.metrics());
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(open = connections.len(), "Shutting down server");
                    break;
                }

                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(error = %e, "Connection task panicked");
                        }
                    }
                }

                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            if connections.len() >= max_connections {
                                warn!(%peer, max_connections, "Connection limit reached, closing");
                                metrics.connection_rejected();
                                drop(stream);
                                continue;
                            }

                            if let Err(e) = stream.set_nodelay(true) {
                                warn!(%peer, error = %e, "Failed to set TCP_NODELAY");
                            }

                            let guard = ActiveConnection::open(Arc::clone(&metrics));
                            let connection = Connection::new(
                                stream,
                                peer,
                                dispatcher.clone(),
                                codec,
                                read_buffer_capacity,
                            );
                            connections.spawn(async move {
                                let _guard = guard;
                                connection.run().await;
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Error accepting connection");
                        }
                    }
                }
            }
        }

        drop(listener);
        connections.abort_all();
        let drained = tokio::time::timeout(shutdown_timeout, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("Shutdown timeout reached, forcing exit");
        }

        metrics.log_metrics();
        info!("Server stopped");
        Ok(())
    }
}
