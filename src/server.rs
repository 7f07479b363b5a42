use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};
use tracing_subscriber::EnvFilter;

use crate::codec::{CodecError, FrameCodec};
use crate::commands::Commands;
use crate::config::Config;
use crate::connection::Connection;
use crate::Error;

/// Binds the configured address and serves until Ctrl-C.
pub async fn run(config: Config) -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    let server = Server::new(config.commands()).with_codec(FrameCodec::new(config.max_frame_size));

    server
        .serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for the shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
}

/// Accepts connections and runs one task per connection. Tasks only share the dispatch table,
/// which is never modified once the server is built.
#[derive(Debug)]
pub struct Server {
    commands: Arc<Commands>,
    codec: FrameCodec,
}

impl Server {
    pub fn new(commands: Commands) -> Server {
        Server {
            commands: Arc::new(commands),
            codec: FrameCodec::default(),
        }
    }

    pub fn with_codec(mut self, codec: FrameCodec) -> Server {
        self.codec = codec;
        self
    }

    /// Accepts connections until `shutdown` completes. Connections already accepted keep running
    /// on their own. A failing `accept` ends the loop with that error.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        info!("Redis server listening on {}", listener.local_addr()?);

        tokio::pin!(shutdown);

        loop {
            let (socket, client_address) = tokio::select! {
                res = listener.accept() => res?,
                _ = &mut shutdown => {
                    info!("Shutdown signal received, no longer accepting connections");
                    return Ok(());
                }
            };
            info!("Accepted connection from {:?}", client_address);

            let commands = self.commands.clone();
            let codec = self.codec;
            let span = info_span!("client", address = %client_address);

            tokio::spawn(
                async move {
                    if let Err(e) = handle_connection(socket, commands, codec).await {
                        warn!("Connection closed with error: {}", e);
                    }
                }
                .instrument(span),
            );
        }
    }
}

/// Reads requests from `stream` and writes one reply per request, in order, until the peer
/// disconnects or the stream can no longer be trusted. Any decode or write error closes the
/// connection and is returned.
#[instrument(name = "connection", skip_all, fields(connection_id))]
pub async fn handle_connection<S>(
    stream: S,
    commands: Arc<Commands>,
    codec: FrameCodec,
) -> Result<(), CodecError>
where
    S: AsyncRead + AsyncWrite,
{
    let mut conn = Connection::with_codec(stream, codec);

    tracing::Span::current().record("connection_id", conn.id.to_string());

    while let Some(frame) = conn.read_frame().await? {
        debug!("Received frame from client: {}", frame);
        let res = commands.dispatch(frame);
        debug!("Sending response to client: {}", res);

        conn.write_frame(res).await?;
    }

    info!("Connection closed");
    Ok(())
}
