//! Client builder.

use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use wirecall_core::{RpcError, Serializer};

use crate::client::Client;
use crate::pool::{Pool, PoolOptions};

/// Builder for a [`Client`].
///
/// # Example
///
/// ```ignore
/// use wirecall_client::{Client, Serializer};
///
/// let client = Client::builder("127.0.0.1:8081")
///     .use_proto() // JSON is the default
///     .build()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    /// Server address in `host:port` form.
    addr: String,
    /// Payload codec for every call made through this client.
    serializer: Serializer,
    /// Time allowed for one TCP connect.
    dial_timeout: Duration,
    /// Connection pool sizing.
    pool: PoolOptions,
}

impl ClientBuilder {
    /// Create a builder for the given server address.
    pub fn new<S: Into<String>>(addr: S) -> Self {
        Self {
            addr: addr.into(),
            serializer: Serializer::Json,
            dial_timeout: Duration::from_secs(3),
            pool: PoolOptions::default(),
        }
    }

    /// Use the given payload codec.
    pub fn serializer(mut self, serializer: Serializer) -> Self {
        self.serializer = serializer;
        self
    }

    /// Use JSON payload encoding. This is the default.
    pub fn use_json(self) -> Self {
        self.serializer(Serializer::Json)
    }

    /// Use protobuf payload encoding.
    ///
    /// The server must have registered the protobuf codec.
    pub fn use_proto(self) -> Self {
        self.serializer(Serializer::Proto)
    }

    /// Set the TCP connect timeout. Default is 3 seconds.
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Configure the connection pool behind this client.
    pub fn pool_options(mut self, options: PoolOptions) -> Self {
        self.pool = options;
        self
    }

    /// Build the client, eagerly dialing the pool's initial connections.
    pub async fn build(self) -> Result<Client, RpcError> {
        let addr: Arc<str> = Arc::from(self.addr);
        let dial_timeout = self.dial_timeout;
        let factory = move || {
            let addr = Arc::clone(&addr);
            async move {
                match tokio::time::timeout(dial_timeout, TcpStream::connect(addr.as_ref())).await {
                    Ok(result) => result,
                    Err(_) => Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("dialing {addr} timed out"),
                    )),
                }
            }
        };
        let pool = Pool::connect(self.pool, factory).await?;
        Ok(Client::new(pool, self.serializer))
    }
}
