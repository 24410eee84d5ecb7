//! The dispatcher: accept loop, per-connection frame handling, call
//! routing.

use bytes::Bytes;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use wirecall_core::{
    Request, Response, RpcError, Serializer, SerializerRegistry, read_frame, write_frame,
};

use crate::context::CallContext;
use crate::service::ServiceStub;

/// An RPC server: a set of named services and the serializers it accepts.
///
/// Register everything before [`bind`](Server::bind) or
/// [`start`](Server::start); the maps are shared read-only between
/// connection handlers afterwards. JSON is accepted out of the box,
/// protobuf once [`register_serializer`](Server::register_serializer) adds
/// it.
#[derive(Debug)]
pub struct Server {
    services: HashMap<String, ServiceStub>,
    serializers: SerializerRegistry,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    /// Create a server with the JSON serializer pre-registered.
    pub fn new() -> Server {
        let mut serializers = SerializerRegistry::new();
        serializers.register(Serializer::Json);
        Server {
            services: HashMap::new(),
            serializers,
        }
    }

    /// Register a service under its own name.
    pub fn register_service(&mut self, stub: ServiceStub) {
        self.services.insert(stub.name().to_string(), stub);
    }

    /// Accept an additional payload codec.
    pub fn register_serializer(&mut self, serializer: Serializer) {
        self.serializers.register(serializer);
    }

    /// Bind the listener without starting to serve. The bound server
    /// exposes the OS-assigned address, which is what tests binding port 0
    /// need.
    pub async fn bind(self, addr: &str) -> io::Result<BoundServer> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "rpc server listening");
        Ok(BoundServer {
            listener,
            inner: Arc::new(Inner {
                services: self.services,
                serializers: self.serializers,
            }),
        })
    }

    /// Bind and serve until the listener fails.
    pub async fn start(self, addr: &str) -> io::Result<()> {
        self.bind(addr).await?.serve().await
    }
}

/// A server whose listener is bound but whose accept loop the caller
/// drives.
#[derive(Debug)]
pub struct BoundServer {
    listener: TcpListener,
    inner: Arc<Inner>,
}

impl BoundServer {
    /// The address the listener actually bound.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, one task per connection.
    pub async fn serve(self) -> io::Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            spawn_connection(Arc::clone(&self.inner), stream, peer);
        }
    }

    /// Accept connections until `signal` completes, then stop accepting.
    ///
    /// Connections already accepted run to their natural end; pair this
    /// with registry deregistration so new callers stop being routed here
    /// first.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(signal);
        loop {
            tokio::select! {
                _ = &mut signal => {
                    info!("shutdown signal received, closing listener");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    spawn_connection(Arc::clone(&self.inner), stream, peer);
                }
            }
        }
    }
}

fn spawn_connection(inner: Arc<Inner>, stream: TcpStream, peer: SocketAddr) {
    debug!(%peer, "accepted connection");
    tokio::spawn(async move {
        match handle_conn(inner, stream).await {
            // The peer closing between frames is the normal end of a
            // connection.
            Err(RpcError::Truncated) => debug!(%peer, "connection closed"),
            Err(e) => warn!(%peer, error = %e, "connection terminated"),
            Ok(()) => {}
        }
    });
}

async fn handle_conn(inner: Arc<Inner>, mut stream: TcpStream) -> Result<(), RpcError> {
    loop {
        let buf = read_frame(&mut stream).await?;
        // A header that does not decode leaves no request id to correlate
        // an error reply to, so it ends the connection.
        let request = Request::decode(&buf)?;
        let one_way = request.is_one_way();

        let mut response = Response::reply_to(&request);
        match inner.dispatch(&request).await {
            Ok(data) => response.data = data,
            Err(e) => {
                debug!(
                    service = %request.service_name,
                    method = %request.method_name,
                    error = %e,
                    "call failed"
                );
                response.error = Bytes::from(e.to_string());
            }
        }

        if one_way {
            continue;
        }
        response.calculate_head_length();
        response.calculate_body_length();
        write_frame(&mut stream, &response.encode()).await?;
    }
}

#[derive(Debug)]
struct Inner {
    services: HashMap<String, ServiceStub>,
    serializers: SerializerRegistry,
}

impl Inner {
    /// Route one decoded request to its handler. Every failure here is an
    /// application-level error that travels back in `Response.error`.
    async fn dispatch(&self, request: &Request) -> Result<Bytes, RpcError> {
        let serializer = self.serializers.get(request.serializer)?;
        let stub = self
            .services
            .get(&request.service_name)
            .ok_or_else(|| RpcError::UnknownService(request.service_name.clone()))?;
        let cx = CallContext::from_request(request);

        let invoke = stub.invoke(
            cx.clone(),
            serializer,
            &request.method_name,
            request.data.clone(),
        );
        match cx.deadline {
            None => invoke.await,
            Some(at) => {
                let remaining = at
                    .duration_since(SystemTime::now())
                    .unwrap_or(Duration::ZERO);
                if remaining.is_zero() {
                    return Err(RpcError::Cancelled);
                }
                match tokio::time::timeout(remaining, invoke).await {
                    Ok(result) => result,
                    Err(_) => Err(RpcError::Cancelled),
                }
            }
        }
    }
}
