//! The generic unary-call primitive.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::net::TcpStream;
use tokio::time::Instant;

use wirecall_core::{
    META_DEADLINE, META_ONE_WAY, PROTOCOL_VERSION, Payload, Request, Response, RpcError,
    Serializer, read_frame, write_frame,
};

use crate::builder::ClientBuilder;
use crate::options::CallOptions;
use crate::pool::{Lease, Pool};

/// An RPC client for one server address.
///
/// Every typed stub (see [`client_stub!`](crate::client_stub)) forwards to
/// [`call_unary`](Client::call_unary), the generic primitive that performs a
/// single round trip: encode, send through a pooled connection, receive,
/// decode. Cloning is cheap and shares the pool.
#[derive(Clone)]
pub struct Client {
    pool: Pool<TcpStream>,
    serializer: Serializer,
    request_id: Arc<AtomicU32>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("serializer", &self.serializer)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a [`ClientBuilder`] for the given server address.
    pub fn builder<S: Into<String>>(addr: S) -> ClientBuilder {
        ClientBuilder::new(addr)
    }

    pub(crate) fn new(pool: Pool<TcpStream>, serializer: Serializer) -> Self {
        Self {
            pool,
            serializer,
            request_id: Arc::new(AtomicU32::new(1)),
        }
    }

    /// The payload codec this client was built with.
    pub fn serializer(&self) -> Serializer {
        self.serializer
    }

    /// Perform one unary call with default options.
    pub async fn call_unary<Req, Res>(
        &self,
        service: &str,
        method: &str,
        req: &Req,
    ) -> Result<Res, RpcError>
    where
        Req: Payload,
        Res: Payload,
    {
        self.call_unary_with_options(service, method, req, CallOptions::new())
            .await
    }

    /// Perform one unary call.
    ///
    /// A remote handler failure comes back as [`RpcError::Handler`] carrying
    /// the server's error text. A one-way call returns `Res::default()` as
    /// soon as the request is written. An empty reply body also decodes to
    /// `Res::default()`, so callers always receive a typed value.
    pub async fn call_unary_with_options<Req, Res>(
        &self,
        service: &str,
        method: &str,
        req: &Req,
        options: CallOptions,
    ) -> Result<Res, RpcError>
    where
        Req: Payload,
        Res: Payload,
    {
        // 1. Encode the argument before touching the network.
        let data = self.serializer.encode(req)?;

        // 2. Assemble metadata. The one-way marker sits alongside the
        //    deadline; both survive.
        let deadline = options.timeout.map(|t| Instant::now() + t);
        let expires = options.timeout.map(|t| SystemTime::now() + t);
        let meta = call_meta(&options, expires);

        // 3. Build and validate the request.
        let mut request = Request {
            request_id: self.request_id.fetch_add(1, Ordering::Relaxed),
            version: PROTOCOL_VERSION,
            compress: 0,
            serializer: self.serializer.code(),
            service_name: service.to_string(),
            method_name: method.to_string(),
            meta,
            data,
            ..Default::default()
        };
        request.validate()?;
        request.calculate_head_length();
        request.calculate_body_length();

        // 4. One round trip (a bare write for one-way calls).
        let response = match self.invoke(&request, deadline).await {
            Ok(response) => response,
            Err(RpcError::Oneway) => return Ok(Res::default()),
            Err(e) => return Err(e),
        };

        // 5. Surface the remote error, or decode the reply.
        if !response.error.is_empty() {
            return Err(RpcError::Handler(
                String::from_utf8_lossy(&response.error).into_owned(),
            ));
        }
        if response.data.is_empty() {
            Ok(Res::default())
        } else {
            self.serializer.decode(&response.data)
        }
    }

    /// Send an already-assembled request and read its reply.
    ///
    /// The whole exchange races `deadline`; expiry yields
    /// [`RpcError::Cancelled`] and the connection is discarded because its
    /// stream position is unknown. A one-way request returns
    /// [`RpcError::Oneway`] right after the write, with the connection
    /// released — it is still clean.
    pub async fn invoke(
        &self,
        request: &Request,
        deadline: Option<Instant>,
    ) -> Result<Response, RpcError> {
        let frame = request.encode();
        let mut lease: Lease<TcpStream> = self.pool.get(deadline).await?;

        let round_trip = async {
            write_frame(&mut *lease, &frame).await?;
            if request.is_one_way() {
                return Err(RpcError::Oneway);
            }
            let buf = read_frame(&mut *lease).await?;
            let response = Response::decode(&buf)?;
            if response.request_id != request.request_id {
                return Err(RpcError::Protocol(format!(
                    "response correlates to request {} but request {} was sent",
                    response.request_id, request.request_id
                )));
            }
            Ok(response)
        };
        let result = match deadline {
            Some(d) => match tokio::time::timeout_at(d, round_trip).await {
                Ok(result) => result,
                Err(_) => Err(RpcError::Cancelled),
            },
            None => round_trip.await,
        };

        match result {
            Ok(response) => {
                lease.release();
                Ok(response)
            }
            Err(RpcError::Oneway) => {
                lease.release();
                Err(RpcError::Oneway)
            }
            // Dropping the lease discards the connection.
            Err(e) => Err(e),
        }
    }
}

fn call_meta(options: &CallOptions, expires: Option<SystemTime>) -> HashMap<String, String> {
    let mut meta = options.meta.clone();
    if let Some(expires) = expires {
        meta.insert(META_DEADLINE.to_string(), unix_millis(expires).to_string());
    }
    if options.one_way {
        meta.insert(META_ONE_WAY.to_string(), "true".to_string());
    }
    meta
}

fn unix_millis(at: SystemTime) -> u128 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_meta_carries_deadline_in_unix_millis() {
        let options = CallOptions::new().timeout(Duration::from_secs(1));
        let expires = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        let meta = call_meta(&options, Some(expires));

        assert_eq!(
            meta.get(META_DEADLINE).map(String::as_str),
            Some("1700000000123")
        );
    }

    #[test]
    fn test_one_way_marker_merges_with_deadline() {
        let options = CallOptions::new()
            .timeout(Duration::from_secs(1))
            .one_way()
            .meta("trace-id", "t-1");
        let expires = UNIX_EPOCH + Duration::from_millis(5_000);
        let meta = call_meta(&options, Some(expires));

        // All three entries coexist; the marker does not replace the map.
        assert_eq!(meta.get(META_ONE_WAY).map(String::as_str), Some("true"));
        assert_eq!(meta.get(META_DEADLINE).map(String::as_str), Some("5000"));
        assert_eq!(meta.get("trace-id").map(String::as_str), Some("t-1"));
    }

    #[test]
    fn test_meta_empty_without_options() {
        let meta = call_meta(&CallOptions::new(), None);
        assert!(meta.is_empty());
    }
}
