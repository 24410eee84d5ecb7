//! wirecall RPC server.
//!
//! Services are registered as [`ServiceStub`]s — a method table keyed by
//! wire-method name — and dispatched by the [`Server`], which reads framed
//! requests off each accepted connection, invokes the addressed handler,
//! and writes framed replies.
//!
//! ```ignore
//! use wirecall_server::{RpcError, Server, ServiceStub};
//!
//! let users = ServiceStub::new("user-service").method(
//!     "GetById",
//!     |_cx, req: GetByIdReq| async move {
//!         Ok(GetByIdResp { msg: format!("user {}", req.id) })
//!     },
//! );
//!
//! let mut server = Server::new();
//! server.register_service(users);
//! server.start("127.0.0.1:8081").await?;
//! ```

mod context;
mod server;
mod service;

pub use context::CallContext;
pub use server::{BoundServer, Server};
pub use service::ServiceStub;

// Re-exported so handler code needs only this crate.
pub use wirecall_core::{Payload, RpcError, Serializer};
