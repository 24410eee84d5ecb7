//! wirecall RPC client.
//!
//! The client side of the framework:
//!
//! - [`Client`]: the generic unary-call primitive every typed stub forwards
//!   to
//! - [`client_stub!`]: synthesizes a typed client struct for one service
//! - [`CallOptions`]: per-call deadline, one-way marker, and custom metadata
//! - [`Pool`]: the bounded connection pool behind every client
//!
//! ```ignore
//! let client = Client::builder("127.0.0.1:8081").build().await?;
//!
//! wirecall_client::client_stub! {
//!     pub struct UserServiceClient {
//!         service = "user-service";
//!         rpc get_by_id("GetById"): GetByIdReq => GetByIdResp;
//!     }
//! }
//!
//! let users = UserServiceClient::new(client);
//! let resp = users.get_by_id(&GetByIdReq { id: 1 }).await?;
//! ```

mod builder;
mod client;
mod options;
mod pool;
mod stub;

pub use builder::ClientBuilder;
pub use client::Client;
pub use options::CallOptions;
pub use pool::{Lease, Pool, PoolError, PoolOptions};

// Re-exported so generated stubs and call sites need only this crate.
pub use wirecall_core::{Payload, RpcError, Serializer};
