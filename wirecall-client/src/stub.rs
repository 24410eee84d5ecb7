//! Typed stub synthesis.
//!
//! [`client_stub!`](crate::client_stub) declares a client struct whose
//! methods each perform one RPC, forwarding to
//! [`Client::call_unary`](crate::Client::call_unary) with the declared
//! service and wire-method names. The declaration names the Rust method,
//! the method name as it appears on the wire, and the request and response
//! payload types:
//!
//! ```ignore
//! wirecall_client::client_stub! {
//!     /// Typed client for the user service.
//!     pub struct UserServiceClient {
//!         service = "user-service";
//!         rpc get_by_id("GetById"): GetByIdReq => GetByIdResp;
//!         rpc delete_by_id("DeleteById"): DeleteByIdReq => DeleteByIdResp;
//!     }
//! }
//! ```
//!
//! Calls needing per-call options (deadline, one-way, metadata) go through
//! the inner client: `stub.client().call_unary_with_options(...)` with
//! `StubType::SERVICE` and the wire-method name.

/// Declare a typed client for one service.
#[macro_export]
macro_rules! client_stub {
    (
        $(#[$attr:meta])*
        $vis:vis struct $name:ident {
            service = $service:literal;
            $( rpc $method:ident($wire:literal): $req:ty => $res:ty; )*
        }
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone)]
        $vis struct $name {
            client: $crate::Client,
        }

        impl $name {
            /// Service name used on the wire.
            pub const SERVICE: &'static str = $service;

            /// Wrap a connected client.
            $vis fn new(client: $crate::Client) -> Self {
                Self { client }
            }

            /// The underlying generic client, for calls that need
            /// per-call options.
            $vis fn client(&self) -> &$crate::Client {
                &self.client
            }

            $(
                $vis async fn $method(
                    &self,
                    req: &$req,
                ) -> ::std::result::Result<$res, $crate::RpcError> {
                    self.client.call_unary(Self::SERVICE, $wire, req).await
                }
            )*
        }
    };
}
