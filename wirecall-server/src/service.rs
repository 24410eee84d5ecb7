//! Service stubs: the name-addressed method tables the server dispatches
//! into.

use bytes::Bytes;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use wirecall_core::{Payload, RpcError, Serializer};

use crate::context::CallContext;

type BoxedMethod =
    Box<dyn Fn(CallContext, Serializer, Bytes) -> BoxFuture<'static, Result<Bytes, RpcError>> + Send + Sync>;

/// One registered service: a name and its invocable methods.
///
/// Each [`method`](ServiceStub::method) registration wraps a typed handler
/// in an adapter that decodes the argument with whichever serializer the
/// request named, invokes the handler, and encodes the reply with the same
/// serializer. Dispatch is by wire-method name.
pub struct ServiceStub {
    name: String,
    methods: HashMap<String, BoxedMethod>,
}

impl std::fmt::Debug for ServiceStub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceStub")
            .field("name", &self.name)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ServiceStub {
    /// Create an empty stub for the given service name.
    pub fn new<S: Into<String>>(name: S) -> ServiceStub {
        ServiceStub {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    /// The service name clients address.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register one method under its wire name.
    ///
    /// The handler receives the call's [`CallContext`] and decoded request
    /// and returns its reply or an error; a returned error travels to the
    /// caller in `Response.error`.
    pub fn method<Req, Res, H, Fut>(mut self, name: &str, handler: H) -> ServiceStub
    where
        Req: Payload,
        Res: Payload,
        H: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Res, RpcError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.methods.insert(
            name.to_string(),
            Box::new(
                move |cx, serializer, data| -> BoxFuture<'static, Result<Bytes, RpcError>> {
                    let handler = Arc::clone(&handler);
                    Box::pin(async move {
                        let req: Req = serializer.decode(&data)?;
                        let res = (*handler)(cx, req).await?;
                        serializer.encode(&res)
                    })
                },
            ),
        );
        self
    }

    /// Invoke one method by wire name.
    pub(crate) async fn invoke(
        &self,
        cx: CallContext,
        serializer: Serializer,
        method: &str,
        data: Bytes,
    ) -> Result<Bytes, RpcError> {
        let Some(call) = self.methods.get(method) else {
            return Err(RpcError::UnknownMethod(method.to_string()));
        };
        call(cx, serializer, data).await
    }
}
