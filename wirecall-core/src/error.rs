//! Error types shared across the framework.

/// Errors produced anywhere in the call path: framing, codecs, dispatch,
/// the connection pool, and the request lifecycle.
///
/// Application-level failures (unknown service or method, codec failures on
/// the server, handler errors) travel back to the caller inside
/// `Response.error`, so the connection stays reusable. Transport-level
/// failures ([`Transport`](RpcError::Transport), [`Truncated`](RpcError::Truncated))
/// terminate the one connection they occurred on.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RpcError {
    /// The caller handed the client something that cannot go on the wire
    /// (empty names, sentinel bytes inside header fields).
    #[error("invalid call: {0}")]
    InvalidInput(String),

    /// Payload encoding failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// Payload decoding failed.
    #[error("decode error: {0}")]
    Decode(String),

    /// Malformed frame or header (bad lengths, missing delimiters,
    /// non-UTF-8 text fields).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No service registered under the requested name. Reported on the
    /// wire with the same text as a method miss, so callers cannot tell
    /// which half of the `service.Method` address failed to resolve; the
    /// variant still carries the service name for local inspection.
    #[error("rpc: method does not exist")]
    UnknownService(String),

    /// The service exists but has no method under the requested name.
    #[error("rpc: method {0} does not exist")]
    UnknownMethod(String),

    /// The request named a serializer code the receiver has not registered.
    #[error("rpc: serializer code {0} is not registered")]
    UnknownSerializer(u8),

    /// Network I/O failure. The connection it happened on is unusable.
    #[error("transport error: {0}")]
    Transport(String),

    /// The stream closed in the middle of a frame.
    #[error("transport error: connection closed mid-frame")]
    Truncated,

    /// The call's deadline expired or its caller gave up waiting.
    #[error("rpc: deadline exceeded or call cancelled")]
    Cancelled,

    /// Internal marker: a one-way call wrote its request and has no reply
    /// to read. The client proxy translates this into a successful return;
    /// callers never observe it.
    #[error("rpc: one-way call carries no reply")]
    Oneway,

    /// An error raised by the remote handler (or by a local handler, on the
    /// server side). The message is exactly what travelled in
    /// `Response.error`.
    #[error("{0}")]
    Handler(String),
}

impl RpcError {
    /// Create a handler error from any displayable value.
    ///
    /// This is the constructor service methods use to fail a call:
    ///
    /// ```ignore
    /// return Err(RpcError::handler("user not found"));
    /// ```
    pub fn handler<S: Into<String>>(message: S) -> Self {
        RpcError::Handler(message.into())
    }

    /// Create a transport error from any displayable value.
    pub fn transport<S: Into<String>>(message: S) -> Self {
        RpcError::Transport(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_error_displays_bare_message() {
        let err = RpcError::handler("boom");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_unknown_method_message() {
        let err = RpcError::UnknownMethod("Nope".to_string());
        assert_eq!(err.to_string(), "rpc: method Nope does not exist");
    }

    #[test]
    fn test_unknown_service_reports_the_method_miss_text() {
        let err = RpcError::UnknownService("ghost-service".to_string());
        assert_eq!(err.to_string(), "rpc: method does not exist");
    }

    #[test]
    fn test_unknown_serializer_carries_code() {
        let err = RpcError::UnknownSerializer(7);
        assert!(err.to_string().contains('7'));
    }
}
