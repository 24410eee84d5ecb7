//! Per-call configuration.

use std::collections::HashMap;
use std::time::Duration;

/// Options for one RPC call: deadline, one-way marker, custom metadata.
///
/// # Example
///
/// ```ignore
/// use wirecall_client::CallOptions;
/// use std::time::Duration;
///
/// let options = CallOptions::new()
///     .timeout(Duration::from_secs(5))
///     .meta("trace-id", "abc-123");
///
/// let resp = client
///     .call_unary_with_options::<Req, Res>("user-service", "GetById", &req, options)
///     .await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Deadline for this call, relative to its start. Propagated to the
    /// server as the `deadline` meta key and enforced locally.
    pub(crate) timeout: Option<Duration>,
    /// Fire-and-forget: the request is written, no reply is read, the
    /// server writes none.
    pub(crate) one_way: bool,
    /// Caller-supplied metadata carried in the request header. Keys and
    /// values must not contain `\r` or `\n`.
    pub(crate) meta: HashMap<String, String>,
}

impl CallOptions {
    /// Create default call options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the deadline for this call.
    ///
    /// The absolute expiry instant travels to the server in the `deadline`
    /// meta key (decimal unix milliseconds), and the client enforces it
    /// locally: pool acquisition, the write, and the reply read all race
    /// it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Mark this call fire-and-forget.
    ///
    /// The client writes the request and returns the response type's
    /// default value without reading a reply; the server processes the
    /// call for its side effects and writes nothing back.
    pub fn one_way(mut self) -> Self {
        self.one_way = true;
        self
    }

    /// Add one metadata entry for this call.
    ///
    /// The `deadline` and `one-way` keys are reserved for the framework;
    /// entries under those names are overwritten by the call pipeline.
    pub fn meta<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Get the configured timeout, if any.
    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether this call is marked one-way.
    pub fn is_one_way(&self) -> bool {
        self.one_way
    }

    /// Get the caller-supplied metadata.
    pub fn get_meta(&self) -> &HashMap<String, String> {
        &self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = CallOptions::new();
        assert!(options.get_timeout().is_none());
        assert!(!options.is_one_way());
        assert!(options.get_meta().is_empty());
    }

    #[test]
    fn test_combined_options() {
        let options = CallOptions::new()
            .timeout(Duration::from_secs(30))
            .one_way()
            .meta("trace-id", "abc-123");

        assert_eq!(options.get_timeout(), Some(Duration::from_secs(30)));
        assert!(options.is_one_way());
        assert_eq!(
            options.get_meta().get("trace-id").map(String::as_str),
            Some("abc-123")
        );
    }
}
