//! Per-request server context.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use wirecall_core::Request;

/// What a handler gets to know about the call it is serving: the request
/// correlator, the caller's deadline (if any), the one-way marker, and the
/// full metadata map.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Correlator chosen by the client.
    pub request_id: u32,
    /// Absolute deadline parsed from the `deadline` meta key.
    pub deadline: Option<SystemTime>,
    /// Whether the caller will not read a reply.
    pub one_way: bool,
    /// Caller-supplied metadata.
    pub meta: HashMap<String, String>,
}

impl CallContext {
    /// Extract the context from a decoded request.
    pub fn from_request(req: &Request) -> CallContext {
        CallContext {
            request_id: req.request_id,
            deadline: req
                .deadline_millis()
                .map(|ms| UNIX_EPOCH + Duration::from_millis(ms)),
            one_way: req.is_one_way(),
            meta: req.meta.clone(),
        }
    }

    /// One metadata value by key.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    /// Time left until the deadline. `None` when the caller set no
    /// deadline; `Some(Duration::ZERO)` when it has already passed.
    pub fn time_remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|at| at.duration_since(SystemTime::now()).unwrap_or(Duration::ZERO))
    }
}
