//! The request and response wire records.
//!
//! Both records share a fixed 15-byte header:
//!
//! ```text
//! offset  0  head length (u32 be, includes itself)
//! offset  4  body length (u32 be)
//! offset  8  request id  (u32 be)
//! offset 12  version     (u8)
//! offset 13  compress    (u8, reserved — always zero)
//! offset 14  serializer  (u8, codec code)
//! ```
//!
//! The request header continues with the service name and method name, each
//! terminated by `\n`, followed by metadata pairs encoded `key \r value \n`.
//! The response header continues with the UTF-8 error text, present iff the
//! head length exceeds the fixed part. The body is an opaque, length-
//! delimited byte string in both directions — it may contain any byte,
//! including the sentinel values.

mod request;
mod response;

pub use request::Request;
pub use response::Response;

/// Size of the fixed portion of both headers.
pub const FIXED_HEADER_LEN: usize = 15;

/// Wire protocol version written into every request.
pub const PROTOCOL_VERSION: u8 = 1;

/// Meta key carrying the call deadline as decimal unix milliseconds.
pub const META_DEADLINE: &str = "deadline";

/// Meta key marking a fire-and-forget call. The value is `"true"`; the
/// server processes the call and writes no reply.
pub const META_ONE_WAY: &str = "one-way";

pub(crate) fn find(haystack: &[u8], needle: u8) -> Option<usize> {
    haystack.iter().position(|&b| b == needle)
}
