use bytes::{BufMut, Bytes, BytesMut};

use crate::error::RpcError;
use crate::message::{FIXED_HEADER_LEN, Request};

/// One RPC response as it travels on the wire.
///
/// The correlating fields (`request_id`, `version`, `compress`,
/// `serializer`) are copied from the request; [`reply_to`](Response::reply_to)
/// builds a response with them already echoed. The error text lives in the
/// header (its presence is what makes `head_length` exceed the fixed part),
/// the payload in the body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// Total header size in bytes, including the length prefix itself.
    pub head_length: u32,
    /// Size of the payload in bytes.
    pub body_length: u32,
    /// Correlator echoed from the request.
    pub request_id: u32,
    /// Protocol version echoed from the request.
    pub version: u8,
    /// Reserved compression byte echoed from the request.
    pub compress: u8,
    /// Codec code echoed from the request.
    pub serializer: u8,
    /// UTF-8 error text. Empty means the call succeeded.
    pub error: Bytes,
    /// Encoded reply payload.
    pub data: Bytes,
}

impl Response {
    /// Build an empty response that echoes the request's correlating fields.
    pub fn reply_to(req: &Request) -> Response {
        Response {
            request_id: req.request_id,
            version: req.version,
            compress: req.compress,
            serializer: req.serializer,
            ..Default::default()
        }
    }

    /// Recompute `head_length` from the error text.
    pub fn calculate_head_length(&mut self) {
        self.head_length = (FIXED_HEADER_LEN + self.error.len()) as u32;
    }

    /// Recompute `body_length` from the payload.
    pub fn calculate_body_length(&mut self) {
        self.body_length = self.data.len() as u32;
    }

    /// Serialize the response into one contiguous frame. The length fields
    /// must be current.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.head_length as usize + self.body_length as usize);
        buf.put_u32(self.head_length);
        buf.put_u32(self.body_length);
        buf.put_u32(self.request_id);
        buf.put_u8(self.version);
        buf.put_u8(self.compress);
        buf.put_u8(self.serializer);
        buf.put_slice(&self.error);
        buf.put_slice(&self.data);
        buf.freeze()
    }

    /// Parse a response out of one full frame. Never panics on malformed
    /// input.
    pub fn decode(buf: &[u8]) -> Result<Response, RpcError> {
        if buf.len() < FIXED_HEADER_LEN {
            return Err(RpcError::Protocol(format!(
                "response of {} bytes is shorter than the fixed header",
                buf.len()
            )));
        }
        let head_length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let body_length = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let head = head_length as usize;
        let body = body_length as usize;
        if head < FIXED_HEADER_LEN || head > buf.len() {
            return Err(RpcError::Protocol(format!(
                "head length {head} out of range for a {} byte frame",
                buf.len()
            )));
        }
        if buf.len() < head + body {
            return Err(RpcError::Protocol(format!(
                "frame of {} bytes is shorter than the declared {} header + {} body",
                buf.len(),
                head,
                body
            )));
        }

        let error = if head > FIXED_HEADER_LEN {
            Bytes::copy_from_slice(&buf[FIXED_HEADER_LEN..head])
        } else {
            Bytes::new()
        };
        let data = if body == 0 {
            Bytes::new()
        } else {
            Bytes::copy_from_slice(&buf[head..head + body])
        };

        Ok(Response {
            head_length,
            body_length,
            request_id: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            version: buf[12],
            compress: buf[13],
            serializer: buf[14],
            error,
            data,
        })
    }
}
