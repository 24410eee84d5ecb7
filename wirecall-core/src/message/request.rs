use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;

use crate::error::RpcError;
use crate::message::{FIXED_HEADER_LEN, META_DEADLINE, META_ONE_WAY, find};

/// One RPC request as it travels on the wire.
///
/// `head_length` and `body_length` are derived fields; call
/// [`calculate_head_length`](Request::calculate_head_length) and
/// [`calculate_body_length`](Request::calculate_body_length) after filling
/// the record and before [`encode`](Request::encode).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    /// Total header size in bytes, including the length prefix itself.
    pub head_length: u32,
    /// Size of the payload in bytes.
    pub body_length: u32,
    /// Opaque correlator chosen by the client and echoed by the server.
    pub request_id: u32,
    /// Protocol version.
    pub version: u8,
    /// Reserved compression byte. Zero means no compression.
    pub compress: u8,
    /// Codec code; must match a serializer registered on the server.
    pub serializer: u8,
    /// Target service. Must not contain `\n`.
    pub service_name: String,
    /// Target method. Must not contain `\n`.
    pub method_name: String,
    /// Cross-cutting metadata (deadline, one-way marker, trace ids).
    /// Keys and values must not contain `\r` or `\n`.
    pub meta: HashMap<String, String>,
    /// Opaque payload. May contain any bytes — it is length-delimited.
    pub data: Bytes,
}

impl Request {
    /// Recompute `head_length` from the variable header fields.
    pub fn calculate_head_length(&mut self) {
        let mut head = FIXED_HEADER_LEN + self.service_name.len() + 1 + self.method_name.len() + 1;
        for (key, value) in &self.meta {
            head += key.len() + 1 + value.len() + 1;
        }
        self.head_length = head as u32;
    }

    /// Recompute `body_length` from the payload.
    pub fn calculate_body_length(&mut self) {
        self.body_length = self.data.len() as u32;
    }

    /// Check that the text fields are representable on the wire.
    ///
    /// The header is sentinel-delimited, so the service and method names
    /// must be non-empty and newline-free, and meta keys and values must
    /// contain neither `\r` nor `\n`. The payload is exempt — it is
    /// length-delimited.
    pub fn validate(&self) -> Result<(), RpcError> {
        if self.service_name.is_empty() {
            return Err(RpcError::InvalidInput("service name is empty".to_string()));
        }
        if self.service_name.contains('\n') {
            return Err(RpcError::InvalidInput(format!(
                "service name {:?} contains a newline",
                self.service_name
            )));
        }
        if self.method_name.is_empty() {
            return Err(RpcError::InvalidInput("method name is empty".to_string()));
        }
        if self.method_name.contains('\n') {
            return Err(RpcError::InvalidInput(format!(
                "method name {:?} contains a newline",
                self.method_name
            )));
        }
        for (key, value) in &self.meta {
            if key.contains('\r') || key.contains('\n') {
                return Err(RpcError::InvalidInput(format!(
                    "meta key {key:?} contains a separator byte"
                )));
            }
            if value.contains('\r') || value.contains('\n') {
                return Err(RpcError::InvalidInput(format!(
                    "meta value for {key:?} contains a separator byte"
                )));
            }
        }
        Ok(())
    }

    /// Whether this request is marked fire-and-forget.
    pub fn is_one_way(&self) -> bool {
        self.meta.get(META_ONE_WAY).is_some_and(|v| v == "true")
    }

    /// The call deadline as unix milliseconds, if the caller set one.
    pub fn deadline_millis(&self) -> Option<u64> {
        self.meta.get(META_DEADLINE)?.parse().ok()
    }

    /// Serialize the request into one contiguous frame.
    ///
    /// The length fields must be current (see `calculate_head_length` /
    /// `calculate_body_length`). Meta iteration order is unspecified;
    /// decoding does not depend on it.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.head_length as usize + self.body_length as usize);
        buf.put_u32(self.head_length);
        buf.put_u32(self.body_length);
        buf.put_u32(self.request_id);
        buf.put_u8(self.version);
        buf.put_u8(self.compress);
        buf.put_u8(self.serializer);

        buf.put_slice(self.service_name.as_bytes());
        buf.put_u8(b'\n');
        buf.put_slice(self.method_name.as_bytes());
        buf.put_u8(b'\n');
        for (key, value) in &self.meta {
            buf.put_slice(key.as_bytes());
            buf.put_u8(b'\r');
            buf.put_slice(value.as_bytes());
            buf.put_u8(b'\n');
        }

        buf.put_slice(&self.data);
        buf.freeze()
    }

    /// Parse a request out of one full frame.
    ///
    /// The buffer must contain the whole frame, prefix included, exactly as
    /// produced by [`encode`](Request::encode) and returned by
    /// [`read_frame`](crate::read_frame). Never panics on malformed input.
    pub fn decode(buf: &[u8]) -> Result<Request, RpcError> {
        if buf.len() < FIXED_HEADER_LEN {
            return Err(RpcError::Protocol(format!(
                "request of {} bytes is shorter than the fixed header",
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

        let header = &buf[FIXED_HEADER_LEN..head];
        let sep = find(header, b'\n').ok_or_else(|| {
            RpcError::Protocol("header is missing the service name delimiter".to_string())
        })?;
        let service_name = header_text(&header[..sep])?;

        let header = &header[sep + 1..];
        let sep = find(header, b'\n').ok_or_else(|| {
            RpcError::Protocol("header is missing the method name delimiter".to_string())
        })?;
        let method_name = header_text(&header[..sep])?;

        let mut rest = &header[sep + 1..];
        let mut meta = HashMap::new();
        while !rest.is_empty() {
            let end = find(rest, b'\n')
                .ok_or_else(|| RpcError::Protocol("unterminated meta pair".to_string()))?;
            let pair = &rest[..end];
            let split = find(pair, b'\r').ok_or_else(|| {
                RpcError::Protocol("meta pair is missing its key separator".to_string())
            })?;
            let key = header_text(&pair[..split])?;
            let value = header_text(&pair[split + 1..])?;
            meta.insert(key, value);
            rest = &rest[end + 1..];
        }

        let data = if body == 0 {
            Bytes::new()
        } else {
            Bytes::copy_from_slice(&buf[head..head + body])
        };

        Ok(Request {
            head_length,
            body_length,
            request_id: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            version: buf[12],
            compress: buf[13],
            serializer: buf[14],
            service_name,
            method_name,
            meta,
            data,
        })
    }
}

fn header_text(bytes: &[u8]) -> Result<String, RpcError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| RpcError::Protocol("header field is not valid UTF-8".to_string()))
}
