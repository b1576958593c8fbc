//! Multipart delivery envelope
//!
//! Each distributed frame is wrapped as one part of a
//! `multipart/x-mixed-replace` response:
//!
//! ```text
//! --frame\r\n
//! Content-Type: image/jpeg\r\n
//! Content-Length: <N>\r\n
//! \r\n
//! <N bytes of JPEG>\r\n
//! ```
//!
//! The HTTP layer writes envelopes to the viewer connection byte for byte.

use bytes::{BufMut, Bytes, BytesMut};

use crate::cache::CachedFrame;

/// Multipart boundary token
pub const BOUNDARY: &str = "frame";

/// Content type of the viewer response
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Headers that disable caching of the viewer response at every layer
pub const NO_CACHE_HEADERS: [(&str, &str); 3] = [
    ("Cache-Control", "no-cache, no-store, must-revalidate"),
    ("Pragma", "no-cache"),
    ("Expires", "0"),
];

/// One encoded multipart part, ready to write to a viewer
///
/// Cloning shares the underlying bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Sequence number of the wrapped frame
    pub sequence: u64,
    /// Encoded part
    pub data: Bytes,
}

impl Envelope {
    /// Wrap a cached frame
    pub fn from_frame(frame: &CachedFrame) -> Self {
        Self {
            sequence: frame.sequence,
            data: encode(&frame.data),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Encode one JPEG payload as a multipart part
pub fn encode(jpeg: &[u8]) -> Bytes {
    let length = jpeg.len().to_string();
    let mut buf = BytesMut::with_capacity(jpeg.len() + length.len() + 64);

    buf.put_slice(b"--");
    buf.put_slice(BOUNDARY.as_bytes());
    buf.put_slice(b"\r\nContent-Type: image/jpeg\r\nContent-Length: ");
    buf.put_slice(length.as_bytes());
    buf.put_slice(b"\r\n\r\n");
    buf.put_slice(jpeg);
    buf.put_slice(b"\r\n");

    buf.freeze()
}
