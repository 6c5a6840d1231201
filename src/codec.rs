use bytes::{BufMut, Bytes, BytesMut};

/// Rewrites the logical `\n` line terminator used in message templates to
/// the two-byte CRLF wire terminator.
///
/// This is the only normalization applied on the send path; templates are
/// otherwise transmitted byte for byte.
pub fn to_wire(template: &str) -> Bytes {
    let mut out = BytesMut::with_capacity(template.len() + 32);
    for byte in template.bytes() {
        if byte == b'\n' {
            out.put_slice(b"\r\n");
        } else {
            out.put_u8(byte);
        }
    }
    out.freeze()
}

/// Wraps an XML-RPC payload in the fixed HTTP request frame the control
/// channel expects. `Content-Length` is the exact byte length of `body`.
pub fn http_post_frame(body: &[u8], host: &str, port: u16) -> Bytes {
    let head = format!(
        "POST / HTTP/1.1\r\n\
         Connection: close\r\n\
         Host: {host}:{port}\r\n\
         User-Agent: Tester\r\n\
         Content-Type: text/xml\r\n\
         Content-Length: {len}\r\n\
         \r\n",
        len = body.len(),
    );
    let mut out = BytesMut::with_capacity(head.len() + body.len());
    out.put_slice(head.as_bytes());
    out.put_slice(body);
    out.freeze()
}
