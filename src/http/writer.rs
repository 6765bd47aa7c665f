use std::io;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::http::response::{Body, Response, StatusCode};

const HTTP_VERSION: &str = "HTTP/1.1";
const STREAM_CHUNK_BYTES: usize = 8 * 1024;

/// Fixes up framing headers so every response tells the client how its
/// body ends.
///
/// Empty fixed bodies on statuses that permit a body get an explicit
/// `Transfer-Encoding: identity` (some clients otherwise sit waiting on
/// a keep-alive connection); unknown-length bodies are switched to
/// chunked encoding.
pub fn normalize_framing(res: &mut Response) {
    if res.headers.contains_key("Transfer-Encoding") {
        return;
    }
    if res.body.is_empty() {
        let bodyless = res.status.is_informational()
            || res.status == StatusCode::NoContent
            || res.status == StatusCode::NotModified;
        if !bodyless {
            res.headers
                .insert("Transfer-Encoding".to_string(), "identity".to_string());
        }
    } else if res.content_length().is_none() {
        res.headers
            .insert("Transfer-Encoding".to_string(), "chunked".to_string());
    }
}

fn serialize_head(res: &Response) -> BytesMut {
    let mut buf = BytesMut::with_capacity(256);

    buf.put_slice(HTTP_VERSION.as_bytes());
    buf.put_slice(
        format!(" {} {}\r\n", res.status.as_u16(), res.status.reason_phrase()).as_bytes(),
    );

    for (name, value) in &res.headers {
        buf.put_slice(name.as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(value.as_bytes());
        buf.put_slice(b"\r\n");
    }

    if res.close && !res.headers.contains_key("Connection") {
        buf.put_slice(b"Connection: close\r\n");
    }

    buf.put_slice(b"\r\n");
    buf
}

/// Serializes and writes a response.
///
/// Fixed bodies are coalesced with the head into a single write; stream
/// bodies are written as chunked transfer encoding as data arrives.
pub async fn write_response<W: AsyncWrite + Unpin>(
    w: &mut W,
    res: &mut Response,
) -> io::Result<()> {
    let mut head = serialize_head(res);

    match &mut res.body {
        Body::Empty => {
            w.write_all(&head).await?;
        }
        Body::Fixed(data) => {
            head.put_slice(data);
            w.write_all(&head).await?;
        }
        Body::Stream(reader) => {
            w.write_all(&head).await?;
            let mut chunk = vec![0u8; STREAM_CHUNK_BYTES];
            loop {
                let n = reader.read(&mut chunk).await?;
                if n == 0 {
                    break;
                }
                w.write_all(format!("{:x}\r\n", n).as_bytes()).await?;
                w.write_all(&chunk[..n]).await?;
                w.write_all(b"\r\n").await?;
            }
            w.write_all(b"0\r\n\r\n").await?;
        }
    }

    w.flush().await
}
