use std::io::Cursor;

use weir::http::writer::{normalize_framing, write_response};
use weir::{ResponseBuilder, StatusCode};

async fn render(res: &mut weir::Response) -> String {
    let mut out = Vec::new();
    write_response(&mut out, res).await.unwrap();
    String::from_utf8(out).unwrap()
}

#[tokio::test]
async fn test_write_fixed_body() {
    let mut res = ResponseBuilder::new(StatusCode::Ok)
        .header("Content-Type", "text/plain")
        .body(b"hello".to_vec())
        .build();

    let wire = render(&mut res).await;
    assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(wire.contains("Content-Type: text/plain\r\n"));
    assert!(wire.contains("Content-Length: 5\r\n"));
    assert!(wire.ends_with("\r\n\r\nhello"));
}

#[tokio::test]
async fn test_write_close_adds_connection_header() {
    let mut res = ResponseBuilder::new(StatusCode::Ok)
        .body(b"x".to_vec())
        .close()
        .build();

    let wire = render(&mut res).await;
    assert!(wire.contains("Connection: close\r\n"));
}

#[tokio::test]
async fn test_write_respects_existing_connection_header() {
    let mut res = ResponseBuilder::new(StatusCode::Ok)
        .header("Connection", "close")
        .body(b"x".to_vec())
        .close()
        .build();

    let wire = render(&mut res).await;
    assert_eq!(wire.matches("Connection:").count(), 1);
}

#[tokio::test]
async fn test_write_stream_body_is_chunked() {
    let mut res = ResponseBuilder::new(StatusCode::Ok)
        .stream(Box::new(Cursor::new(b"hello world".to_vec())))
        .build();
    normalize_framing(&mut res);

    let wire = render(&mut res).await;
    assert!(wire.contains("Transfer-Encoding: chunked\r\n"));
    assert!(wire.ends_with("b\r\nhello world\r\n0\r\n\r\n"));
}

#[test]
fn test_normalize_empty_body_gets_identity() {
    let mut res = ResponseBuilder::new(StatusCode::Ok).build();
    normalize_framing(&mut res);
    assert_eq!(res.header("Transfer-Encoding").unwrap(), "identity");
}

#[test]
fn test_normalize_skips_bodyless_statuses() {
    for status in [
        StatusCode::Continue,
        StatusCode::NoContent,
        StatusCode::NotModified,
    ] {
        let mut res = ResponseBuilder::new(status).build();
        normalize_framing(&mut res);
        assert!(
            res.header("Transfer-Encoding").is_none(),
            "{:?} should not be framed",
            status
        );
    }
}

#[test]
fn test_normalize_leaves_fixed_bodies_alone() {
    let mut res = ResponseBuilder::new(StatusCode::Ok)
        .body(b"data".to_vec())
        .build();
    normalize_framing(&mut res);
    assert!(res.header("Transfer-Encoding").is_none());
}

#[test]
fn test_normalize_keeps_explicit_transfer_encoding() {
    let mut res = ResponseBuilder::new(StatusCode::Ok)
        .header("Transfer-Encoding", "gzip")
        .build();
    normalize_framing(&mut res);
    assert_eq!(res.header("Transfer-Encoding").unwrap(), "gzip");
}

#[test]
fn test_normalize_marks_streams_chunked() {
    let mut res = ResponseBuilder::new(StatusCode::Ok)
        .stream(Box::new(Cursor::new(Vec::new())))
        .build();
    normalize_framing(&mut res);
    assert_eq!(res.header("Transfer-Encoding").unwrap(), "chunked");
}
