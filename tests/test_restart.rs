#![cfg(unix)]

use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use weir::{FnRequestFilter, Pipeline, Response, Server, ServerError};

fn hello_pipeline(tag: &'static str) -> Pipeline {
    let mut pipeline = Pipeline::new();
    pipeline.add_upstream(FnRequestFilter::new(move |_req| Some(Response::ok(tag))));
    pipeline
}

async fn get(port: u16) -> (u16, Vec<u8>) {
    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    client
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    let mut wire = Vec::new();
    client.read_to_end(&mut wire).await.unwrap();

    let text = String::from_utf8(wire).unwrap();
    let status: u16 = text.split(' ').nth(1).unwrap().parse().unwrap();
    let body = text
        .split("\r\n\r\n")
        .nth(1)
        .unwrap_or_default()
        .as_bytes()
        .to_vec();
    (status, body)
}

#[tokio::test]
async fn test_fd_handoff_handshake() {
    // Old generation binds and serves.
    let parent = Arc::new(Server::new(0, hello_pipeline("parent")));
    let parent_task = {
        let parent = parent.clone();
        tokio::spawn(async move { parent.listen_and_serve().await })
    };
    parent.accept_ready().await;
    let port = parent.port();
    let fd = parent.socket_fd().expect("bound server exposes its fd");

    // New generation adopts a duplicate of the fd, the way an exec'd
    // child would find it already open.
    let child = Arc::new(Server::new(0, hello_pipeline("child")));
    let inherited = unsafe { libc::dup(fd) };
    assert!(inherited >= 0);
    child.fd_listen(inherited).unwrap();
    assert_eq!(child.port(), port);

    let child_task = {
        let child = child.clone();
        tokio::spawn(async move { child.listen_and_serve().await })
    };
    child.accept_ready().await;

    // Parent stands down and drains.
    parent.stop_accepting();
    let parent_result: Result<(), ServerError> = timeout(Duration::from_secs(10), parent_task)
        .await
        .expect("parent must drain after stop_accepting")
        .unwrap();
    parent_result.unwrap();

    // The socket stays open throughout: the child keeps serving.
    let (status, body) = get(port).await;
    assert_eq!(status, 200);
    assert_eq!(body, b"child".to_vec());

    child.stop_accepting();
    timeout(Duration::from_secs(10), child_task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_fd_listen_rejects_non_listener() {
    // A datagram socket is not a stream socket.
    let udp = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let server = Server::new(0, Pipeline::new());
    assert!(matches!(
        server.fd_listen(udp.as_raw_fd()),
        Err(ServerError::NotTcpListener(_))
    ));

    // A connected stream socket is not listening.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let stream = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let server = Server::new(0, Pipeline::new());
    assert!(matches!(
        server.fd_listen(stream.as_raw_fd()),
        Err(ServerError::NotTcpListener(_))
    ));
}
