//! Response-parser behavior over real sockets: split delivery, EOF
//! framing and the chunked limitation.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use stampede::response::parse_response;

/// Serves one connection, writing each chunk separately with a pause in
/// between, then closes.
async fn serve_chunks(chunks: Vec<&'static [u8]>, pause: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        for chunk in chunks {
            socket.write_all(chunk).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(pause).await;
        }
        let _ = socket.shutdown().await;
    });
    addr
}

#[tokio::test]
async fn content_length_body_split_across_reads() {
    let addr = serve_chunks(
        vec![
            b"HTTP/1.1 200 OK\r\nContent-Le",
            b"ngth: 11\r\n\r\nhello",
            b" world",
        ],
        Duration::from_millis(15),
    )
    .await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let reply = parse_response(&mut stream).await;

    assert_eq!(reply.status_code, 200);
    assert_eq!(reply.body, b"hello world");
}

#[tokio::test]
async fn eof_framed_body_reads_until_close() {
    let addr = serve_chunks(
        vec![b"HTTP/1.0 200 OK\r\nServer: fixture\r\n\r\nfirst ", b"second"],
        Duration::from_millis(10),
    )
    .await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let reply = parse_response(&mut stream).await;

    assert_eq!(reply.status_code, 200);
    assert_eq!(reply.body, b"first second");
    assert_eq!(
        reply.headers,
        vec![("Server".to_string(), "fixture".to_string())]
    );
}

#[tokio::test]
async fn chunked_response_keeps_the_raw_bytes() {
    let addr = serve_chunks(
        vec![b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n"],
        Duration::from_millis(1),
    )
    .await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let reply = parse_response(&mut stream).await;

    assert_eq!(reply.status_code, 200);
    // Chunk framing is not decoded; the body is the raw encoded bytes.
    assert_eq!(reply.body, b"5\r\nhello\r\n0\r\n\r\n");
}
