//! HTTP response parsing over an arbitrary byte stream.
//!
//! The parser reads a status line, an ordered header list (duplicates
//! permitted) and a body framed either by `Content-Length` or by the end of
//! the stream. Chunked transfer-encoding is flagged but not decoded: the
//! body then holds the raw chunk-encoded bytes. Parsing is best-effort by
//! contract: whatever happens on the wire, a [`Reply`] comes back.

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{error, warn};

/// A parsed HTTP response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub http_version: String,
    pub status_code: u16,
    pub status_message: String,
    /// Header pairs in wire order; duplicate names are preserved.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

const CRLF: &[u8] = b"\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";
const READ_CHUNK: usize = 4096;

/// Reads and parses one HTTP response from `stream`.
///
/// Always returns a `Reply`, even on a partial or erroring read: read
/// errors are logged and whatever was buffered is kept. A clean EOF, or a
/// TLS peer closing without `close_notify`, is a normal end-of-body when
/// no `Content-Length` was given.
pub async fn parse_response<S>(stream: &mut S) -> Reply
where
    S: AsyncRead + Unpin + ?Sized,
{
    let mut reply = Reply::default();
    let mut buf: Vec<u8> = Vec::with_capacity(READ_CHUNK);

    let Some(status_end) = read_until(stream, &mut buf, 0, CRLF).await else {
        warn!("connection closed before a full status line was received");
        return reply;
    };
    parse_status_line(&buf[..status_end - CRLF.len()], &mut reply);

    let Some(headers_end) = read_until(stream, &mut buf, status_end, HEADER_END).await else {
        warn!("connection closed before the end of the headers");
        scan_headers(&buf[status_end..], &mut reply);
        return reply;
    };
    // The terminator's first CRLF belongs to the last header line.
    let (content_length, chunked) = scan_headers(&buf[status_end..headers_end - 2], &mut reply);

    if chunked {
        warn!("chunked transfer-encoding is not supported; the body is kept as the raw chunked bytes");
    }

    let mut body = buf.split_off(headers_end);
    match content_length {
        Some(length) => {
            let remaining = length.saturating_sub(body.len());
            if remaining > 0 {
                read_exact_into(stream, &mut body, remaining).await;
            }
        }
        None => read_to_close(stream, &mut body).await,
    }
    reply.body = body;
    reply
}

/// Parses `<version> <status_code> <status_message>`.
fn parse_status_line(line: &[u8], reply: &mut Reply) {
    let text = String::from_utf8_lossy(line);
    let mut parts = text.splitn(3, ' ');
    reply.http_version = parts.next().unwrap_or("").to_string();
    let code = parts.next().unwrap_or("");
    match code.parse::<u16>() {
        Ok(parsed) => reply.status_code = parsed,
        Err(_) => warn!(line = %text, "malformed status line"),
    }
    reply.status_message = parts.next().unwrap_or("").trim_end().to_string();
}

/// Appends header pairs to the reply and returns the detected
/// (content-length, chunked) framing, matching names case-insensitively.
fn scan_headers(block: &[u8], reply: &mut Reply) -> (Option<usize>, bool) {
    let mut content_length = None;
    let mut chunked = false;

    for line in split_lines(block) {
        let text = String::from_utf8_lossy(line);
        let Some((name, rest)) = text.split_once(':') else {
            continue;
        };
        // Trim exactly one leading space from the value.
        let value = rest.strip_prefix(' ').unwrap_or(rest);

        if name.eq_ignore_ascii_case("content-length") {
            if let Ok(length) = value.trim().parse::<usize>() {
                content_length = Some(length);
            }
        } else if name.eq_ignore_ascii_case("transfer-encoding")
            && value.trim().to_ascii_lowercase().starts_with("chunked")
        {
            chunked = true;
        }

        reply.headers.push((name.to_string(), value.to_string()));
    }

    (content_length, chunked)
}

/// CRLF-separated lines, skipping empty ones (a trailing partial line is
/// still yielded so truncated responses keep their last complete value).
fn split_lines(block: &[u8]) -> impl Iterator<Item = &[u8]> {
    block
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.is_empty())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Reads until `needle` appears at or after `from`, returning the index
/// just past it. `None` means the stream ended (or failed) first.
async fn read_until<S>(
    stream: &mut S,
    buf: &mut Vec<u8>,
    from: usize,
    needle: &[u8],
) -> Option<usize>
where
    S: AsyncRead + Unpin + ?Sized,
{
    // Back up so a needle spanning the boundary at `from` is still found.
    let search_from = from.saturating_sub(needle.len() - 1);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        if let Some(pos) = find(&buf[search_from..], needle) {
            return Some(search_from + pos + needle.len());
        }
        match stream.read(&mut chunk).await {
            Ok(0) => return None,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return None,
            Err(e) => {
                error!(error = %e, "error while reading HTTP response");
                return None;
            }
        }
    }
}

/// Reads exactly `remaining` more bytes, keeping whatever arrived if the
/// stream ends early.
async fn read_exact_into<S>(stream: &mut S, body: &mut Vec<u8>, mut remaining: usize)
where
    S: AsyncRead + Unpin + ?Sized,
{
    let mut chunk = [0u8; READ_CHUNK];
    while remaining > 0 {
        let want = remaining.min(READ_CHUNK);
        match stream.read(&mut chunk[..want]).await {
            Ok(0) => {
                warn!(remaining, "connection closed before the advertised content length arrived");
                return;
            }
            Ok(n) => {
                body.extend_from_slice(&chunk[..n]);
                remaining -= n;
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                warn!(remaining, "stream truncated before the advertised content length arrived");
                return;
            }
            Err(e) => {
                error!(error = %e, "error while reading HTTP response body");
                return;
            }
        }
    }
}

/// Reads until the peer closes the connection. A clean EOF and a TLS
/// truncated close both end the body normally; other errors are logged and
/// the buffered body stands.
async fn read_to_close<S>(stream: &mut S, body: &mut Vec<u8>)
where
    S: AsyncRead + Unpin + ?Sized,
{
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => return,
            Ok(n) => body.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return,
            Err(e) => {
                error!(error = %e, "error while reading HTTP response body");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn parse_bytes(raw: &[u8]) -> Reply {
        let mut input = raw;
        parse_response(&mut input).await
    }

    #[tokio::test]
    async fn parses_status_headers_and_content_length_body() {
        let reply = parse_bytes(
            b"HTTP/1.1 200 OK\r\nServer: test\r\nContent-Length: 2\r\n\r\nOK",
        )
        .await;

        assert_eq!(reply.http_version, "HTTP/1.1");
        assert_eq!(reply.status_code, 200);
        assert_eq!(reply.status_message, "OK");
        assert_eq!(
            reply.headers,
            vec![
                ("Server".to_string(), "test".to_string()),
                ("Content-Length".to_string(), "2".to_string()),
            ]
        );
        assert_eq!(reply.body, b"OK");
    }

    #[tokio::test]
    async fn multi_word_status_message_is_kept() {
        let reply = parse_bytes(b"HTTP/1.0 500 Internal Server Error\r\n\r\n").await;
        assert_eq!(reply.status_code, 500);
        assert_eq!(reply.status_message, "Internal Server Error");
    }

    #[tokio::test]
    async fn no_content_length_reads_until_eof() {
        let reply = parse_bytes(b"HTTP/1.0 200 OK\r\nServer: x\r\n\r\nall the rest").await;
        assert_eq!(reply.body, b"all the rest");
    }

    #[tokio::test]
    async fn content_length_is_detected_case_insensitively() {
        let reply = parse_bytes(b"HTTP/1.1 200 OK\r\ncOnTeNt-LeNgTh: 3\r\n\r\nabcdef").await;
        // Body is the buffered remainder; the header only bounds the reads.
        assert_eq!(&reply.body[..3], b"abc");
    }

    #[tokio::test]
    async fn duplicate_headers_preserve_order() {
        let reply = parse_bytes(
            b"HTTP/1.1 200 OK\r\nSet-Cookie: a=1\r\nSet-Cookie: b=2\r\n\r\n",
        )
        .await;
        assert_eq!(
            reply.headers,
            vec![
                ("Set-Cookie".to_string(), "a=1".to_string()),
                ("Set-Cookie".to_string(), "b=2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn exactly_one_leading_space_is_trimmed() {
        let reply = parse_bytes(b"HTTP/1.1 200 OK\r\nA:  two\r\nB:none\r\n\r\n").await;
        assert_eq!(reply.headers[0], ("A".to_string(), " two".to_string()));
        assert_eq!(reply.headers[1], ("B".to_string(), "none".to_string()));
    }

    #[tokio::test]
    async fn chunked_body_is_kept_raw() {
        let raw: &[u8] =
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nOK\r\n0\r\n\r\n";
        let reply = parse_bytes(raw).await;
        assert_eq!(reply.status_code, 200);
        assert_eq!(reply.body, b"2\r\nOK\r\n0\r\n\r\n");
    }

    #[tokio::test]
    async fn zero_headers_and_zero_length_body() {
        let reply = parse_bytes(b"HTTP/1.0 204 No Content\r\n\r\n").await;
        assert_eq!(reply.status_code, 204);
        assert!(reply.headers.is_empty());
        assert!(reply.body.is_empty());
    }

    #[tokio::test]
    async fn headers_and_body_in_separate_reads() {
        let (mut client, server) = tokio::io::duplex(1024);
        let writer = tokio::spawn(async move {
            let mut server = server;
            server
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n")
                .await
                .unwrap();
            server.flush().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            server.write_all(b"hello").await.unwrap();
        });

        let reply = parse_response(&mut client).await;
        writer.await.unwrap();

        assert_eq!(reply.status_code, 200);
        assert_eq!(reply.body, b"hello");
    }

    #[tokio::test]
    async fn truncated_content_length_keeps_partial_body() {
        let reply = parse_bytes(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort").await;
        assert_eq!(reply.status_code, 200);
        assert_eq!(reply.body, b"short");
    }

    #[tokio::test]
    async fn garbage_status_line_still_returns_a_reply() {
        let reply = parse_bytes(b"not http at all\r\n\r\nrest").await;
        assert_eq!(reply.status_code, 0);
    }

    #[tokio::test]
    async fn empty_stream_returns_default_reply() {
        let reply = parse_bytes(b"").await;
        assert_eq!(reply, Reply::default());
    }

    #[tokio::test]
    async fn parsing_is_idempotent_on_well_formed_input() {
        let raw: &[u8] = b"HTTP/1.1 200 OK\r\nA: 1\r\nContent-Length: 4\r\n\r\nbody";
        let first = parse_bytes(raw).await;
        let second = parse_bytes(raw).await;
        assert_eq!(first, second);
    }
}
