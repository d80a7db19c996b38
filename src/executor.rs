use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tracing::error;

use crate::errors::{ErrorCategory, RequestError};
use crate::request::RequestSpec;
use crate::response::{parse_response, Reply};
use crate::timing::PhaseTimings;
use crate::transport::{self, TlsPolicy};
use crate::url::Scheme;

/// Outcome of one request execution: the parsed reply (default on
/// failure), the phase timings gathered so far, and the failure category
/// when the request did not complete.
#[derive(Debug, Clone)]
pub struct ResultResponse {
    pub reply: Reply,
    pub timings: PhaseTimings,
    pub failure: Option<ErrorCategory>,
}

/// Executes requests against one pre-resolved endpoint.
///
/// One executor per worker: the DNS duration is injected at construction
/// and stamped into every result, and the TLS client configuration is
/// built once and shared read-only by all of the worker's requests.
pub struct RequestExecutor {
    spec: RequestSpec,
    endpoint: SocketAddr,
    dns: Duration,
    tls: Option<Arc<ClientConfig>>,
}

impl RequestExecutor {
    /// # Errors
    /// Fails only when the TLS client configuration cannot be built for an
    /// https target; plain http targets never fail here.
    pub fn new(
        spec: RequestSpec,
        endpoint: SocketAddr,
        dns: Duration,
        policy: &TlsPolicy,
    ) -> Result<Self, RequestError> {
        let tls = match spec.target.scheme {
            Scheme::Https => Some(Arc::new(transport::client_config(policy)?)),
            Scheme::Http => None,
        };
        Ok(Self {
            spec,
            endpoint,
            dns,
            tls,
        })
    }

    /// Runs one full request. Transport and protocol errors are caught
    /// here, logged, and turned into a partial result; the caller's loop
    /// is never interrupted by one failed request.
    pub async fn execute(&self) -> ResultResponse {
        let mut timings = PhaseTimings {
            dns: self.dns,
            ..PhaseTimings::default()
        };

        let prepare_started = Instant::now();
        let raw = self.spec.to_bytes();
        timings.prepare = prepare_started.elapsed();

        match self.perform(&raw, &mut timings).await {
            Ok(reply) => ResultResponse {
                reply,
                timings,
                failure: None,
            },
            Err(request_error) => {
                let category = ErrorCategory::from_request_error(&request_error);
                error!(
                    error = %request_error,
                    category = category.label(),
                    "Request failed"
                );
                ResultResponse {
                    reply: Reply::default(),
                    timings,
                    failure: Some(category),
                }
            }
        }
    }

    async fn perform(
        &self,
        raw: &[u8],
        timings: &mut PhaseTimings,
    ) -> Result<Reply, RequestError> {
        let mut conn = match &self.tls {
            None => {
                let (conn, connect) = transport::connect_plain(self.endpoint).await?;
                timings.connect = connect;
                conn
            }
            Some(config) => {
                let (conn, connect, handshake) =
                    transport::connect_tls(self.endpoint, &self.spec.target.host, config).await?;
                timings.connect = connect;
                timings.handshake = handshake;
                conn
            }
        };

        let write_started = Instant::now();
        conn.write_all(raw).await.map_err(RequestError::Write)?;
        conn.flush().await.map_err(RequestError::Write)?;
        timings.request = write_started.elapsed();

        let read_started = Instant::now();
        let reply = parse_response(&mut conn).await;
        timings.response = read_started.elapsed();

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::Target;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn fixture(response: &'static [u8]) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut seen = Vec::new();
                    let mut buf = [0u8; 1024];
                    loop {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                seen.extend_from_slice(&buf[..n]);
                                if seen.windows(4).any(|w| w == b"\r\n\r\n") {
                                    break;
                                }
                            }
                        }
                    }
                    let _ = socket.write_all(response).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        addr
    }

    fn executor_for(addr: SocketAddr, dns: Duration) -> RequestExecutor {
        let target = Target::parse(&format!("http://127.0.0.1:{}/ping", addr.port())).unwrap();
        RequestExecutor::new(
            RequestSpec::new(target, None),
            addr,
            dns,
            &TlsPolicy::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn executes_a_request_and_stamps_phases() {
        let addr = fixture(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nOK").await;
        let executor = executor_for(addr, Duration::from_millis(7));

        let result = executor.execute().await;

        assert!(result.failure.is_none());
        assert_eq!(result.reply.status_code, 200);
        assert_eq!(result.reply.body, b"OK");
        assert_eq!(result.timings.dns, Duration::from_millis(7));
        assert!(result.timings.connect > Duration::ZERO);
        assert!(result.timings.response > Duration::ZERO);
        assert_eq!(result.timings.handshake, Duration::ZERO);
    }

    #[tokio::test]
    async fn dns_duration_is_identical_across_requests() {
        let addr = fixture(b"HTTP/1.0 204 No Content\r\n\r\n").await;
        let executor = executor_for(addr, Duration::from_micros(1234));

        let first = executor.execute().await;
        let second = executor.execute().await;

        assert_eq!(first.timings.dns, Duration::from_micros(1234));
        assert_eq!(second.timings.dns, first.timings.dns);
    }

    #[tokio::test]
    async fn refused_connection_degrades_to_a_default_result() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let executor = executor_for(addr, Duration::ZERO);
        let result = executor.execute().await;

        assert_eq!(result.failure, Some(ErrorCategory::NetworkError));
        assert_eq!(result.reply.status_code, 0);
        assert!(result.reply.body.is_empty());
    }
}
