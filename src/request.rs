use crate::url::Target;

/// User-Agent header sent with every request.
pub const USER_AGENT: &str = concat!("stampede/", env!("CARGO_PKG_VERSION"));

/// Supported request methods. POST is used exactly when a body is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// Everything needed to serialize one request. Built once per worker and
/// shared read-only by all of that worker's requests.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub target: Target,
    body: Option<String>,
}

impl RequestSpec {
    /// An empty body is normalized away so the method invariant holds.
    pub fn new(target: Target, body: Option<String>) -> Self {
        let body = body.filter(|b| !b.is_empty());
        Self { target, body }
    }

    pub fn method(&self) -> Method {
        if self.body.is_some() {
            Method::Post
        } else {
            Method::Get
        }
    }

    /// Serializes the request into raw HTTP/1.0 bytes.
    ///
    /// Header order is fixed: Host, User-Agent, then the content headers
    /// when a body is present, then `Connection: close`. No shared state
    /// is touched; calling this twice yields identical bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = String::with_capacity(128);

        head.push_str(self.method().as_str());
        head.push(' ');
        head.push_str(&self.target.path);
        head.push_str(" HTTP/1.0\r\n");

        head.push_str("Host: ");
        head.push_str(&self.target.host_header());
        head.push_str("\r\n");

        head.push_str("User-Agent: ");
        head.push_str(USER_AGENT);
        head.push_str("\r\n");

        if let Some(ref body) = self.body {
            head.push_str("Content-Type: application/json; charset=utf-8\r\n");
            head.push_str("Accept: */*\r\n");
            head.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }

        head.push_str("Connection: close\r\n\r\n");

        let mut raw = head.into_bytes();
        if let Some(ref body) = self.body {
            raw.extend_from_slice(body.as_bytes());
        }
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(url: &str, body: Option<&str>) -> RequestSpec {
        RequestSpec::new(
            Target::parse(url).unwrap(),
            body.map(|b| b.to_string()),
        )
    }

    #[test]
    fn get_request_exact_bytes() {
        let raw = spec("http://localhost:8080/ping", None).to_bytes();
        let expected = format!(
            "GET /ping HTTP/1.0\r\nHost: localhost:8080\r\nUser-Agent: {}\r\nConnection: close\r\n\r\n",
            USER_AGENT
        );
        assert_eq!(raw, expected.as_bytes());
    }

    #[test]
    fn body_implies_post_with_content_headers() {
        let body = r#"{"name":"héllo"}"#;
        let raw = spec("http://example.com/api", Some(body)).to_bytes();
        let text = String::from_utf8(raw).unwrap();

        assert!(text.starts_with("POST /api HTTP/1.0\r\n"));
        assert!(text.contains("Content-Type: application/json; charset=utf-8\r\n"));
        assert!(text.contains("Accept: */*\r\n"));
        // Content-Length counts bytes, not chars.
        assert!(text.contains(&format!("Content-Length: {}\r\n", body.len())));
        assert!(text.ends_with(&format!("Connection: close\r\n\r\n{}", body)));
    }

    #[test]
    fn empty_body_is_a_plain_get() {
        let raw = spec("http://example.com/", Some("")).to_bytes();
        let text = String::from_utf8(raw).unwrap();

        assert!(text.starts_with("GET / HTTP/1.0\r\n"));
        assert!(!text.contains("Content-Length"));
        assert!(!text.contains("Content-Type"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn host_header_has_no_port_when_none_given() {
        let raw = spec("http://example.com/x", None).to_bytes();
        let text = String::from_utf8(raw).unwrap();
        assert!(text.contains("\r\nHost: example.com\r\n"));
    }

    #[test]
    fn header_order_is_stable() {
        let raw = spec("http://example.com/x", Some("{}")).to_bytes();
        let text = String::from_utf8(raw).unwrap();

        let host = text.find("Host: ").unwrap();
        let agent = text.find("User-Agent: ").unwrap();
        let content_type = text.find("Content-Type: ").unwrap();
        let accept = text.find("Accept: ").unwrap();
        let length = text.find("Content-Length: ").unwrap();
        let connection = text.find("Connection: close").unwrap();

        assert!(host < agent);
        assert!(agent < content_type);
        assert!(content_type < accept);
        assert!(accept < length);
        assert!(length < connection);
    }

    #[test]
    fn building_twice_yields_identical_bytes() {
        let spec = spec("https://example.com/a", Some(r#"{"k":1}"#));
        assert_eq!(spec.to_bytes(), spec.to_bytes());
    }
}
