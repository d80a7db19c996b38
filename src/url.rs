use crate::errors::ConfigError;

/// Supported URL schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

/// A decomposed target URL. The path is never empty (defaults to `/`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub scheme: Scheme,
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
}

impl Target {
    /// Parses `scheme://host[:port][/path]` into its parts.
    ///
    /// The scheme defaults to `https` when the `://` part is absent. The
    /// text after a colon in the authority must be all digits to count as a
    /// port; anything else makes the URL malformed rather than silently
    /// folding into the host.
    ///
    /// # Errors
    /// Returns [`ConfigError::UnsupportedScheme`] for schemes other than
    /// http/https and [`ConfigError::MalformedUrl`] for everything else the
    /// grammar rejects. Both are fatal: no load is generated for a URL that
    /// does not decompose.
    pub fn parse(raw: &str) -> Result<Target, ConfigError> {
        let trimmed = raw.trim();

        let (scheme, rest) = match trimmed.split_once("://") {
            Some((scheme, rest)) => {
                let scheme = match scheme {
                    "http" => Scheme::Http,
                    "https" => Scheme::Https,
                    other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
                };
                (scheme, rest)
            }
            // No scheme given: assume https.
            None => (Scheme::Https, trimmed),
        };

        let (authority, path) = match rest.find('/') {
            Some(slash) => (&rest[..slash], &rest[slash..]),
            None => (rest, ""),
        };

        let (host, port) = match authority.split_once(':') {
            Some((host, port_text)) => {
                if port_text.is_empty() || !port_text.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(ConfigError::MalformedUrl(raw.to_string()));
                }
                let port = port_text
                    .parse::<u16>()
                    .map_err(|_| ConfigError::MalformedUrl(raw.to_string()))?;
                (host, Some(port))
            }
            None => (authority, None),
        };

        if host.is_empty() {
            return Err(ConfigError::MalformedUrl(raw.to_string()));
        }

        let path = if path.is_empty() {
            "/".to_string()
        } else {
            path.to_string()
        };

        Ok(Target {
            scheme,
            host: host.to_string(),
            port,
            path,
        })
    }

    /// The port requests will actually connect to.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.scheme.default_port())
    }

    /// The value of the `Host` header: the port is appended only when one
    /// was given explicitly.
    pub fn host_header(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }
}
