use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const TCP_SCHEME: &str = "tcp";
const INPROC_SCHEME: &str = "inproc";

/// Address a broker socket binds or connects to.
///
/// Text form is `tcp://host:port` or `inproc://name`. A TCP port of `0`
/// asks the operating system for an ephemeral port at bind time.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum Endpoint {
    /// Client-facing TCP address.
    Tcp { host: String, port: u16 },
    /// Named rendezvous inside one process.
    Inproc { name: String },
}

impl Endpoint {
    /// Builds a TCP endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Builds an in-process endpoint.
    #[must_use]
    pub fn inproc(name: impl Into<String>) -> Self {
        Self::Inproc { name: name.into() }
    }

    /// URL scheme of the endpoint.
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Tcp { .. } => TCP_SCHEME,
            Self::Inproc { .. } => INPROC_SCHEME,
        }
    }

    /// True for a TCP endpoint whose port is chosen at bind time.
    #[must_use]
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Self::Tcp { port: 0, .. })
    }

    /// Same host on `port`; in-process endpoints are returned unchanged.
    #[must_use]
    pub fn with_port(&self, port: u16) -> Self {
        match self {
            Self::Tcp { host, .. } => Self::tcp(host.clone(), port),
            Self::Inproc { .. } => self.clone(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = self.scheme();
        match self {
            Self::Tcp { host, port } => write!(formatter, "{scheme}://{host}:{port}"),
            Self::Inproc { name } => write!(formatter, "{scheme}://{name}"),
        }
    }
}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        let host = url.host_str().filter(|host| !host.is_empty());
        match (url.scheme(), host) {
            (TCP_SCHEME, Some(host)) => url
                .port()
                .map(|port| Self::tcp(host, port))
                .ok_or_else(|| EndpointParseError::MissingPort(input.to_owned())),
            (TCP_SCHEME, None) => Err(EndpointParseError::MissingHost(input.to_owned())),
            (INPROC_SCHEME, Some(name)) => Ok(Self::inproc(name)),
            (INPROC_SCHEME, None) => Err(EndpointParseError::MissingName(input.to_owned())),
            (other, _) => Err(EndpointParseError::UnsupportedScheme(other.to_owned())),
        }
    }
}

/// Errors encountered while parsing an [`Endpoint`] from text.
#[derive(Debug, Error)]
pub enum EndpointParseError {
    /// Only `tcp` and `inproc` are understood.
    #[error("unsupported endpoint scheme '{0}'")]
    UnsupportedScheme(String),
    #[error("missing TCP host in '{0}'")]
    MissingHost(String),
    #[error("missing TCP port in '{0}'")]
    MissingPort(String),
    #[error("missing in-process endpoint name in '{0}'")]
    MissingName(String),
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("tcp://0.0.0.0:5555", Endpoint::tcp("0.0.0.0", 5555))]
    #[case("tcp://127.0.0.1:0", Endpoint::tcp("127.0.0.1", 0))]
    #[case("inproc://backend", Endpoint::inproc("backend"))]
    fn parses_supported_schemes(#[case] input: &str, #[case] expected: Endpoint) {
        let parsed: Endpoint = input.parse().expect("endpoint should parse");
        assert_eq!(parsed, expected);
        assert_eq!(parsed.to_string(), input);
    }

    #[rstest]
    #[case::no_port("tcp://localhost", "port")]
    #[case::no_name("inproc://", "name")]
    #[case::unknown_scheme("ipc:///tmp/broker", "scheme")]
    fn rejects_incomplete_addresses(#[case] input: &str, #[case] missing: &str) {
        let error = input.parse::<Endpoint>().expect_err("address is incomplete");
        let matched = match missing {
            "port" => matches!(error, EndpointParseError::MissingPort(_)),
            "name" => matches!(error, EndpointParseError::MissingName(_)),
            _ => matches!(error, EndpointParseError::UnsupportedScheme(_)),
        };
        assert!(matched, "{input}: {error}");
    }

    #[test]
    fn bound_port_replaces_ephemeral_port() {
        let requested = Endpoint::tcp("127.0.0.1", 0);
        assert!(requested.is_ephemeral());

        let bound = requested.with_port(41_000);
        assert!(!bound.is_ephemeral());
        assert_eq!(bound.to_string(), "tcp://127.0.0.1:41000");
        assert_eq!(Endpoint::inproc("backend").with_port(9), Endpoint::inproc("backend"));
    }
}
