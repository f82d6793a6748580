//! Listener descriptors.
//!
//! A [`ListenerPair`] is one transport bound to both address families. Its
//! two [`Endpoint`]s differ only in the wildcard host; port and header-read
//! timeout are shared.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Transport served by a listener pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// Plain HTTP.
    Plaintext,
    /// HTTPS, terminated with rustls.
    Encrypted,
}

impl Transport {
    /// Short label used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Plaintext => "http",
            Transport::Encrypted => "https",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Plaintext => f.write_str("HTTP"),
            Transport::Encrypted => f.write_str("HTTPS"),
        }
    }
}

/// Address family of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// Wildcard host in `host:port` form.
    pub fn wildcard(&self) -> &'static str {
        match self {
            AddressFamily::V4 => "0.0.0.0",
            AddressFamily::V6 => "[::]",
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => f.write_str("ipv4"),
            AddressFamily::V6 => f.write_str("ipv6"),
        }
    }
}

/// A single listening socket description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    family: AddressFamily,
    bind_address: String,
    read_header_timeout: Duration,
}

impl Endpoint {
    fn new(family: AddressFamily, port: &str, read_header_timeout: Duration) -> Self {
        Self {
            family,
            bind_address: format!("{}:{}", family.wildcard(), port),
            read_header_timeout,
        }
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    /// Bind address, e.g. `0.0.0.0:8080` or `[::]:8080`.
    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    pub fn read_header_timeout(&self) -> Duration {
        self.read_header_timeout
    }

    /// Parse the bind address. Fails when the port is not a valid number.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.bind_address.parse()
    }
}

/// Key material carried by the encrypted pair.
///
/// Paths are not checked here; they are read when the pair starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    pub key_path: PathBuf,
    pub cert_path: PathBuf,
}

/// One transport bound to both address families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerPair {
    transport: Transport,
    port: String,
    endpoints: [Endpoint; 2],
    tls: Option<TlsMaterial>,
}

impl ListenerPair {
    /// Plaintext pair on `port`.
    pub fn plaintext(port: &str, read_header_timeout: Duration) -> Self {
        Self::new(Transport::Plaintext, port, read_header_timeout, None)
    }

    /// Encrypted pair on `port` using `tls`.
    pub fn encrypted(port: &str, read_header_timeout: Duration, tls: TlsMaterial) -> Self {
        Self::new(Transport::Encrypted, port, read_header_timeout, Some(tls))
    }

    fn new(
        transport: Transport,
        port: &str,
        read_header_timeout: Duration,
        tls: Option<TlsMaterial>,
    ) -> Self {
        Self {
            transport,
            port: port.to_string(),
            endpoints: [
                Endpoint::new(AddressFamily::V4, port, read_header_timeout),
                Endpoint::new(AddressFamily::V6, port, read_header_timeout),
            ],
            tls,
        }
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    /// IPv4 endpoint first, then IPv6.
    pub fn endpoints(&self) -> &[Endpoint; 2] {
        &self.endpoints
    }

    /// Key material; always `Some` for the encrypted pair.
    pub fn tls(&self) -> Option<&TlsMaterial> {
        self.tls.as_ref()
    }
}
