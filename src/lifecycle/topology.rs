//! Listener topology resolution.
//!
//! Decides, from four deployment hints, which of the plaintext and
//! encrypted pairs exist. Empty strings mean "not configured". Resolution
//! never fails: unsupported combinations yield fewer pairs.

use std::time::Duration;

use crate::net::endpoint::{ListenerPair, TlsMaterial};

/// Deployment hints.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListenerHints<'a> {
    pub http_port: &'a str,
    pub https_port: &'a str,
    pub https_key_file: &'a str,
    pub https_cert_file: &'a str,
}

/// Resolved set of listener pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    pub plaintext: Option<ListenerPair>,
    pub encrypted: Option<ListenerPair>,
}

impl Topology {
    /// True iff both pairs are present.
    pub fn both_configured(&self) -> bool {
        self.plaintext.is_some() && self.encrypted.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.plaintext.is_none() && self.encrypted.is_none()
    }
}

/// Resolve the topology. Rules are applied in order:
///
/// 1. HTTPS port, key and cert all set: encrypted pair on the HTTPS port.
/// 2. Otherwise, with no HTTP port: plaintext pair on the HTTPS port
///    (single-port deployments). Skipped when there is no HTTPS port to
///    reuse.
/// 3. HTTP port set: plaintext pair on the HTTP port, alongside any
///    encrypted pair from rule 1.
pub fn resolve(hints: ListenerHints<'_>, read_header_timeout: Duration) -> Topology {
    let mut topology = Topology::default();

    if !hints.https_port.is_empty()
        && !hints.https_key_file.is_empty()
        && !hints.https_cert_file.is_empty()
    {
        topology.encrypted = Some(ListenerPair::encrypted(
            hints.https_port,
            read_header_timeout,
            TlsMaterial {
                key_path: hints.https_key_file.into(),
                cert_path: hints.https_cert_file.into(),
            },
        ));
    } else if hints.http_port.is_empty() && !hints.https_port.is_empty() {
        topology.plaintext = Some(ListenerPair::plaintext(
            hints.https_port,
            read_header_timeout,
        ));
    }

    if !hints.http_port.is_empty() {
        topology.plaintext = Some(ListenerPair::plaintext(
            hints.http_port,
            read_header_timeout,
        ));
    }

    topology
}
