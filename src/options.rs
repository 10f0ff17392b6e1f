use std::time::Duration;

use crate::headers::DEFAULT_NAMESPACE;

/// Soft byte budget for queued pages: ten pages at the 5 MB target size.
pub const DEFAULT_BUFFER_BYTES: usize = 10 * 5 * 1024 * 1024;

/// Configures HTTP, retry, buffering, and TLS behavior.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientOptions {
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Wall-clock limit for a whole statement, measured from submission.
    /// `None` means unbounded.
    pub statement_timeout: Option<Duration>,
    /// Maximum number of retries of a transient HTTP failure after the
    /// initial attempt.
    pub max_retries: usize,
    /// Base retry backoff (exponential strategy).
    pub retry_backoff: Duration,
    /// Soft byte budget for the read-ahead page queue. Must be positive;
    /// overshoot is at most one page.
    pub buffer_bytes: usize,
    /// Advertise and transparently decompress gzip/deflate responses.
    pub compression: bool,
    /// Header namespace prefix, e.g. `X-Trino`.
    pub header_namespace: String,
    /// TLS trust configuration.
    pub tls: TlsOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            statement_timeout: None,
            max_retries: 5,
            retry_backoff: Duration::from_millis(100),
            buffer_bytes: DEFAULT_BUFFER_BYTES,
            compression: true,
            header_namespace: DEFAULT_NAMESPACE.to_owned(),
            tls: TlsOptions::default(),
        }
    }
}

/// TLS trust material. The system trust store applies by default; each
/// relaxation below is opt-in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TlsOptions {
    /// Additional trusted root certificate, PEM-encoded.
    pub root_certificate_pem: Option<Vec<u8>>,
    /// Accept certificates whose CN/SAN does not match the host name.
    pub accept_invalid_hostnames: bool,
    /// Accept chains whose only error is an untrusted (self-signed) root.
    pub accept_self_signed: bool,
}

#[cfg(test)]
mod tests {
    use super::{ClientOptions, DEFAULT_BUFFER_BYTES};

    #[test]
    fn defaults() {
        let opts = ClientOptions::default();
        assert_eq!(opts.buffer_bytes, DEFAULT_BUFFER_BYTES);
        assert_eq!(opts.max_retries, 5);
        assert!(opts.compression);
        assert!(opts.statement_timeout.is_none());
        assert_eq!(opts.header_namespace, "X-Trino");
        assert!(opts.tls.root_certificate_pem.is_none());
    }
}
