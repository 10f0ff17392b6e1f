//! HTTP execution with retry of transient failures.

use std::time::Duration;

use reqwest::{header::HeaderMap, Certificate, RequestBuilder, StatusCode};
use tokio::time::sleep;

use crate::{ClientOptions, Result, TrinoError};

/// A fully read response: status, headers, and body text.
pub(crate) struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

pub(crate) struct HttpTransport {
    client: reqwest::Client,
    max_retries: usize,
    retry_backoff: Duration,
}

impl HttpTransport {
    pub fn new(options: &ClientOptions) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .gzip(options.compression)
            .deflate(options.compression);

        if let Some(pem) = &options.tls.root_certificate_pem {
            let certificate = Certificate::from_pem(pem).map_err(TrinoError::Transport)?;
            builder = builder.add_root_certificate(certificate);
        }
        if options.tls.accept_invalid_hostnames {
            builder = builder.danger_accept_invalid_hostnames(true);
        }
        if options.tls.accept_self_signed {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(TrinoError::Transport)?;
        Ok(Self {
            client,
            max_retries: options.max_retries,
            retry_backoff: options.retry_backoff,
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Sends a request, retrying transient statuses and connection failures
    /// with capped exponential backoff. A status outside `expected` that is
    /// not transient fails immediately with the body text attached.
    pub async fn send(
        &self,
        request: RequestBuilder,
        expected: &[StatusCode],
    ) -> Result<RawResponse> {
        let mut attempt = 0usize;
        loop {
            let this_attempt = request.try_clone().ok_or_else(|| {
                TrinoError::Usage("request body must be clonable for retry".to_owned())
            })?;

            match this_attempt.send().await {
                Ok(response) => {
                    let status = response.status();
                    let headers = response.headers().clone();
                    let body = response.text().await.map_err(TrinoError::Transport)?;

                    if expected.contains(&status) {
                        return Ok(RawResponse {
                            status,
                            headers,
                            body,
                        });
                    }
                    if is_transient_status(status) && attempt < self.max_retries {
                        self.wait_before_retry(attempt, &format!("status {status}")).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(TrinoError::Http {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(err) => {
                    if is_transient_error(&err) && attempt < self.max_retries {
                        self.wait_before_retry(attempt, &err.to_string()).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(TrinoError::Transport(err));
                }
            }
        }
    }

    async fn wait_before_retry(&self, attempt: usize, cause: &str) {
        let delay = retry_delay(self.retry_backoff, attempt);
        tracing::warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            cause,
            "retrying transient http failure"
        );
        sleep(delay).await;
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_transient_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

fn retry_delay(base: Duration, attempt: usize) -> Duration {
    let exp = attempt.min(16) as u32;
    let delay = base.saturating_mul(1 << exp);
    delay.min(Duration::from_secs(10))
}
