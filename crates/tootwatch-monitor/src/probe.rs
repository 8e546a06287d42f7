//! Per-server probes: reported software version and certificate expiry.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::error::{MonitorError, MonitorResult};
use crate::http::{HttpsClient, HTTPS_PORT};
use crate::BoxFuture;

/// Instance metadata endpoints, newest first.
const INSTANCE_PATHS: [&str; 2] = ["/api/v2/instance", "/api/v1/instance"];

/// Network access to one monitored server.
pub trait InstanceProbe: Send + Sync {
    /// Fetch the version the server reports about itself.
    fn fetch_version<'a>(&'a self, web_domain: &'a str) -> BoxFuture<'a, MonitorResult<String>>;

    /// Fetch the `notAfter` timestamp of the server's leaf certificate.
    fn fetch_cert_expiry<'a>(
        &'a self,
        web_domain: &'a str,
    ) -> BoxFuture<'a, MonitorResult<DateTime<Utc>>>;
}

#[derive(Debug, Deserialize)]
struct InstancePayload {
    version: String,
}

/// Probe backed by real HTTPS requests and TLS handshakes.
#[derive(Clone)]
pub struct HttpsProbe {
    client: HttpsClient,
}

impl HttpsProbe {
    pub fn new(client: HttpsClient) -> Self {
        Self { client }
    }

    async fn version(&self, web_domain: &str) -> MonitorResult<String> {
        let mut last_error = None;
        for path in INSTANCE_PATHS {
            let response = self.client.get(web_domain, path, None).await?;
            match response.error_for_status() {
                Ok(response) => {
                    let payload: InstancePayload = response.json()?;
                    return Ok(payload.version);
                }
                // Servers older than 4.0 only answer the v1 endpoint.
                Err(e) => {
                    debug!(%web_domain, %path, error = %e, "instance endpoint unavailable");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| MonitorError::Http {
            url: format!("https://{web_domain}"),
            message: "no instance endpoint answered".to_string(),
        }))
    }

    async fn cert_expiry(&self, web_domain: &str) -> MonitorResult<DateTime<Utc>> {
        let stream = self.client.connect(web_domain, HTTPS_PORT).await?;
        let (_, connection) = stream.get_ref();
        let leaf = connection
            .peer_certificates()
            .and_then(|certs| certs.first())
            .ok_or_else(|| MonitorError::Certificate {
                host: web_domain.to_string(),
                message: "no peer certificate presented".to_string(),
            })?;
        let expiry = cert_not_after(leaf.as_ref()).map_err(|message| MonitorError::Certificate {
            host: web_domain.to_string(),
            message,
        })?;
        debug!(%web_domain, %expiry, "certificate expiry read");
        Ok(expiry)
    }
}

impl InstanceProbe for HttpsProbe {
    fn fetch_version<'a>(&'a self, web_domain: &'a str) -> BoxFuture<'a, MonitorResult<String>> {
        Box::pin(self.version(web_domain))
    }

    fn fetch_cert_expiry<'a>(
        &'a self,
        web_domain: &'a str,
    ) -> BoxFuture<'a, MonitorResult<DateTime<Utc>>> {
        Box::pin(self.cert_expiry(web_domain))
    }
}

/// Extract the `notAfter` field from a DER-encoded X.509 certificate.
pub fn cert_not_after(der: &[u8]) -> Result<DateTime<Utc>, String> {
    let (_, cert) = x509_parser::parse_x509_certificate(der).map_err(|e| e.to_string())?;
    let timestamp = cert.validity().not_after.timestamp();
    DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| format!("notAfter out of range: {timestamp}"))
}
