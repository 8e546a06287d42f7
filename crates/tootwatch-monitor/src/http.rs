//! Minimal HTTPS client over hyper + rustls.
//!
//! Every request opens its own TCP + TLS connection, sends one HTTP/1.1
//! request, and reads the whole body. The whole exchange is bounded by a
//! single timeout.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use serde::de::DeserializeOwned;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::{MonitorError, MonitorResult};

/// Standard HTTPS port.
pub const HTTPS_PORT: u16 = 443;

const DEFAULT_USER_AGENT: &str = concat!("tootwatch/", env!("CARGO_PKG_VERSION"));

/// A fully-read HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: String,
    pub status: StatusCode,
    pub body: Bytes,
}

impl Response {
    /// Fail unless the status is 2xx.
    pub fn error_for_status(self) -> MonitorResult<Self> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(MonitorError::Status {
                url: self.url,
                status: self.status.as_u16(),
            })
        }
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> MonitorResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| MonitorError::Decode {
            url: self.url.clone(),
            message: e.to_string(),
        })
    }
}

/// HTTPS client verifying servers against the Mozilla root store.
#[derive(Clone)]
pub struct HttpsClient {
    connector: TlsConnector,
    timeout: Duration,
    user_agent: String,
}

impl HttpsClient {
    /// Create a client whose requests and handshakes time out after `timeout`.
    pub fn new(timeout: Duration) -> MonitorResult<Self> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder_with_provider(
            rustls::crypto::ring::default_provider().into(),
        )
        .with_safe_default_protocol_versions()
        .map_err(|e| MonitorError::Tls {
            host: String::new(),
            message: format!("tls protocol version error: {e}"),
        })?
        .with_root_certificates(root_store)
        .with_no_client_auth();

        Ok(Self::with_config(Arc::new(config), timeout))
    }

    /// Create a client from a pre-built rustls configuration.
    pub fn with_config(config: Arc<rustls::ClientConfig>, timeout: Duration) -> Self {
        Self {
            connector: TlsConnector::from(config),
            timeout,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Open a verified TLS connection to `host:port`.
    pub async fn connect(&self, host: &str, port: u16) -> MonitorResult<TlsStream<TcpStream>> {
        let what = format!("TLS connect to {host}:{port}");
        tokio::time::timeout(self.timeout, self.connect_inner(host, port))
            .await
            .map_err(|_| MonitorError::Timeout(what))?
    }

    async fn connect_inner(&self, host: &str, port: u16) -> MonitorResult<TlsStream<TcpStream>> {
        let server_name = ServerName::try_from(host.to_string()).map_err(|e| MonitorError::Tls {
            host: host.to_string(),
            message: e.to_string(),
        })?;

        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| MonitorError::Connect {
                host: host.to_string(),
                message: e.to_string(),
            })?;

        self.connector
            .connect(server_name, stream)
            .await
            .map_err(|e| MonitorError::Tls {
                host: host.to_string(),
                message: e.to_string(),
            })
    }

    /// `GET https://{host}{path}`.
    pub async fn get(&self, host: &str, path: &str, bearer: Option<&str>) -> MonitorResult<Response> {
        self.send(Method::GET, host, path, bearer, None).await
    }

    /// `POST https://{host}{path}` with a JSON body.
    pub async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        host: &str,
        path: &str,
        bearer: Option<&str>,
        body: &T,
    ) -> MonitorResult<Response> {
        let url = format!("https://{host}{path}");
        let payload = serde_json::to_vec(body).map_err(|e| MonitorError::Http {
            url,
            message: e.to_string(),
        })?;
        self.send(Method::POST, host, path, bearer, Some(payload)).await
    }

    async fn send(
        &self,
        method: Method,
        host: &str,
        path: &str,
        bearer: Option<&str>,
        body: Option<Vec<u8>>,
    ) -> MonitorResult<Response> {
        let url = format!("https://{host}{path}");
        let what = format!("{method} {url}");
        tokio::time::timeout(self.timeout, self.send_inner(method, host, path, &url, bearer, body))
            .await
            .map_err(|_| MonitorError::Timeout(what))?
    }

    async fn send_inner(
        &self,
        method: Method,
        host: &str,
        path: &str,
        url: &str,
        bearer: Option<&str>,
        body: Option<Vec<u8>>,
    ) -> MonitorResult<Response> {
        let http_err = |message: String| MonitorError::Http {
            url: url.to_string(),
            message,
        };

        let stream = self.connect_inner(host, HTTPS_PORT).await?;
        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| http_err(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "https connection closed with error");
            }
        });

        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header(HOST, host)
            .header(USER_AGENT, self.user_agent.as_str())
            .header(ACCEPT, "application/json");
        if let Some(token) = bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(payload) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Full::new(Bytes::from(payload))),
            None => builder.body(Full::new(Bytes::new())),
        }
        .map_err(|e| http_err(e.to_string()))?;

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| http_err(e.to_string()))?;
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| http_err(e.to_string()))?
            .to_bytes();

        debug!(%url, %status, bytes = body.len(), "https response");
        Ok(Response {
            url: url.to_string(),
            status,
            body,
        })
    }
}
