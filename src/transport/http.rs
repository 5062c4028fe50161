use super::{Body, Method, Reply, Request, Transport, TransportError};
use crate::config::StackConfig;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Certificate, Client, Url};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// [`Transport`] over HTTPS with a pinned root CA.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base: String,
}

impl HttpTransport {
    /// `ca_cert` is required for `https` base URLs and ignored otherwise.
    pub fn new(
        base_url: &str,
        ca_cert: Option<&Path>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let url = Url::parse(base_url).map_err(|e| TransportError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        let mut builder = Client::builder().use_rustls_tls().timeout(timeout);
        if url.scheme() == "https" {
            let path = ca_cert.ok_or_else(|| TransportError::Ca {
                path: Default::default(),
                reason: "no CA certificate configured for an https endpoint".to_string(),
            })?;
            builder = builder.add_root_certificate(load_ca(path)?);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &StackConfig) -> Result<Self, TransportError> {
        Self::new(
            &config.es_url,
            Some(config.ca_cert_path().as_path()),
            config.request_timeout,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }
}

fn load_ca(path: &Path) -> Result<Certificate, TransportError> {
    let pem = std::fs::read(path).map_err(|e| TransportError::Ca {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Certificate::from_pem(&pem).map_err(|e| TransportError::Ca {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Reply, TransportError> {
        let url = format!("{}{}", self.base, request.path);
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, &url);
        if let Some(auth) = &request.auth {
            builder = builder.basic_auth(&auth.username, Some(auth.password.expose()));
        }
        builder = match request.body {
            Some(Body::Json(value)) => builder.json(&value),
            Some(Body::NdJson(text)) => builder
                .header(CONTENT_TYPE, "application/x-ndjson")
                .body(text),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(method = ?request.method, path = %request.path, status, "HTTP reply");
        Ok(Reply { status, body })
    }
}
