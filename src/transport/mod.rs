//! # HTTP Transport
//!
//! Every call to the search engine goes through the [`Transport`] trait. The
//! production implementation is [`HttpTransport`] (reqwest + rustls, root of trust
//! pinned to the generated CA); tests script replies with [`mock::ScriptedTransport`].
//!
//! A transport only moves bytes. Judging a reply is up to the caller, which is why
//! [`Reply`] keeps the raw status and body.

pub mod error;
pub mod http;
pub mod mock;

pub use error::TransportError;
pub use http::HttpTransport;

use crate::config::{Secret, StackConfig};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
}

/// Basic-auth credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Secret,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: Secret) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    /// The administrative account from the configuration.
    pub fn admin(config: &StackConfig) -> Self {
        Self::new(&config.elastic_user, config.elastic_password.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(Value),
    /// Newline-delimited JSON, sent as `application/x-ndjson`.
    NdJson(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    /// Path and query, starting with `/`.
    pub path: String,
    pub auth: Option<Credentials>,
    pub body: Option<Body>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            auth: None,
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn head(path: impl Into<String>) -> Self {
        Self::new(Method::Head, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_auth(mut self, credentials: Credentials) -> Self {
        self.auth = Some(credentials);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(Body::Json(body));
        self
    }

    pub fn ndjson(mut self, body: String) -> Self {
        self.body = Some(Body::NdJson(body));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one request. Non-2xx statuses are replies, not errors.
    async fn send(&self, request: Request) -> Result<Reply, TransportError>;
}
