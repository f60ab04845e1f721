//! Request transport for the catalog backend
//!
//! `Transport` is the seam between the cache layer and the network. The production
//! implementation is `HttpTransport` (reqwest); tests plug in in-memory backends.

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::domain::CatalogError;
use crate::infrastructure::config::Config;

/// One request against the backend origin
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the origin, always starting with `/`
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::PUT,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::DELETE,
            path: path.into(),
            body: None,
        }
    }
}

/// Issues requests and normalizes failures into `CatalogError`.
///
/// Success yields the parsed JSON body (`Value::Null` for an empty body, a JSON
/// string for a non-JSON body).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> Result<Value, CatalogError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self, CatalogError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| CatalogError::Config(format!("Failed to build client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url()?,
        })
    }

    fn url_for(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let prefix = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}{}", prefix, path));
        url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: ApiRequest) -> Result<Value, CatalogError> {
        let url = self.url_for(&request.path);
        tracing::debug!("{} {}", request.method, url);

        let mut builder = self.client.request(request.method.clone(), url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(CatalogError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        // Plain-text acknowledgements are passed through as a JSON string
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }
}

/// Payloads arrive either wrapped as `{ "data": ... }` or bare
pub fn decode_body<T: DeserializeOwned>(value: Value) -> Result<T, CatalogError> {
    let payload = match value {
        Value::Object(mut fields) if fields.contains_key("data") => {
            fields.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };
    serde_json::from_value(payload).map_err(|e| CatalogError::Decode(e.to_string()))
}

/// `/books/{id}` with the id percent-encoded
pub fn book_path(id: &str) -> String {
    format!("/books/{}", urlencoding::encode(id))
}
