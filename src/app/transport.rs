use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// HTTP verb used to write a record back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMethod {
    /// Update an existing record.
    Put,
    /// Create a new record.
    Post,
}

impl fmt::Display for SendMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendMethod::Put => f.write_str("PUT"),
            SendMethod::Post => f.write_str("POST"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("record at {url} was changed concurrently")]
    Changed { url: String },
    #[error("{method} {url} returned status {status}")]
    Status {
        method: String,
        url: String,
        status: u16,
    },
    #[error("{method} {url} failed: {message}")]
    Request {
        method: String,
        url: String,
        message: String,
    },
    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Network seam of a form. Timeouts and retries of individual requests belong here.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<Value, TransportError>;

    async fn send(
        &self,
        method: SendMethod,
        url: &str,
        body: &Value,
    ) -> Result<Value, TransportError>;
}

/// Error `type` tag servers use to flag an optimistic-concurrency conflict.
pub const CHANGED_ERROR_TYPE: &str = "ChangedError";

pub(crate) fn is_changed_body(body: &Value) -> bool {
    body.get("type").and_then(Value::as_str) == Some(CHANGED_ERROR_TYPE)
}

#[cfg(feature = "http")]
pub use http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::{Client, Method, RequestBuilder, StatusCode};
    use serde_json::Value;

    use super::{SendMethod, Transport, TransportError, is_changed_body};

    /// JSON-over-HTTP transport backed by `reqwest`.
    #[derive(Debug, Clone)]
    pub struct HttpTransport {
        client: Client,
        base_url: Option<String>,
    }

    impl Default for HttpTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl HttpTransport {
        pub fn new() -> Self {
            Self::with_client(Client::new())
        }

        pub fn with_client(client: Client) -> Self {
            Self {
                client,
                base_url: None,
            }
        }

        pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
            let client = Client::builder().timeout(timeout).build()?;
            Ok(Self::with_client(client))
        }

        /// Prefix applied to relative URLs such as `/rest/users/1`.
        pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
            self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
            self
        }

        fn resolve(&self, url: &str) -> String {
            match &self.base_url {
                Some(base) if url.starts_with('/') => format!("{base}{url}"),
                _ => url.to_string(),
            }
        }

        async fn execute(
            &self,
            method: Method,
            url: &str,
            request: RequestBuilder,
        ) -> Result<Value, TransportError> {
            let request_error = |err: reqwest::Error| TransportError::Request {
                method: method.to_string(),
                url: url.to_string(),
                message: err.to_string(),
            };
            let response = request.send().await.map_err(request_error)?;
            let status = response.status();
            let bytes = response.bytes().await.map_err(request_error)?;
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                match serde_json::from_slice::<Value>(&bytes) {
                    Ok(body) => body,
                    Err(source) if status.is_success() => {
                        return Err(TransportError::Decode {
                            url: url.to_string(),
                            source,
                        });
                    }
                    Err(_) => Value::Null,
                }
            };

            if status == StatusCode::CONFLICT || is_changed_body(&body) {
                return Err(TransportError::Changed {
                    url: url.to_string(),
                });
            }
            if !status.is_success() {
                return Err(TransportError::Status {
                    method: method.to_string(),
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
            Ok(body)
        }
    }

    #[async_trait]
    impl Transport for HttpTransport {
        async fn get(&self, url: &str) -> Result<Value, TransportError> {
            let url = self.resolve(url);
            tracing::debug!(%url, "GET");
            let request = self.client.get(&url);
            self.execute(Method::GET, &url, request).await
        }

        async fn send(
            &self,
            method: SendMethod,
            url: &str,
            body: &Value,
        ) -> Result<Value, TransportError> {
            let url = self.resolve(url);
            tracing::debug!(%url, %method, "sending form payload");
            let (verb, request) = match method {
                SendMethod::Put => (Method::PUT, self.client.put(&url)),
                SendMethod::Post => (Method::POST, self.client.post(&url)),
            };
            self.execute(verb, &url, request.json(body)).await
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recognises_changed_error_bodies() {
        assert!(is_changed_body(&json!({"type": "ChangedError", "message": "x"})));
        assert!(!is_changed_body(&json!({"type": "NotFoundError"})));
        assert!(!is_changed_body(&Value::Null));
    }

    #[test]
    fn send_method_display() {
        assert_eq!(SendMethod::Put.to_string(), "PUT");
        assert_eq!(SendMethod::Post.to_string(), "POST");
    }
}
