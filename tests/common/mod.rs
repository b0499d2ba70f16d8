#![allow(dead_code)]

use std::time::Duration;

use async_trait::async_trait;
use formctl::{SendMethod, Transport, TransportError};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
}

/// One request seen by the mock server, waiting for the test to answer it.
pub struct Exchange {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
    reply: oneshot::Sender<Result<Value, TransportError>>,
}

impl Exchange {
    pub fn reply(self, body: Value) {
        let _ = self.reply.send(Ok(body));
    }

    pub fn fail(self, error: TransportError) {
        let _ = self.reply.send(Err(error));
    }
}

pub struct MockTransport {
    exchanges: mpsc::UnboundedSender<Exchange>,
}

pub struct MockServer {
    exchanges: mpsc::UnboundedReceiver<Exchange>,
}

pub fn mock() -> (MockTransport, MockServer) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        MockTransport { exchanges: sender },
        MockServer {
            exchanges: receiver,
        },
    )
}

impl MockServer {
    pub async fn next(&mut self) -> Exchange {
        tokio::time::timeout(Duration::from_secs(5), self.exchanges.recv())
            .await
            .expect("timed out waiting for a request")
            .expect("transport dropped")
    }

    /// Returns a request only if one is already queued.
    pub fn try_next(&mut self) -> Option<Exchange> {
        self.exchanges.try_recv().ok()
    }
}

impl MockTransport {
    async fn exchange(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        let (reply, response) = oneshot::channel();
        let dropped = || TransportError::Request {
            method: format!("{method:?}"),
            url: url.to_string(),
            message: "mock server went away".to_string(),
        };
        self.exchanges
            .send(Exchange {
                method,
                url: url.to_string(),
                body,
                reply,
            })
            .map_err(|_| dropped())?;
        response.await.unwrap_or_else(|_| Err(dropped()))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &str) -> Result<Value, TransportError> {
        self.exchange(Method::Get, url, None).await
    }

    async fn send(
        &self,
        method: SendMethod,
        url: &str,
        body: &Value,
    ) -> Result<Value, TransportError> {
        let method = match method {
            SendMethod::Put => Method::Put,
            SendMethod::Post => Method::Post,
        };
        self.exchange(method, url, Some(body.clone())).await
    }
}

/// Lets spawned controller tasks run until they block.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

pub fn record(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

pub fn server_error(url: &str, status: u16) -> TransportError {
    TransportError::Status {
        method: "POST".to_string(),
        url: url.to_string(),
        status,
    }
}
