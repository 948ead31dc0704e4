//! The synchronous HTTP bridge contract (spec.md §1, §4.5).
//!
//! Plugin code is fully synchronous from its own perspective, so `net.send`
//! must block the calling host thread until a response (or error) is
//! available. The core never speaks HTTP itself — it delegates every
//! outbound request to whatever the embedder injects here.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct BridgeRequest {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct BridgeResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Error, Debug, Clone)]
pub enum BridgeError {
    #[error("request failed: {0}")]
    Failed(String),
}

/// Implemented by an embedder-supplied collaborator; the core only ever
/// calls `send` through this trait object.
pub trait HttpBridge: Send + Sync {
    fn send(&self, request: BridgeRequest) -> Result<BridgeResponse, BridgeError>;
}

#[cfg(feature = "blocking-bridge")]
pub struct ReqwestBlockingBridge {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "blocking-bridge")]
impl ReqwestBlockingBridge {
    pub fn new() -> Result<Self, BridgeError> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| BridgeError::Failed(e.to_string()))?;
        Ok(Self { client })
    }
}

#[cfg(feature = "blocking-bridge")]
impl Default for ReqwestBlockingBridge {
    fn default() -> Self {
        Self::new().expect("failed to build default reqwest client")
    }
}

#[cfg(feature = "blocking-bridge")]
impl HttpBridge for ReqwestBlockingBridge {
    fn send(&self, request: BridgeRequest) -> Result<BridgeResponse, BridgeError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| BridgeError::Failed(e.to_string()))?;
        let mut builder = self.client.request(method, &request.url);
        for (k, v) in &request.headers {
            builder = builder.header(k, v);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let response = builder.send().map_err(|e| BridgeError::Failed(e.to_string()))?;
        let status_code = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();
        let body = response.bytes().map_err(|e| BridgeError::Failed(e.to_string()))?.to_vec();
        Ok(BridgeResponse { status_code, headers, body })
    }
}
