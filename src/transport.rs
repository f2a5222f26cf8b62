//! Delivery of the recorded session to the data server
//!
//! One POST per session with a JSON body. Delivery is best effort: the
//! completion callback fires whether the request succeeded or not, and
//! nothing is retried.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no data server URL configured")]
    NoEndpoint,
    #[error("failed to encode session payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server answered with status {0}")]
    Status(u16),
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Called once the transmission settles
pub type Completion = Box<dyn FnOnce(Result<(), TransportError>)>;

pub trait Transport {
    /// POST `body` as `application/json` to `url`, then call `done`
    fn post_json(&self, url: &str, body: serde_json::Value, done: Completion);
}

/// A payload captured by `MemoryTransport`
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub url: String,
    pub body: serde_json::Value,
}

/// Keeps payloads in memory instead of sending them
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    deliveries: Rc<RefCell<Vec<Delivery>>>,
    fail: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose every delivery fails after being captured
    pub fn failing() -> Self {
        Self {
            deliveries: Rc::default(),
            fail: true,
        }
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.borrow().clone()
    }

    pub fn count(&self) -> usize {
        self.deliveries.borrow().len()
    }
}

impl Transport for MemoryTransport {
    fn post_json(&self, url: &str, body: serde_json::Value, done: Completion) {
        self.deliveries.borrow_mut().push(Delivery {
            url: url.to_string(),
            body,
        });
        if self.fail {
            done(Err(TransportError::Unavailable("memory transport set to fail".into())));
        } else {
            done(Ok(()));
        }
    }
}

/// Blocking HTTP client for the native runner
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

#[cfg(not(target_arch = "wasm32"))]
impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Transport for HttpTransport {
    fn post_json(&self, url: &str, body: serde_json::Value, done: Completion) {
        let result = self
            .client
            .post(url)
            .json(&body)
            .send()
            .map_err(TransportError::from)
            .and_then(|response| {
                let status = response.status();
                if status.is_success() {
                    Ok(())
                } else {
                    Err(TransportError::Status(status.as_u16()))
                }
            });
        done(result);
    }
}

/// Browser fetch client; the request runs on the page's task queue
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Clone, Default)]
pub struct FetchTransport {
    client: reqwest::Client,
}

#[cfg(target_arch = "wasm32")]
impl FetchTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(target_arch = "wasm32")]
impl Transport for FetchTransport {
    fn post_json(&self, url: &str, body: serde_json::Value, done: Completion) {
        let request = self.client.post(url).json(&body);
        wasm_bindgen_futures::spawn_local(async move {
            let result = match request.send().await {
                Ok(response) if response.status().is_success() => Ok(()),
                Ok(response) => Err(TransportError::Status(response.status().as_u16())),
                Err(e) => Err(TransportError::from(e)),
            };
            done(result);
        });
    }
}
