// src/dispatch/transport.rs

use std::time::Duration;

use crate::common::error::DeliveryError;

/// Blocking "POST JSON, return status or error" primitive.
///
/// Shared by every acquisition thread, hence `Send + Sync`.
pub trait EventTransport: Send + Sync {
    /// Posts `body` with `Content-Type: application/json`. `Ok` carries a 2xx status.
    fn post_json(&self, url: &str, body: &str) -> Result<u16, DeliveryError>;
}

/// HTTP transport on a `ureq` agent with a hard overall timeout.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        UreqTransport { agent }
    }
}

impl EventTransport for UreqTransport {
    fn post_json(&self, url: &str, body: &str) -> Result<u16, DeliveryError> {
        match self
            .agent
            .post(url)
            .set("Content-Type", "application/json")
            .send_string(body)
        {
            Ok(response) => {
                let status = response.status();
                if (200..300).contains(&status) {
                    Ok(status)
                } else {
                    Err(DeliveryError::Status(status))
                }
            }
            Err(ureq::Error::Status(status, _)) => Err(DeliveryError::Status(status)),
            Err(other) => Err(DeliveryError::Transport(other.to_string())),
        }
    }
}
