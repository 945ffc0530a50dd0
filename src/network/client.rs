use std::time::Duration;

use crate::config::NetworkConfig;
use crate::error::NetworkError;
use crate::messaging::CommandEnvelope;
use crate::state::DeviceSettings;

use super::payload::ResultPayload;

pub const RESULT_ENDPOINT: &str = "/processed_data_upload";
pub const FRAME_ENDPOINT: &str = "/video_upload";
pub const COMMAND_ENDPOINT: &str = "/get_command";
pub const CONFIG_ENDPOINT: &str = "/report_config";

/// The viewer server as seen by the device.
pub trait RemoteServer: Send + Sync {
    fn upload_result(&self, payload: &ResultPayload) -> Result<(), NetworkError>;

    fn upload_frame(&self, jpeg: &[u8]) -> Result<(), NetworkError>;

    fn fetch_command(&self) -> Result<CommandEnvelope, NetworkError>;

    fn report_config(&self, settings: &DeviceSettings) -> Result<(), NetworkError>;
}

/// HTTP implementation backed by a shared `ureq` agent.
///
/// Every request is bounded by the agent's connect/read timeouts; polls and
/// preview frames use tighter per-request limits.
pub struct HttpServer {
    base_url: String,
    agent: ureq::Agent,
    poll_timeout: Duration,
    frame_timeout: Duration,
}

impl HttpServer {
    pub fn new(config: &NetworkConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_millis(config.connect_timeout_ms))
            .timeout_read(Duration::from_millis(config.read_timeout_ms))
            .user_agent(&format!("TargetScorer/{}", env!("CARGO_PKG_VERSION")))
            .build();

        Self {
            base_url: config.server_url.trim_end_matches('/').to_string(),
            agent,
            poll_timeout: Duration::from_millis(config.poll_timeout_ms),
            frame_timeout: Duration::from_millis(config.frame_timeout_ms),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }
}

fn request_error(endpoint: &'static str, err: ureq::Error) -> NetworkError {
    match err {
        ureq::Error::Status(status, _) => NetworkError::Status { endpoint, status },
        other => NetworkError::Transport {
            endpoint,
            source: Box::new(other),
        },
    }
}

impl RemoteServer for HttpServer {
    fn upload_result(&self, payload: &ResultPayload) -> Result<(), NetworkError> {
        self.agent
            .post(&self.url(RESULT_ENDPOINT))
            .send_json(payload)
            .map_err(|e| request_error(RESULT_ENDPOINT, e))?;
        Ok(())
    }

    fn upload_frame(&self, jpeg: &[u8]) -> Result<(), NetworkError> {
        self.agent
            .post(&self.url(FRAME_ENDPOINT))
            .set("Content-Type", "image/jpeg")
            .timeout(self.frame_timeout)
            .send_bytes(jpeg)
            .map_err(|e| request_error(FRAME_ENDPOINT, e))?;
        Ok(())
    }

    fn fetch_command(&self) -> Result<CommandEnvelope, NetworkError> {
        let response = self
            .agent
            .get(&self.url(COMMAND_ENDPOINT))
            .timeout(self.poll_timeout)
            .call()
            .map_err(|e| request_error(COMMAND_ENDPOINT, e))?;

        response
            .into_json::<CommandEnvelope>()
            .map_err(|source| NetworkError::Decode {
                endpoint: COMMAND_ENDPOINT,
                source,
            })
    }

    fn report_config(&self, settings: &DeviceSettings) -> Result<(), NetworkError> {
        self.agent
            .post(&self.url(CONFIG_ENDPOINT))
            .send_json(settings)
            .map_err(|e| request_error(CONFIG_ENDPOINT, e))?;
        Ok(())
    }
}
