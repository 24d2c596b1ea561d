use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::generation::traits::{
    GenerationError, GenerationRequest, GenerationResponse, GenerationService,
};

const TARGET: &str = "response_generator";

/// 通过 HTTP POST JSON 调用远程生成服务；阻塞请求放在 blocking 线程池执行。
#[derive(Clone)]
pub struct HttpGenerationService {
    agent: ureq::Agent,
    endpoint: String,
}

impl std::fmt::Debug for HttpGenerationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGenerationService")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl HttpGenerationService {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .build();
        Self {
            agent,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn complete(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        let body = serde_json::to_string(request)
            .map_err(|err| GenerationError::Malformed(format!("request encode failed: {err}")))?;
        let agent = self.agent.clone();
        let endpoint = self.endpoint.clone();

        let raw = tokio::task::spawn_blocking(move || -> Result<String, GenerationError> {
            let response = agent
                .post(&endpoint)
                .set("Content-Type", "application/json")
                .send_string(&body)
                .map_err(|err| match err {
                    ureq::Error::Status(code, _) => GenerationError::Status(code),
                    ureq::Error::Transport(transport) => {
                        GenerationError::Transport(transport.to_string())
                    }
                })?;
            response
                .into_string()
                .map_err(|err| GenerationError::Transport(err.to_string()))
        })
        .await
        .map_err(|err| GenerationError::Transport(format!("request task failed: {err}")))??;

        debug!(target: TARGET, bytes = raw.len(), "remote generation responded");

        serde_json::from_str::<GenerationResponse>(&raw)
            .map_err(|err| GenerationError::Malformed(err.to_string()))
    }
}
