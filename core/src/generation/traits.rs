use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scenario::Scenario;
use crate::session::message::Message;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("remote generation timed out")]
    Timeout,
    #[error("remote generation transport error: {0}")]
    Transport(String),
    #[error("remote generation returned status {0}")]
    Status(u16),
    #[error("remote generation returned malformed response: {0}")]
    Malformed(String),
}

/// 发往远程生成服务的请求体。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub user_input: String,
    pub scenario: Scenario,
    pub history: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GenerationResponse {
    pub text: String,
}

/// 远程生成服务被视为不可靠：超时与错误属于常态。
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn complete(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError>;
}
