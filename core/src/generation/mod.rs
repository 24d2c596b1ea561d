//! 对方回复生成：远程生成 → 安全过滤 → 确定性回退。

pub mod chain;
pub mod fallback;
mod generator;
#[cfg(feature = "http-generation")]
pub mod http;
pub mod traits;

pub use chain::{AttemptRecord, AttemptStep, GenerationOutcome, ReplySource, StepOutcome};
pub use fallback::FallbackResponder;
pub use generator::{GeneratorConfig, ResponseGenerator, INPUT_REFUSAL, OUTPUT_REPHRASE};
#[cfg(feature = "http-generation")]
pub use http::HttpGenerationService;
pub use traits::{GenerationError, GenerationRequest, GenerationResponse, GenerationService};
