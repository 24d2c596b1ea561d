use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::generation::chain::{
    settle, AttemptRecord, AttemptStep, GenerationOutcome, ReplySource, StepOutcome,
};
use crate::generation::fallback::{generic_rebuttals, FallbackResponder};
use crate::generation::traits::{GenerationError, GenerationRequest, GenerationService};
use crate::rate_limit::{RateDecision, RateLimiter};
use crate::safety::{self, SafetyContext, SafetyVerdict};
use crate::scenario::Scenario;
use crate::session::message::{Message, Speaker};
use crate::telemetry::events::{record_generation_degraded, record_safety_block};

const TARGET: &str = "response_generator";
const ANONYMOUS_RATE_KEY: &str = "anonymous";

/// 尝试顺序固定：远程优先，确定性回退兜底。
const ATTEMPT_ORDER: [AttemptStep; 2] = [AttemptStep::Remote, AttemptStep::Fallback];

pub const INPUT_REFUSAL: &str =
    "Let's keep this professional. I'm happy to keep talking about your proposal, though.";
pub const OUTPUT_REPHRASE: &str = "Sorry, let me rephrase that. What were you saying about your offer?";

#[derive(Debug, Clone, Copy)]
pub struct GeneratorConfig {
    pub remote_timeout: Duration,
    pub history_window: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            remote_timeout: Duration::from_secs(8),
            history_window: 6,
        }
    }
}

/// 生成对方的下一句台词。所有失败在内部吸收，对外总是返回非空文本。
pub struct ResponseGenerator {
    config: GeneratorConfig,
    remote: Option<Arc<dyn GenerationService>>,
    rate_limiter: Option<Arc<RateLimiter>>,
    fallback: FallbackResponder,
}

impl std::fmt::Debug for ResponseGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseGenerator")
            .field("config", &self.config)
            .field("has_remote", &self.remote.is_some())
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}

impl ResponseGenerator {
    /// 仅使用确定性回退。
    pub fn fallback_only(seed: Option<u64>) -> Self {
        Self::with_components(GeneratorConfig::default(), None, None, FallbackResponder::new(seed))
    }

    pub fn with_remote(config: GeneratorConfig, remote: Arc<dyn GenerationService>) -> Self {
        Self::with_components(config, Some(remote), None, FallbackResponder::default())
    }

    pub fn with_components(
        config: GeneratorConfig,
        remote: Option<Arc<dyn GenerationService>>,
        rate_limiter: Option<Arc<RateLimiter>>,
        fallback: FallbackResponder,
    ) -> Self {
        Self {
            config,
            remote,
            rate_limiter,
            fallback,
        }
    }

    pub fn config(&self) -> GeneratorConfig {
        self.config
    }

    pub async fn generate(&self, user_input: &str, scenario: &Scenario, history: &[Message]) -> String {
        self.generate_for(ANONYMOUS_RATE_KEY, user_input, scenario, history)
            .await
            .text
    }

    pub async fn generate_for(
        &self,
        rate_key: &str,
        user_input: &str,
        scenario: &Scenario,
        history: &[Message],
    ) -> GenerationOutcome {
        let input_verdict = screen(user_input, SafetyContext::UserInput);
        if input_verdict.blocked {
            debug!(
                target: TARGET,
                issues = ?input_verdict.issues,
                "user input blocked, skipping generation"
            );
            return GenerationOutcome {
                text: INPUT_REFUSAL.to_string(),
                source: ReplySource::SafetyRefusal,
                sanitized_input: None,
                attempts: Vec::new(),
            };
        }

        let first_turn = !history
            .iter()
            .any(|message| message.sender == Speaker::Counterpart);
        let window_start = history.len().saturating_sub(self.config.history_window);
        let request = GenerationRequest {
            user_input: input_verdict.sanitized_text,
            scenario: scenario.clone(),
            history: history[window_start..].to_vec(),
        };

        let mut records: Vec<AttemptRecord> = Vec::with_capacity(ATTEMPT_ORDER.len());
        for step in ATTEMPT_ORDER {
            let outcome = match step {
                AttemptStep::Remote => self.attempt_remote(rate_key, &request).await,
                AttemptStep::Fallback => StepOutcome::Success(self.fallback.respond(
                    &request.user_input,
                    scenario,
                    first_turn,
                )),
            };

            let succeeded = matches!(outcome, StepOutcome::Success(_));
            match &outcome {
                StepOutcome::Skip(reason) => {
                    record_generation_degraded(step.as_str(), outcome.label(), reason)
                }
                StepOutcome::Fail(err) => {
                    record_generation_degraded(step.as_str(), outcome.label(), &err.to_string())
                }
                StepOutcome::Success(_) => {}
            }
            records.push(AttemptRecord { step, outcome });
            if succeeded {
                break;
            }
        }

        let (step, candidate) = match settle(&records) {
            Some((step, text)) => (step, text.to_string()),
            None => {
                warn!(target: TARGET, "attempt chain produced no reply, using generic rebuttal");
                let generic = generic_rebuttals(scenario.objection_category());
                (
                    AttemptStep::Fallback,
                    generic.first().copied().unwrap_or(OUTPUT_REPHRASE).to_string(),
                )
            }
        };

        let output_verdict = screen(&candidate, SafetyContext::ModelOutput);
        let (text, source) = if output_verdict.blocked {
            (OUTPUT_REPHRASE.to_string(), ReplySource::Rephrased)
        } else {
            let source = match step {
                AttemptStep::Remote => ReplySource::Remote,
                AttemptStep::Fallback => ReplySource::Fallback,
            };
            (output_verdict.sanitized_text, source)
        };

        GenerationOutcome {
            text,
            source,
            sanitized_input: Some(request.user_input),
            attempts: records,
        }
    }

    /// 会话开场时对方先说的异议，经过输出过滤。
    pub fn opening_line(&self, scenario: &Scenario) -> String {
        let candidate = self.fallback.opening(scenario);
        let verdict = screen(&candidate, SafetyContext::ModelOutput);
        if verdict.blocked {
            OUTPUT_REPHRASE.to_string()
        } else {
            verdict.sanitized_text
        }
    }

    async fn attempt_remote(&self, rate_key: &str, request: &GenerationRequest) -> StepOutcome {
        let Some(remote) = self.remote.as_ref() else {
            return StepOutcome::Skip("remote generation not configured".to_string());
        };

        if let Some(limiter) = self.rate_limiter.as_ref() {
            if let RateDecision::Limited { retry_after } = limiter.try_acquire(rate_key) {
                return StepOutcome::Skip(format!(
                    "rate limited, retry after {}ms",
                    retry_after.as_millis()
                ));
            }
        }

        match timeout(self.config.remote_timeout, remote.complete(request)).await {
            Err(_) => StepOutcome::Fail(GenerationError::Timeout),
            Ok(Err(err)) => StepOutcome::Fail(err),
            Ok(Ok(response)) => {
                let text = response.text.trim();
                if text.is_empty() {
                    StepOutcome::Fail(GenerationError::Malformed("empty text".to_string()))
                } else {
                    StepOutcome::Success(text.to_string())
                }
            }
        }
    }
}

/// 过滤器本身无副作用，拦截事件在这里记录。
fn screen(text: &str, context: SafetyContext) -> SafetyVerdict {
    let verdict = safety::analyze(text, context);
    if verdict.blocked {
        record_safety_block(context.as_str(), &verdict.issues);
    }
    verdict
}
