//! 有序尝试链：每一步给出 Success / Skip / Fail，由单一折叠求值。

use serde::Serialize;

use crate::generation::traits::GenerationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttemptStep {
    Remote,
    Fallback,
}

impl AttemptStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStep::Remote => "remote",
            AttemptStep::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Success(String),
    /// 该步骤未执行，例如未配置远程服务或被限流。
    Skip(String),
    Fail(GenerationError),
}

impl StepOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            StepOutcome::Success(_) => "success",
            StepOutcome::Skip(_) => "skip",
            StepOutcome::Fail(_) => "fail",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub step: AttemptStep,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReplySource {
    Remote,
    Fallback,
    /// 用户输入被拦截，返回固定的角色内拒绝。
    SafetyRefusal,
    /// 生成结果被拦截，替换为固定的改述提示。
    Rephrased,
}

impl ReplySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplySource::Remote => "remote",
            ReplySource::Fallback => "fallback",
            ReplySource::SafetyRefusal => "safety_refusal",
            ReplySource::Rephrased => "rephrased",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutcome {
    pub text: String,
    pub source: ReplySource,
    /// 过滤后的用户输入；输入被拦截时为 None。
    pub sanitized_input: Option<String>,
    pub attempts: Vec<AttemptRecord>,
}

impl GenerationOutcome {
    pub fn is_degraded(&self) -> bool {
        self.attempts.iter().any(|record| {
            record.step == AttemptStep::Remote && !matches!(record.outcome, StepOutcome::Success(_))
        })
    }
}

/// 折叠已执行步骤的结果：第一个 Success 胜出。
pub(crate) fn settle(records: &[AttemptRecord]) -> Option<(AttemptStep, &str)> {
    records.iter().find_map(|record| match &record.outcome {
        StepOutcome::Success(text) => Some((record.step, text.as_str())),
        StepOutcome::Skip(_) | StepOutcome::Fail(_) => None,
    })
}
