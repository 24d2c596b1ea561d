use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// 转写源推送的单个事件；聚合器只读不改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
    pub confidence: f32,
    pub timestamp: SystemTime,
}

impl TranscriptEvent {
    pub fn interim<S: Into<String>>(text: S, confidence: f32) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            confidence,
            timestamp: SystemTime::now(),
        }
    }

    pub fn final_result<S: Into<String>>(text: S, confidence: f32) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            confidence,
            timestamp: SystemTime::now(),
        }
    }

    /// 文本模式下用户直接输入的内容，按置信度 1.0 的最终事件处理。
    pub fn typed<S: Into<String>>(text: S) -> Self {
        Self::final_result(text, 1.0)
    }

    /// 非法置信度（NaN、越界）收敛到 [0, 1]。
    pub fn clamped_confidence(&self) -> f32 {
        if self.confidence.is_nan() {
            0.0
        } else {
            self.confidence.clamp(0.0, 1.0)
        }
    }
}
