use std::sync::Mutex;

use serde::Serialize;
use tracing::debug;

use crate::transcription::event::TranscriptEvent;

const TARGET: &str = "transcription";

pub(crate) const DEFAULT_LOW_CONFIDENCE_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AggregatorPhase {
    Empty,
    Accumulating,
    Finalized,
}

/// 聚合器对外暴露的转写快照。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionTranscript {
    pub full_text: String,
    pub interim_preview: Option<String>,
    pub running_confidence: Option<f32>,
    pub low_confidence: bool,
    pub final_events: usize,
    pub phase: AggregatorPhase,
}

impl SessionTranscript {
    pub fn word_count(&self) -> usize {
        self.full_text.split_whitespace().count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    Interim,
    Appended {
        /// 低置信度标记在本次事件上是否发生变化。
        low_confidence_changed: bool,
    },
    /// 已定稿或文本为空时丢弃。
    Ignored,
}

#[derive(Debug)]
struct AggregatorState {
    phase: AggregatorPhase,
    full_text: String,
    interim_preview: Option<String>,
    confidence_sum: f64,
    final_events: usize,
    low_confidence: bool,
}

impl AggregatorState {
    fn empty() -> Self {
        Self {
            phase: AggregatorPhase::Empty,
            full_text: String::new(),
            interim_preview: None,
            confidence_sum: 0.0,
            final_events: 0,
            low_confidence: false,
        }
    }

    fn running_confidence(&self) -> Option<f32> {
        if self.final_events == 0 {
            None
        } else {
            Some((self.confidence_sum / self.final_events as f64) as f32)
        }
    }

    fn snapshot(&self) -> SessionTranscript {
        SessionTranscript {
            full_text: self.full_text.clone(),
            interim_preview: self.interim_preview.clone(),
            running_confidence: self.running_confidence(),
            low_confidence: self.low_confidence,
            final_events: self.final_events,
            phase: self.phase,
        }
    }
}

/// 转写聚合器。`push` 同步完成、从不阻塞等待，可在任意线程调用。
#[derive(Debug)]
pub struct TranscriptionAggregator {
    threshold: f32,
    state: Mutex<AggregatorState>,
}

impl Default for TranscriptionAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_LOW_CONFIDENCE_THRESHOLD)
    }
}

impl TranscriptionAggregator {
    pub fn new(low_confidence_threshold: f32) -> Self {
        Self {
            threshold: low_confidence_threshold,
            state: Mutex::new(AggregatorState::empty()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AggregatorState> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub fn push(&self, event: &TranscriptEvent) -> PushOutcome {
        let mut state = self.lock();
        if state.phase == AggregatorPhase::Finalized {
            debug!(target: TARGET, "aggregator finalized, dropping event");
            return PushOutcome::Ignored;
        }

        let text = event.text.trim();

        if !event.is_final {
            state.interim_preview = if text.is_empty() {
                None
            } else {
                Some(text.to_string())
            };
            return PushOutcome::Interim;
        }

        if text.is_empty() {
            state.interim_preview = None;
            return PushOutcome::Ignored;
        }

        if !state.full_text.is_empty() {
            state.full_text.push(' ');
        }
        state.full_text.push_str(text);
        state.interim_preview = None;
        state.confidence_sum += f64::from(event.clamped_confidence());
        state.final_events += 1;
        state.phase = AggregatorPhase::Accumulating;

        let was_low = state.low_confidence;
        let running = state.running_confidence().unwrap_or(1.0);
        state.low_confidence = running < self.threshold;

        PushOutcome::Appended {
            low_confidence_changed: was_low != state.low_confidence,
        }
    }

    pub fn snapshot(&self) -> SessionTranscript {
        self.lock().snapshot()
    }

    pub fn full_text(&self) -> String {
        self.lock().full_text.clone()
    }

    pub fn low_confidence(&self) -> bool {
        self.lock().low_confidence
    }

    pub fn phase(&self) -> AggregatorPhase {
        self.lock().phase
    }

    /// 重新采集：清空所有累积状态并回到 Empty。
    pub fn reset(&self) {
        *self.lock() = AggregatorState::empty();
    }

    /// 定稿后不再接受事件，返回最终快照。
    pub fn finalize(&self) -> SessionTranscript {
        let mut state = self.lock();
        state.phase = AggregatorPhase::Finalized;
        state.interim_preview = None;
        state.snapshot()
    }
}
