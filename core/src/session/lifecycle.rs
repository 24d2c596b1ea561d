//! 会话对外广播的更新负载。

use std::time::SystemTime;

use serde::Serialize;

use crate::scenario::Scenario;
use crate::scoring::ScoreResult;
use crate::session::message::Message;
use crate::session::state::SessionState;
use crate::transcription::SessionTranscript;

pub const NOTICE_LOW_CONFIDENCE: &str = "low_confidence";
pub const NOTICE_CONFIDENCE_RECOVERED: &str = "confidence_recovered";
pub const NOTICE_UTTERANCE_DROPPED: &str = "utterance_dropped";
pub const NOTICE_TRANSCRIPTION_ENDED: &str = "transcription_ended";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warn,
}

/// 提示类事件，例如低置信度时建议重新采集。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionNotice {
    pub level: NoticeLevel,
    pub code: &'static str,
    pub message: String,
}

impl SessionNotice {
    pub fn low_confidence() -> Self {
        Self {
            level: NoticeLevel::Warn,
            code: NOTICE_LOW_CONFIDENCE,
            message: "We're having trouble hearing you clearly. Restart capture?".to_string(),
        }
    }

    pub fn confidence_recovered() -> Self {
        Self {
            level: NoticeLevel::Info,
            code: NOTICE_CONFIDENCE_RECOVERED,
            message: "Transcription quality is back to normal.".to_string(),
        }
    }

    pub fn utterance_dropped() -> Self {
        Self {
            level: NoticeLevel::Warn,
            code: NOTICE_UTTERANCE_DROPPED,
            message: "Still answering your earlier points. That last one was skipped.".to_string(),
        }
    }

    pub fn transcription_ended() -> Self {
        Self {
            level: NoticeLevel::Warn,
            code: NOTICE_TRANSCRIPTION_ENDED,
            message: "Voice transcription stopped. You can keep typing your answers.".to_string(),
        }
    }
}

/// 会话完成时交给下游的结果。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionReport {
    pub session_id: String,
    pub scenario: Scenario,
    pub result: ScoreResult,
    pub transcript: String,
    pub turns: usize,
    pub completed_at: SystemTime,
}

impl CompletionReport {
    pub fn transcript_words(&self) -> usize {
        self.transcript.split_whitespace().count()
    }
}

#[derive(Debug, Clone)]
pub enum SessionUpdate {
    StateChanged {
        session_id: Option<String>,
        state: SessionState,
    },
    MessageAppended(Message),
    TranscriptChanged(SessionTranscript),
    Notice(SessionNotice),
    Completed(CompletionReport),
}

impl SessionUpdate {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionUpdate::StateChanged { .. } => "state_changed",
            SessionUpdate::MessageAppended(_) => "message_appended",
            SessionUpdate::TranscriptChanged(_) => "transcript_changed",
            SessionUpdate::Notice(_) => "notice",
            SessionUpdate::Completed(_) => "completed",
        }
    }
}
