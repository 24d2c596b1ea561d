use serde::Serialize;
use tokio::time::Instant;

use crate::entitlement::{ReservationOutcome, ReservationStage};
use crate::scoring::ScoreResult;

/// 采集方式：语音需要转写源，纯文本只接受键入的发言。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    #[default]
    Voice,
    TextOnly,
}

impl CaptureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureMode::Voice => "voice",
            CaptureMode::TextOnly => "text_only",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    AuthenticationRequired,
    InsufficientCredits { balance: u32 },
    TrialAvailable { balance: u32 },
    ReservationFailed {
        stage: ReservationStage,
        message: String,
    },
    TranscriptionUnavailable { message: String },
}

impl BlockReason {
    pub fn code(&self) -> &'static str {
        match self {
            BlockReason::AuthenticationRequired => "authentication_required",
            BlockReason::InsufficientCredits { .. } => "insufficient_credits",
            BlockReason::TrialAvailable { .. } => "trial_available",
            BlockReason::ReservationFailed { .. } => "reservation_failed",
            BlockReason::TranscriptionUnavailable { .. } => "transcription_unavailable",
        }
    }

    /// 面向用户的提示。预留失败与余额不足对用户显示相同文案，只在日志中区分。
    pub fn user_message(&self) -> &'static str {
        match self {
            BlockReason::AuthenticationRequired => "Sign in to start a practice session.",
            BlockReason::InsufficientCredits { .. } | BlockReason::ReservationFailed { .. } => {
                "You're out of practice credits. Top up to keep practicing."
            }
            BlockReason::TrialAvailable { .. } => {
                "You have a free trial session available. Start it now?"
            }
            BlockReason::TranscriptionUnavailable { .. } => {
                "Voice transcription is unavailable. You can continue in text-only mode."
            }
        }
    }

    /// 非 Reserved 的预留结果映射为阻断原因。
    pub(crate) fn from_outcome(outcome: &ReservationOutcome) -> Option<Self> {
        match outcome {
            ReservationOutcome::Reserved(_) => None,
            ReservationOutcome::InsufficientCredits { balance } => {
                Some(BlockReason::InsufficientCredits { balance: *balance })
            }
            ReservationOutcome::TrialAvailable { balance } => {
                Some(BlockReason::TrialAvailable { balance: *balance })
            }
            ReservationOutcome::AuthenticationRequired => Some(BlockReason::AuthenticationRequired),
            ReservationOutcome::ReservationFailed { stage, error } => {
                Some(BlockReason::ReservationFailed {
                    stage: *stage,
                    message: error.to_string(),
                })
            }
        }
    }
}

/// 单次练习的状态。只由会话 worker 修改，外部通过快照读取。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingEntitlement,
    Recording {
        deadline: Instant,
        capture: CaptureMode,
    },
    Scoring,
    Complete {
        result: ScoreResult,
    },
    Blocked {
        reason: BlockReason,
    },
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingEntitlement => "awaiting_entitlement",
            SessionState::Recording { .. } => "recording",
            SessionState::Scoring => "scoring",
            SessionState::Complete { .. } => "complete",
            SessionState::Blocked { .. } => "blocked",
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, SessionState::Recording { .. })
    }

    /// 可以开始新一轮尝试的状态。
    pub fn accepts_start(&self) -> bool {
        matches!(
            self,
            SessionState::Idle | SessionState::Complete { .. } | SessionState::Blocked { .. }
        )
    }

    pub fn score(&self) -> Option<&ScoreResult> {
        match self {
            SessionState::Complete { result } => Some(result),
            _ => None,
        }
    }

    pub fn block_reason(&self) -> Option<&BlockReason> {
        match self {
            SessionState::Blocked { reason } => Some(reason),
            _ => None,
        }
    }
}
