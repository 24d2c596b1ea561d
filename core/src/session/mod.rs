//! 练习会话状态机：每个会话一个 worker 任务独占状态，句柄通过命令通道驱动。

mod error;
pub mod lifecycle;
pub mod message;
mod sink;
pub mod state;
mod timer;
mod worker;

pub use error::SessionError;
pub use lifecycle::{CompletionReport, NoticeLevel, SessionNotice, SessionUpdate};
pub use message::{Message, Speaker};
pub use sink::{CompletionSink, TelemetryCompletionSink};
pub use state::{BlockReason, CaptureMode, SessionState};

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::entitlement::{EntitlementGate, UserContext};
use crate::generation::ResponseGenerator;
use crate::scenario::Scenario;
use crate::scoring::ScoringEngine;
use crate::transcription::{SessionTranscript, TranscriptionAggregator, TranscriptionSource};

use self::worker::SessionWorker;

const COMMAND_CAPACITY: usize = 32;
const UPDATE_CAPACITY: usize = 128;

/// 会话依赖的外部协作方。
#[derive(Clone)]
pub struct SessionDeps {
    pub gate: Arc<EntitlementGate>,
    pub generator: Arc<ResponseGenerator>,
    pub scoring: ScoringEngine,
    pub transcription: Option<Arc<dyn TranscriptionSource>>,
    pub sink: Arc<dyn CompletionSink>,
}

impl SessionDeps {
    pub fn new(gate: Arc<EntitlementGate>, generator: Arc<ResponseGenerator>) -> Self {
        Self {
            gate,
            generator,
            scoring: ScoringEngine::new(),
            transcription: None,
            sink: Arc::new(TelemetryCompletionSink),
        }
    }

    pub fn with_transcription(mut self, source: Arc<dyn TranscriptionSource>) -> Self {
        self.transcription = Some(source);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn CompletionSink>) -> Self {
        self.sink = sink;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartRequest {
    pub scenario: Scenario,
    pub capture: CaptureMode,
}

impl StartRequest {
    pub fn voice(scenario: Scenario) -> Self {
        Self {
            scenario,
            capture: CaptureMode::Voice,
        }
    }

    pub fn text_only(scenario: Scenario) -> Self {
        Self {
            scenario,
            capture: CaptureMode::TextOnly,
        }
    }
}

/// 提交发言后的处理结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceAck {
    /// 立即发起生成。
    Dispatched,
    /// 已有生成在进行，排在队列第 `position` 位。
    Queued { position: usize },
    /// 队列已满，发言被丢弃。
    Dropped,
    /// 空白发言。
    Ignored,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct StateSnapshot {
    pub(crate) session_id: Option<String>,
    pub(crate) state: SessionState,
}

pub(crate) enum SessionCommand {
    Start {
        request: StartRequest,
        reply: oneshot::Sender<Result<SessionState, SessionError>>,
    },
    SubmitUtterance {
        text: String,
        reply: oneshot::Sender<Result<UtteranceAck, SessionError>>,
    },
    Stop {
        reply: oneshot::Sender<Result<SessionState, SessionError>>,
    },
    RestartCapture {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Messages {
        reply: oneshot::Sender<Vec<Message>>,
    },
}

/// 会话句柄。丢弃句柄即终止 worker。
pub struct PracticeSession {
    command_tx: mpsc::Sender<SessionCommand>,
    state_rx: watch::Receiver<StateSnapshot>,
    update_tx: broadcast::Sender<SessionUpdate>,
    aggregator: Arc<TranscriptionAggregator>,
    worker: Option<JoinHandle<()>>,
}

impl PracticeSession {
    pub fn spawn(config: EngineConfig, user: UserContext, deps: SessionDeps) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (state_tx, state_rx) = watch::channel(StateSnapshot::default());
        let (update_tx, _) = broadcast::channel(UPDATE_CAPACITY);
        let aggregator = Arc::new(TranscriptionAggregator::new(config.low_confidence_threshold));

        let worker = SessionWorker::new(
            config,
            user,
            deps,
            Arc::clone(&aggregator),
            command_rx,
            state_tx,
            update_tx.clone(),
        );

        Self {
            command_tx,
            state_rx,
            update_tx,
            aggregator,
            worker: Some(worker.spawn()),
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.command_tx
            .send(build(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)
    }

    /// 开始新一轮练习，返回权益检查之后的状态（Recording 或 Blocked）。
    pub async fn start(&self, request: StartRequest) -> Result<SessionState, SessionError> {
        self.request(|reply| SessionCommand::Start { request, reply }).await?
    }

    pub async fn submit_utterance<S: Into<String>>(
        &self,
        text: S,
    ) -> Result<UtteranceAck, SessionError> {
        let text = text.into();
        self.request(|reply| SessionCommand::SubmitUtterance { text, reply }).await?
    }

    /// 手动结束录制并评分，返回 Complete 状态。
    pub async fn stop(&self) -> Result<SessionState, SessionError> {
        self.request(|reply| SessionCommand::Stop { reply }).await?
    }

    pub async fn restart_capture(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::RestartCapture { reply }).await?
    }

    pub async fn messages(&self) -> Result<Vec<Message>, SessionError> {
        self.request(|reply| SessionCommand::Messages { reply }).await
    }

    pub fn state(&self) -> SessionState {
        self.state_rx.borrow().state.clone()
    }

    /// 当前尝试的 session id；每次 `start` 生成新的 id。
    pub fn session_id(&self) -> Option<String> {
        self.state_rx.borrow().session_id.clone()
    }

    pub fn transcript(&self) -> SessionTranscript {
        self.aggregator.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.update_tx.subscribe()
    }

    /// 等待状态满足条件，例如倒计时结束后的 Complete。
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<SessionState, SessionError>
    where
        F: FnMut(&SessionState) -> bool,
    {
        let mut state_rx = self.state_rx.clone();
        let snapshot = state_rx
            .wait_for(|snapshot| predicate(&snapshot.state))
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(snapshot.state.clone())
    }
}

impl Drop for PracticeSession {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}
