use std::collections::VecDeque;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::entitlement::UserContext;
use crate::generation::GenerationOutcome;
use crate::scenario::Scenario;
use crate::session::error::SessionError;
use crate::session::lifecycle::{CompletionReport, SessionNotice, SessionUpdate};
use crate::session::message::{Message, Speaker};
use crate::session::state::{BlockReason, CaptureMode, SessionState};
use crate::session::timer::CountdownTimer;
use crate::session::{SessionCommand, SessionDeps, StartRequest, StateSnapshot, UtteranceAck};
use crate::telemetry::events::record_session_transition;
use crate::transcription::{PushOutcome, TranscriptEvent, TranscriptionAggregator, TranscriptionSource};

const TARGET: &str = "session_machine";
const INTERNAL_CAPACITY: usize = 64;
const WITHHELD_UTTERANCE: &str = "[message withheld]";

/// worker 内部事件。每条都带录制纪元号，纪元不匹配的事件直接丢弃。
#[derive(Debug)]
pub(super) enum WorkerEvent {
    DeadlineElapsed { epoch: u64 },
    GenerationFinished { epoch: u64, outcome: GenerationOutcome },
}

/// 一次 `start` 对应的尝试。
struct Attempt {
    session_id: String,
    scenario: Scenario,
    messages: Vec<Message>,
    timer: Option<CountdownTimer>,
    /// 转写事件由 worker 直接消费，停止时可以把缓冲中的事件取干净。
    events: Option<mpsc::Receiver<TranscriptEvent>>,
    generation: Option<JoinHandle<()>>,
    source: Option<Arc<dyn TranscriptionSource>>,
    pending: VecDeque<String>,
}

impl Attempt {
    fn new(session_id: String, request: StartRequest) -> Self {
        Self {
            session_id,
            scenario: request.scenario,
            messages: Vec::new(),
            timer: None,
            events: None,
            generation: None,
            source: None,
            pending: VecDeque::new(),
        }
    }

    fn generation_in_flight(&self) -> bool {
        self.generation.is_some()
    }

    /// 取消倒计时与所有后台任务。timer 被 take 后不会再次取消。
    fn halt_tasks(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        if let Some(generation) = self.generation.take() {
            generation.abort();
        }
        self.pending.clear();
    }

    fn user_turns(&self) -> usize {
        self.messages
            .iter()
            .filter(|message| message.sender == Speaker::User)
            .count()
    }
}

impl Drop for Attempt {
    fn drop(&mut self) {
        self.halt_tasks();
    }
}

pub(super) struct SessionWorker {
    config: EngineConfig,
    user: UserContext,
    deps: SessionDeps,
    aggregator: Arc<TranscriptionAggregator>,
    command_rx: mpsc::Receiver<SessionCommand>,
    internal_tx: mpsc::Sender<WorkerEvent>,
    internal_rx: mpsc::Receiver<WorkerEvent>,
    state_tx: watch::Sender<StateSnapshot>,
    update_tx: broadcast::Sender<SessionUpdate>,
    state: SessionState,
    attempt: Option<Attempt>,
    epoch: u64,
}

impl SessionWorker {
    pub(super) fn new(
        config: EngineConfig,
        user: UserContext,
        deps: SessionDeps,
        aggregator: Arc<TranscriptionAggregator>,
        command_rx: mpsc::Receiver<SessionCommand>,
        state_tx: watch::Sender<StateSnapshot>,
        update_tx: broadcast::Sender<SessionUpdate>,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::channel(INTERNAL_CAPACITY);
        Self {
            config,
            user,
            deps,
            aggregator,
            command_rx,
            internal_tx,
            internal_rx,
            state_tx,
            update_tx,
            state: SessionState::Idle,
            attempt: None,
            epoch: 0,
        }
    }

    pub(super) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                maybe_command = self.command_rx.recv() => {
                    match maybe_command {
                        Some(command) => self.handle_command(command).await,
                        None => break,
                    }
                }

                Some(event) = self.internal_rx.recv() => {
                    self.handle_event(event).await;
                }

                transcribed = next_transcript(self.attempt.as_mut()) => {
                    self.handle_transcript(transcribed);
                }
            }
        }

        debug!(target: TARGET, "session handle dropped, shutting down worker");
        if let Some(mut attempt) = self.attempt.take() {
            attempt.halt_tasks();
            if let Some(source) = attempt.source.take() {
                source.stop().await;
            }
        }
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start { request, reply } => {
                let result = self.start(request).await;
                let _ = reply.send(result);
            }
            SessionCommand::SubmitUtterance { text, reply } => {
                let result = self.submit_typed(&text);
                let _ = reply.send(result);
            }
            SessionCommand::Stop { reply } => {
                let result = if self.state.is_recording() {
                    self.finish_recording("manual_stop").await;
                    Ok(self.state.clone())
                } else {
                    Err(SessionError::invalid(self.state.as_str(), "stop"))
                };
                let _ = reply.send(result);
            }
            SessionCommand::RestartCapture { reply } => {
                let result = if self.state.is_recording() {
                    self.aggregator.reset();
                    info!(target: TARGET, "capture restarted, transcript cleared");
                    self.publish(SessionUpdate::TranscriptChanged(self.aggregator.snapshot()));
                    Ok(())
                } else {
                    Err(SessionError::invalid(self.state.as_str(), "restart_capture"))
                };
                let _ = reply.send(result);
            }
            SessionCommand::Messages { reply } => {
                let messages = self
                    .attempt
                    .as_ref()
                    .map(|attempt| attempt.messages.clone())
                    .unwrap_or_default();
                let _ = reply.send(messages);
            }
        }
    }

    async fn handle_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::DeadlineElapsed { epoch } => {
                if self.is_current(epoch) {
                    self.finish_recording("deadline").await;
                } else {
                    debug!(target: TARGET, epoch, "stale deadline ignored");
                }
            }
            WorkerEvent::GenerationFinished { epoch, outcome } => {
                if !self.is_current(epoch) {
                    debug!(target: TARGET, epoch, "stale generation result dropped");
                    return;
                }
                self.complete_turn(outcome);
            }
        }
    }

    fn handle_transcript(&mut self, transcribed: Option<TranscriptEvent>) {
        let Some(event) = transcribed else {
            warn!(target: TARGET, "transcription source closed during recording");
            if let Some(attempt) = self.attempt.as_mut() {
                attempt.events = None;
            }
            self.publish(SessionUpdate::Notice(SessionNotice::transcription_ended()));
            return;
        };
        if !self.state.is_recording() {
            debug!(target: TARGET, "transcript event outside recording dropped");
            return;
        }
        if let PushOutcome::Appended { .. } = self.ingest(&event) {
            let ack = self.enqueue_utterance(event.text.trim().to_string());
            debug!(target: TARGET, ?ack, "voice utterance queued for reply");
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        epoch == self.epoch && self.state.is_recording()
    }

    async fn start(&mut self, request: StartRequest) -> Result<SessionState, SessionError> {
        if !self.state.accepts_start() {
            return Err(SessionError::invalid(self.state.as_str(), "start"));
        }

        let session_id = Uuid::new_v4().to_string();
        let capture = request.capture;
        self.aggregator.reset();
        self.attempt = Some(Attempt::new(session_id.clone(), request));
        info!(
            target: TARGET,
            %session_id,
            capture = capture.as_str(),
            "practice attempt starting"
        );
        self.transition(SessionState::AwaitingEntitlement);

        // 先启动转写源，失败时不扣减权益。
        let mut events = None;
        if capture == CaptureMode::Voice {
            match self.start_transcription().await {
                Ok(rx) => events = Some(rx),
                Err(message) => {
                    warn!(target: TARGET, %message, "transcription unavailable");
                    self.transition(SessionState::Blocked {
                        reason: BlockReason::TranscriptionUnavailable { message },
                    });
                    return Ok(self.state.clone());
                }
            }
        }

        let outcome = self
            .deps
            .gate
            .check_and_reserve(
                &session_id,
                &self.user,
                &self.config.feature_key,
                self.config.session_cost,
            )
            .await;

        if let Some(reason) = BlockReason::from_outcome(&outcome) {
            self.stop_transcription().await;
            self.transition(SessionState::Blocked { reason });
            return Ok(self.state.clone());
        }

        self.enter_recording(events, capture);
        Ok(self.state.clone())
    }

    async fn start_transcription(
        &mut self,
    ) -> Result<mpsc::Receiver<TranscriptEvent>, String> {
        let Some(source) = self.deps.transcription.clone() else {
            return Err("no transcription source configured".to_string());
        };
        let rx = source.start().await.map_err(|err| err.to_string())?;
        if let Some(attempt) = self.attempt.as_mut() {
            attempt.source = Some(source);
        }
        Ok(rx)
    }

    async fn stop_transcription(&mut self) {
        let source = self
            .attempt
            .as_mut()
            .and_then(|attempt| attempt.source.take());
        if let Some(source) = source {
            source.stop().await;
        }
    }

    fn enter_recording(
        &mut self,
        events: Option<mpsc::Receiver<TranscriptEvent>>,
        capture: CaptureMode,
    ) {
        self.epoch += 1;
        let epoch = self.epoch;
        let timer = CountdownTimer::start(
            self.config.session_duration,
            self.internal_tx.clone(),
            move || WorkerEvent::DeadlineElapsed { epoch },
        );
        let deadline = timer.deadline();

        let opening = match self.attempt.as_mut() {
            Some(attempt) => {
                attempt.timer = Some(timer);
                attempt.events = events;
                self.config
                    .open_with_objection
                    .then(|| self.deps.generator.opening_line(&attempt.scenario))
            }
            None => {
                timer.cancel();
                None
            }
        };

        self.transition(SessionState::Recording { deadline, capture });
        if let Some(line) = opening {
            self.append_message(Message::counterpart(line));
        }
    }

    fn submit_typed(&mut self, text: &str) -> Result<UtteranceAck, SessionError> {
        if !self.state.is_recording() {
            return Err(SessionError::invalid(self.state.as_str(), "submit_utterance"));
        }
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(UtteranceAck::Ignored);
        }

        self.ingest(&TranscriptEvent::typed(trimmed));
        Ok(self.enqueue_utterance(trimmed.to_string()))
    }

    /// 同步推入聚合器并广播转写变化。
    fn ingest(&self, event: &TranscriptEvent) -> PushOutcome {
        let outcome = self.aggregator.push(event);
        match &outcome {
            PushOutcome::Interim => {
                self.publish(SessionUpdate::TranscriptChanged(self.aggregator.snapshot()));
            }
            PushOutcome::Appended {
                low_confidence_changed,
            } => {
                let snapshot = self.aggregator.snapshot();
                let low_confidence = snapshot.low_confidence;
                self.publish(SessionUpdate::TranscriptChanged(snapshot));
                if *low_confidence_changed {
                    let notice = if low_confidence {
                        SessionNotice::low_confidence()
                    } else {
                        SessionNotice::confidence_recovered()
                    };
                    self.publish(SessionUpdate::Notice(notice));
                }
            }
            PushOutcome::Ignored => {}
        }
        outcome
    }

    /// 同一会话的生成串行执行；进行中时排队，队列满则丢弃。
    fn enqueue_utterance(&mut self, text: String) -> UtteranceAck {
        let capacity = self.config.pending_utterance_capacity;
        let Some(attempt) = self.attempt.as_mut() else {
            return UtteranceAck::Dropped;
        };

        if !attempt.generation_in_flight() {
            self.dispatch(text);
            return UtteranceAck::Dispatched;
        }

        if attempt.pending.len() >= capacity {
            warn!(
                target: TARGET,
                capacity,
                "generation in flight and queue full, dropping utterance"
            );
            self.publish(SessionUpdate::Notice(SessionNotice::utterance_dropped()));
            return UtteranceAck::Dropped;
        }

        attempt.pending.push_back(text);
        UtteranceAck::Queued {
            position: attempt.pending.len(),
        }
    }

    fn dispatch(&mut self, text: String) {
        let epoch = self.epoch;
        let tx = self.internal_tx.clone();
        let generator = Arc::clone(&self.deps.generator);
        let Some(attempt) = self.attempt.as_mut() else {
            return;
        };
        let scenario = attempt.scenario.clone();
        let history = attempt.messages.clone();
        let rate_key = self.user.rate_limit_key(&attempt.session_id);

        attempt.generation = Some(tokio::spawn(async move {
            let outcome = generator
                .generate_for(&rate_key, &text, &scenario, &history)
                .await;
            if tx
                .send(WorkerEvent::GenerationFinished { epoch, outcome })
                .await
                .is_err()
            {
                debug!(target: TARGET, "session worker gone before reply arrived");
            }
        }));
    }

    fn complete_turn(&mut self, outcome: GenerationOutcome) {
        debug!(
            target: TARGET,
            source = outcome.source.as_str(),
            degraded = outcome.is_degraded(),
            "counterpart reply ready"
        );
        if let Some(attempt) = self.attempt.as_mut() {
            attempt.generation = None;
        }

        let user_text = outcome
            .sanitized_input
            .unwrap_or_else(|| WITHHELD_UTTERANCE.to_string());
        self.append_message(Message::user(user_text));
        self.append_message(Message::counterpart(outcome.text));

        let next = self
            .attempt
            .as_mut()
            .and_then(|attempt| attempt.pending.pop_front());
        if let Some(text) = next {
            self.dispatch(text);
        }
    }

    fn append_message(&mut self, message: Message) {
        if let Some(attempt) = self.attempt.as_mut() {
            attempt.messages.push(message.clone());
            self.publish(SessionUpdate::MessageAppended(message));
        }
    }

    /// 退出录制：无条件取消倒计时，推进纪元，然后对最终转写评分一次。
    /// 转写源停止前已经送达的事件全部计入转写，只是不再触发回复。
    async fn finish_recording(&mut self, trigger: &'static str) {
        self.epoch += 1;
        if let Some(attempt) = self.attempt.as_mut() {
            attempt.halt_tasks();
        }
        self.stop_transcription().await;
        self.drain_transcript();

        info!(target: TARGET, trigger, "recording finished, scoring transcript");
        self.transition(SessionState::Scoring);

        let transcript = self.aggregator.finalize();
        self.publish(SessionUpdate::TranscriptChanged(transcript.clone()));

        let Some(attempt) = self.attempt.as_ref() else {
            warn!(target: TARGET, "recording finished without an attempt");
            self.transition(SessionState::Idle);
            return;
        };
        let result = self
            .deps
            .scoring
            .score(&transcript.full_text, &attempt.scenario);
        let report = CompletionReport {
            session_id: attempt.session_id.clone(),
            scenario: attempt.scenario.clone(),
            result: result.clone(),
            transcript: transcript.full_text,
            turns: attempt.user_turns(),
            completed_at: SystemTime::now(),
        };

        self.transition(SessionState::Complete { result });
        self.publish(SessionUpdate::Completed(report.clone()));

        let sink = Arc::clone(&self.deps.sink);
        let session_id = report.session_id.clone();
        tokio::spawn(async move {
            if let Err(err) = sink.deliver(report).await {
                warn!(target: TARGET, %err, "failed to deliver completion report");
            }
        });

        self.deps.gate.settle(&session_id).await;
    }

    fn drain_transcript(&mut self) {
        let Some(mut events) = self.attempt.as_mut().and_then(|attempt| attempt.events.take())
        else {
            return;
        };
        let mut drained = 0usize;
        while let Ok(event) = events.try_recv() {
            self.ingest(&event);
            drained += 1;
        }
        if drained > 0 {
            debug!(target: TARGET, drained, "applied buffered transcript events before scoring");
        }
    }

    fn transition(&mut self, next: SessionState) {
        let from = self.state.as_str();
        self.state = next;
        let session_id = self
            .attempt
            .as_ref()
            .map(|attempt| attempt.session_id.clone());

        record_session_transition(
            session_id.as_deref().unwrap_or("-"),
            from,
            self.state.as_str(),
        );

        self.state_tx.send_replace(StateSnapshot {
            session_id: session_id.clone(),
            state: self.state.clone(),
        });
        self.publish(SessionUpdate::StateChanged {
            session_id,
            state: self.state.clone(),
        });
    }

    fn publish(&self, update: SessionUpdate) {
        if let Err(err) = self.update_tx.send(update) {
            debug!(
                target: TARGET,
                kind = err.0.kind(),
                "no subscribers for session update"
            );
        }
    }
}

/// 当前尝试的转写事件；没有转写源时永远挂起，让 select 跳过该分支。
async fn next_transcript(attempt: Option<&mut Attempt>) -> Option<TranscriptEvent> {
    match attempt.and_then(|attempt| attempt.events.as_mut()) {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}
