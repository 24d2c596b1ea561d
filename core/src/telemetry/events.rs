use serde::Serialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

pub(crate) const TARGET: &str = "telemetry::practice";
pub(crate) const EVENT_ENTITLEMENT: &str = "entitlement_decision";
pub(crate) const EVENT_GENERATION_DEGRADED: &str = "generation_degraded";
pub(crate) const EVENT_SAFETY_BLOCK: &str = "safety_block";
pub(crate) const EVENT_TRANSITION: &str = "session_transition";
pub(crate) const EVENT_COMPLETED: &str = "session_completed";

#[derive(Debug, Serialize)]
pub struct EntitlementDecisionEvent<'a> {
    pub session_id: &'a str,
    pub outcome: &'static str,
    pub remaining: Option<u32>,
    pub detail: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct GenerationDegradedEvent<'a> {
    pub step: &'static str,
    pub outcome: &'static str,
    pub reason: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SafetyBlockEvent<'a> {
    pub context: &'static str,
    pub issues: &'a [String],
}

#[derive(Debug, Serialize)]
pub struct SessionTransitionEvent<'a> {
    pub session_id: &'a str,
    pub from: &'static str,
    pub to: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SessionCompletedEvent<'a> {
    pub session_id: &'a str,
    pub overall_score: u8,
    pub turns: usize,
    pub transcript_words: usize,
    pub completed_at_ms: u64,
}

/// 权益拒绝与服务失败在 UI 上表现一致，但日志级别不同。
pub fn record_entitlement_decision(
    session_id: &str,
    outcome: &'static str,
    remaining: Option<u32>,
    detail: Option<&str>,
    is_failure: bool,
) {
    let event = EntitlementDecisionEvent {
        session_id,
        outcome,
        remaining,
        detail,
    };

    match serde_json::to_string(&event) {
        Ok(payload) if is_failure => warn!(
            target: TARGET,
            event = EVENT_ENTITLEMENT,
            session_id = event.session_id,
            outcome = event.outcome,
            payload = %payload,
            "entitlement reservation failed"
        ),
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_ENTITLEMENT,
            session_id = event.session_id,
            outcome = event.outcome,
            remaining = ?event.remaining,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_ENTITLEMENT,
            %err,
            "failed to encode entitlement decision event"
        ),
    }
}

pub fn record_generation_degraded(step: &'static str, outcome: &'static str, reason: &str) {
    let event = GenerationDegradedEvent {
        step,
        outcome,
        reason,
    };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_GENERATION_DEGRADED,
            step = event.step,
            outcome = event.outcome,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_GENERATION_DEGRADED,
            %err,
            "failed to encode generation degraded event"
        ),
    }
}

pub fn record_safety_block(context: &'static str, issues: &[String]) {
    let event = SafetyBlockEvent { context, issues };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_SAFETY_BLOCK,
            context = event.context,
            issue_count = event.issues.len(),
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_SAFETY_BLOCK,
            %err,
            "failed to encode safety block event"
        ),
    }
}

pub fn record_session_transition(session_id: &str, from: &'static str, to: &'static str) {
    let event = SessionTransitionEvent {
        session_id,
        from,
        to,
    };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_TRANSITION,
            session_id = event.session_id,
            from = event.from,
            to = event.to,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_TRANSITION,
            %err,
            "failed to encode session transition event"
        ),
    }
}

pub fn record_session_completed(
    session_id: &str,
    overall_score: u8,
    turns: usize,
    transcript_words: usize,
    completed_at: SystemTime,
) {
    let completed_at_ms = completed_at
        .duration_since(UNIX_EPOCH)
        .map(duration_to_ms)
        .unwrap_or_default();
    let event = SessionCompletedEvent {
        session_id,
        overall_score,
        turns,
        transcript_words,
        completed_at_ms,
    };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_COMPLETED,
            session_id = event.session_id,
            overall_score = event.overall_score,
            turns = event.turns,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_COMPLETED,
            %err,
            "failed to encode session completed event"
        ),
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_clamps_to_u64() {
        let duration = Duration::new(u64::MAX, 0);
        assert_eq!(duration_to_ms(duration), u64::MAX);
    }

    #[test]
    fn entitlement_event_serializes_optional_fields() {
        let event = EntitlementDecisionEvent {
            session_id: "session",
            outcome: "reserved",
            remaining: Some(0),
            detail: None,
        };
        let payload = serde_json::to_string(&event).expect("encode");
        assert_eq!(
            payload,
            r#"{"session_id":"session","outcome":"reserved","remaining":0,"detail":null}"#
        );
    }
}
