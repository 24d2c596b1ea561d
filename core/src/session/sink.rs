use async_trait::async_trait;

use crate::session::error::SessionError;
use crate::session::lifecycle::CompletionReport;
use crate::telemetry::events::record_session_completed;

/// 会话完成结果的下游消费方（看板、分析等）。
#[async_trait]
pub trait CompletionSink: Send + Sync {
    async fn deliver(&self, report: CompletionReport) -> Result<(), SessionError>;
}

/// 默认实现：只写一条结构化遥测日志。
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryCompletionSink;

#[async_trait]
impl CompletionSink for TelemetryCompletionSink {
    async fn deliver(&self, report: CompletionReport) -> Result<(), SessionError> {
        record_session_completed(
            &report.session_id,
            report.result.overall_score,
            report.turns,
            report.transcript_words(),
            report.completed_at,
        );
        Ok(())
    }
}
