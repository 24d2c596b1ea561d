use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::transcription::event::TranscriptEvent;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranscriptionError {
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("transcription source unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("transcription source already started")]
    AlreadyStarted,
}

impl TranscriptionError {
    pub fn unavailable<S: Into<String>>(reason: S) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// 转写后端的抽象边界：启动后以通道推送事件，停止由状态机控制。
#[async_trait]
pub trait TranscriptionSource: Send + Sync {
    async fn start(&self) -> Result<mpsc::Receiver<TranscriptEvent>, TranscriptionError>;

    async fn stop(&self);
}

/// 由调用方手动喂入事件的转写源，适配任意回调式后端。
#[derive(Debug)]
pub struct ChannelTranscriptionSource {
    capacity: usize,
    sender: Mutex<Option<mpsc::Sender<TranscriptEvent>>>,
}

impl ChannelTranscriptionSource {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            sender: Mutex::new(None),
        }
    }

    /// 当前采集周期的发送端；未启动时为 None。
    pub fn sender(&self) -> Option<mpsc::Sender<TranscriptEvent>> {
        self.sender
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    pub fn is_running(&self) -> bool {
        self.sender().is_some()
    }
}

#[async_trait]
impl TranscriptionSource for ChannelTranscriptionSource {
    async fn start(&self) -> Result<mpsc::Receiver<TranscriptEvent>, TranscriptionError> {
        let mut guard = self.sender.lock().unwrap_or_else(|err| err.into_inner());
        if guard.is_some() {
            return Err(TranscriptionError::AlreadyStarted);
        }
        let (tx, rx) = mpsc::channel(self.capacity);
        *guard = Some(tx);
        Ok(rx)
    }

    async fn stop(&self) {
        self.sender
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_source_delivers_events_until_stopped() {
        let source = ChannelTranscriptionSource::new(4);
        let mut rx = source.start().await.expect("source starts");
        let tx = source.sender().expect("sender available");

        tx.send(TranscriptEvent::final_result("hello", 0.9))
            .await
            .expect("send");
        drop(tx);

        let event = rx.recv().await.expect("event delivered");
        assert_eq!(event.text, "hello");

        source.stop().await;
        assert!(!source.is_running());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let source = ChannelTranscriptionSource::new(4);
        let _rx = source.start().await.expect("source starts");
        assert_eq!(
            source.start().await.unwrap_err(),
            TranscriptionError::AlreadyStarted
        );
    }
}
