use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

const TARGET: &str = "session_machine";
// 时长溢出时退回的截止时间。
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// 单次录制的倒计时。到期时向 worker 投递一条带纪元号的消息。
///
/// `cancel` 消费自身，因此每次进入录制最多取消一次；worker 还会比对纪元号，
/// 过期消息即使已在队列里也会被丢弃。
#[derive(Debug)]
pub(crate) struct CountdownTimer {
    deadline: Instant,
    handle: JoinHandle<()>,
}

impl CountdownTimer {
    pub(crate) fn start<T, F>(duration: Duration, tx: mpsc::Sender<T>, on_elapsed: F) -> Self
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let now = Instant::now();
        let deadline = now
            .checked_add(duration)
            .unwrap_or_else(|| now + FAR_FUTURE);
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            if tx.send(on_elapsed()).await.is_err() {
                debug!(target: TARGET, "session worker gone before deadline");
            }
        });
        Self { deadline, handle }
    }

    pub(crate) fn deadline(&self) -> Instant {
        self.deadline
    }

    pub(crate) fn cancel(self) {
        self.handle.abort();
    }
}
