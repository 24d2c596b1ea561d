//! 转写事件聚合：消费部分/最终转写事件，维护当前最佳转写与置信度。

pub mod aggregator;
pub mod event;
pub mod source;

pub use aggregator::{AggregatorPhase, PushOutcome, SessionTranscript, TranscriptionAggregator};
pub use event::TranscriptEvent;
pub use source::{ChannelTranscriptionSource, TranscriptionError, TranscriptionSource};
