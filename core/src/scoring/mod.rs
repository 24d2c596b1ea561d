//! 评分引擎：确定性纯函数，将转写与场景映射为多维评分。

mod engine;
pub mod rules;

pub use engine::{CategoryScores, ScoreResult, ScoringEngine};
