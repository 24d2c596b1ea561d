//! Pitchcoach Core Library
//!
//! Session engine for objection-handling practice: entitlement gating,
//! transcript aggregation, counterpart reply generation with a deterministic
//! fallback, content safety, scoring, and telemetry.

pub mod config;
pub mod entitlement;
pub mod generation;
pub mod rate_limit;
pub mod safety;
pub mod scenario;
pub mod scoring;
pub mod session;
pub mod telemetry;
pub mod transcription;
