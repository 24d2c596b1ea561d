use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Counterpart,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::User => "user",
            Speaker::Counterpart => "counterpart",
        }
    }
}

/// 会话消息日志中的一条记录，只追加不修改。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender: Speaker,
    pub text: String,
    pub timestamp: SystemTime,
}

impl Message {
    pub fn new<S: Into<String>>(sender: Speaker, text: S) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            text: text.into(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn user<S: Into<String>>(text: S) -> Self {
        Self::new(Speaker::User, text)
    }

    pub fn counterpart<S: Into<String>>(text: S) -> Self {
        Self::new(Speaker::Counterpart, text)
    }
}
