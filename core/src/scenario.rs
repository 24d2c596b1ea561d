//! 练习场景定义：难度、异议类别、行业与对话角色。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScenarioError {
    #[error("unknown difficulty: {0}")]
    UnknownDifficulty(String),
    #[error("unknown objection category: {0}")]
    UnknownCategory(String),
    #[error("unknown persona: {0}")]
    UnknownPersona(String),
    #[error("industry cannot be empty")]
    EmptyIndustry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = ScenarioError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(ScenarioError::UnknownDifficulty(value.to_string())),
        }
    }
}

/// 模拟客户提出的异议类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectionCategory {
    Price,
    Timing,
    Trust,
    Authority,
    Competition,
    Need,
}

impl ObjectionCategory {
    pub const ALL: [ObjectionCategory; 6] = [
        ObjectionCategory::Price,
        ObjectionCategory::Timing,
        ObjectionCategory::Trust,
        ObjectionCategory::Authority,
        ObjectionCategory::Competition,
        ObjectionCategory::Need,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectionCategory::Price => "price",
            ObjectionCategory::Timing => "timing",
            ObjectionCategory::Trust => "trust",
            ObjectionCategory::Authority => "authority",
            ObjectionCategory::Competition => "competition",
            ObjectionCategory::Need => "need",
        }
    }
}

impl fmt::Display for ObjectionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectionCategory {
    type Err = ScenarioError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        ObjectionCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| ScenarioError::UnknownCategory(value.to_string()))
    }
}

/// 对方角色。只允许固定集合，构造时即校验。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Persona {
    #[default]
    SkepticalBuyer,
    BusyExecutive,
    AnalyticalProcurement,
    FriendlyGatekeeper,
}

/// 角色对应的语音风格，供语音合成层选择音色。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoiceStyle {
    Measured,
    Brisk,
    Flat,
    Warm,
}

impl VoiceStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceStyle::Measured => "measured",
            VoiceStyle::Brisk => "brisk",
            VoiceStyle::Flat => "flat",
            VoiceStyle::Warm => "warm",
        }
    }
}

impl Persona {
    pub fn voice_style(&self) -> VoiceStyle {
        match self {
            Persona::SkepticalBuyer => VoiceStyle::Measured,
            Persona::BusyExecutive => VoiceStyle::Brisk,
            Persona::AnalyticalProcurement => VoiceStyle::Flat,
            Persona::FriendlyGatekeeper => VoiceStyle::Warm,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Persona::SkepticalBuyer => "skeptical_buyer",
            Persona::BusyExecutive => "busy_executive",
            Persona::AnalyticalProcurement => "analytical_procurement",
            Persona::FriendlyGatekeeper => "friendly_gatekeeper",
        }
    }
}

impl FromStr for Persona {
    type Err = ScenarioError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "skeptical_buyer" => Ok(Persona::SkepticalBuyer),
            "busy_executive" => Ok(Persona::BusyExecutive),
            "analytical_procurement" => Ok(Persona::AnalyticalProcurement),
            "friendly_gatekeeper" => Ok(Persona::FriendlyGatekeeper),
            _ => Err(ScenarioError::UnknownPersona(value.to_string())),
        }
    }
}

/// 一轮练习的不可变描述，开始会话时创建一次。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ScenarioRecord")]
pub struct Scenario {
    difficulty: Difficulty,
    objection_category: ObjectionCategory,
    industry: String,
    custom_objection_text: Option<String>,
    persona: Persona,
}

/// 反序列化的中间形态，经过 [`Scenario::new`] 的校验后才成为 `Scenario`。
#[derive(Deserialize)]
struct ScenarioRecord {
    difficulty: Difficulty,
    objection_category: ObjectionCategory,
    industry: String,
    #[serde(default)]
    custom_objection_text: Option<String>,
    #[serde(default)]
    persona: Persona,
}

impl TryFrom<ScenarioRecord> for Scenario {
    type Error = ScenarioError;

    fn try_from(record: ScenarioRecord) -> Result<Self, Self::Error> {
        let scenario = Scenario::new(record.difficulty, record.objection_category, record.industry)?
            .with_persona(record.persona);
        Ok(match record.custom_objection_text {
            Some(text) => scenario.with_custom_objection(text),
            None => scenario,
        })
    }
}

impl Scenario {
    pub fn new<S: Into<String>>(
        difficulty: Difficulty,
        objection_category: ObjectionCategory,
        industry: S,
    ) -> Result<Self, ScenarioError> {
        let industry = industry.into().trim().to_string();
        if industry.is_empty() {
            return Err(ScenarioError::EmptyIndustry);
        }

        Ok(Self {
            difficulty,
            objection_category,
            industry,
            custom_objection_text: None,
            persona: Persona::default(),
        })
    }

    /// 从 UI 层传入的原始字符串构造，未知取值直接拒绝。
    pub fn parse(
        difficulty: &str,
        objection_category: &str,
        industry: &str,
        persona: Option<&str>,
    ) -> Result<Self, ScenarioError> {
        let mut scenario = Self::new(difficulty.parse()?, objection_category.parse()?, industry)?;
        if let Some(persona) = persona {
            scenario.persona = persona.parse()?;
        }
        Ok(scenario)
    }

    /// 自定义异议原样保留；全空白视为未设置。
    pub fn with_custom_objection<S: Into<String>>(mut self, text: S) -> Self {
        let text = text.into();
        self.custom_objection_text = (!text.trim().is_empty()).then_some(text);
        self
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = persona;
        self
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn objection_category(&self) -> ObjectionCategory {
        self.objection_category
    }

    pub fn industry(&self) -> &str {
        &self.industry
    }

    pub fn custom_objection_text(&self) -> Option<&str> {
        self.custom_objection_text.as_deref()
    }

    pub fn persona(&self) -> Persona {
        self.persona
    }

    pub fn voice_style(&self) -> VoiceStyle {
        self.persona.voice_style()
    }
}
