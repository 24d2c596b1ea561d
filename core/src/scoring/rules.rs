//! 关键词表与优势/改进项规则。

use crate::scenario::ObjectionCategory;

pub const STRENGTH_DISCOVERY_QUESTION: &str =
    "Asked a discovery question to uncover the real concern";
pub const STRENGTH_ACKNOWLEDGED: &str = "Acknowledged the customer's concern before responding";
pub const STRENGTH_CONCRETE_NUMBERS: &str = "Backed claims with concrete numbers";
pub const STRENGTH_DEVELOPED_ANSWER: &str = "Gave a well-developed response";

pub const IMPROVEMENT_MISSING_DISCOVERY_QUESTION: &str =
    "Ask a discovery question to uncover the root of the objection";
pub const IMPROVEMENT_MISSING_ACKNOWLEDGEMENT: &str = "Acknowledge the concern before answering it";
pub const IMPROVEMENT_TOO_SHORT: &str = "Expand your answer with more detail";
pub const IMPROVEMENT_HEDGING: &str = "Cut filler and hedging words to sound more confident";
pub const IMPROVEMENT_NO_NUMBERS: &str = "Support your points with concrete numbers or proof";

pub(crate) const MAX_FEEDBACK_ITEMS: usize = 3;
pub(crate) const SHORT_ANSWER_WORDS: usize = 15;
pub(crate) const DEVELOPED_ANSWER_WORDS: usize = 40;
pub(crate) const HEDGE_LIMIT: usize = 2;

pub(crate) const EMPATHY_PHRASES: &[&str] = &[
    "i understand",
    "i hear you",
    "that makes sense",
    "fair point",
    "appreciate",
    "great question",
    "totally get",
];

pub(crate) const HEDGE_PHRASES: &[&str] = &[
    "um",
    "uh",
    "like",
    "basically",
    "actually",
    "you know",
    "kind of",
    "sort of",
    "maybe",
    "i guess",
    "i think",
];

pub fn category_keywords(category: ObjectionCategory) -> &'static [&'static str] {
    match category {
        ObjectionCategory::Price => &[
            "value", "roi", "return", "invest", "budget", "save", "savings", "payback",
        ],
        ObjectionCategory::Timing => &[
            "timeline", "quarter", "now", "delay", "schedule", "window", "phase", "start",
        ],
        ObjectionCategory::Trust => &[
            "reference",
            "case study",
            "testimonial",
            "guarantee",
            "proven",
            "customers",
            "track record",
            "pilot",
        ],
        ObjectionCategory::Authority => &[
            "decision",
            "stakeholder",
            "team",
            "approve",
            "sign-off",
            "champion",
            "involve",
            "leadership",
        ],
        ObjectionCategory::Competition => &[
            "differ",
            "unique",
            "compare",
            "switch",
            "advantage",
            "unlike",
            "integration",
            "migration",
        ],
        ObjectionCategory::Need => &[
            "problem", "challenge", "pain", "goal", "impact", "priority", "cost of", "outcome",
        ],
    }
}

pub fn category_strength(category: ObjectionCategory) -> &'static str {
    match category {
        ObjectionCategory::Price => "Reframed price around value and ROI",
        ObjectionCategory::Timing => "Tied the decision to a concrete timeline",
        ObjectionCategory::Trust => "Built credibility with proof and references",
        ObjectionCategory::Authority => "Engaged the wider decision-making team",
        ObjectionCategory::Competition => "Differentiated clearly from the competition",
        ObjectionCategory::Need => "Connected the offer to the customer's real problem",
    }
}

pub fn category_improvement(category: ObjectionCategory) -> &'static str {
    match category {
        ObjectionCategory::Price => "Anchor the conversation on value and ROI rather than price",
        ObjectionCategory::Timing => "Propose a concrete timeline or phased start",
        ObjectionCategory::Trust => "Offer proof such as a case study, reference, or pilot",
        ObjectionCategory::Authority => "Ask who else is involved and how decisions get made",
        ObjectionCategory::Competition => "Explain what makes your offer different",
        ObjectionCategory::Need => "Dig into the problem the customer is trying to solve",
    }
}

/// 统计短语出现次数；单词短语按完整词匹配。
pub(crate) fn count_phrase(lowered: &str, tokens: &[String], phrase: &str) -> usize {
    if phrase.contains(' ') || phrase.contains('-') {
        lowered.matches(phrase).count()
    } else {
        tokens.iter().filter(|token| token.as_str() == phrase).count()
    }
}

pub(crate) fn contains_phrase(lowered: &str, tokens: &[String], phrase: &str) -> bool {
    if phrase.contains(' ') || phrase.contains('-') {
        lowered.contains(phrase)
    } else {
        tokens
            .iter()
            .any(|token| token == phrase || token.starts_with(phrase))
    }
}
