//! 确定性回退：远程服务不可用时按规则挑选对方台词。
//!
//! 远程不可用是常态路径，这里的每张表都必须能独立给出非空回复。

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::scenario::{ObjectionCategory, Scenario};

/// 用户发言按关键词归入的桶，按优先级依次匹配。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordBucket {
    Budget,
    Timeline,
    Proof,
    Value,
    Question,
}

impl KeywordBucket {
    pub const ORDER: [KeywordBucket; 5] = [
        KeywordBucket::Budget,
        KeywordBucket::Timeline,
        KeywordBucket::Proof,
        KeywordBucket::Value,
        KeywordBucket::Question,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeywordBucket::Budget => "budget",
            KeywordBucket::Timeline => "timeline",
            KeywordBucket::Proof => "proof",
            KeywordBucket::Value => "value",
            KeywordBucket::Question => "question",
        }
    }

    fn matches(&self, lowered: &str) -> bool {
        let keywords: &[&str] = match self {
            KeywordBucket::Budget => &["budget", "cost", "price", "pricing", "expensive", "afford"],
            KeywordBucket::Timeline => &["timeline", "when", "how long", "how soon", "deadline"],
            KeywordBucket::Proof => &["example", "case study", "reference", "proof", "testimonial"],
            KeywordBucket::Value => &["roi", "value", "return on", "payback", "worth"],
            KeywordBucket::Question => &["?"],
        };
        keywords.iter().any(|keyword| contains_keyword(lowered, keyword))
    }
}

fn contains_keyword(lowered: &str, keyword: &str) -> bool {
    if keyword.contains(' ') || !keyword.chars().all(char::is_alphanumeric) {
        return lowered.contains(keyword);
    }
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word == keyword)
}

pub fn classify(user_input: &str) -> Option<KeywordBucket> {
    let lowered = user_input.to_lowercase();
    KeywordBucket::ORDER
        .into_iter()
        .find(|bucket| bucket.matches(&lowered))
}

pub fn opening_lines(category: ObjectionCategory) -> &'static [&'static str] {
    match category {
        ObjectionCategory::Price => &[
            "Honestly, this is a lot more than we budgeted for. Why should we pay that much?",
            "Your pricing is well above the other quotes we have on the table.",
            "I like what I'm hearing, but the price is going to be a tough sell internally.",
        ],
        ObjectionCategory::Timing => &[
            "This isn't a good time for us. Can you check back next quarter?",
            "We're in the middle of a big rollout, so we can't take on anything new right now.",
            "Maybe later this year. Right now it's just not a priority.",
        ],
        ObjectionCategory::Trust => &[
            "I've never heard of your company. How do I know you'll still be around next year?",
            "We got burned by a vendor making similar promises. Why would this be different?",
            "Your claims sound great, but I'm skeptical they hold up in practice.",
        ],
        ObjectionCategory::Authority => &[
            "I'm not the one who makes this call. You'd have to convince my boss.",
            "Anything like this needs sign-off from procurement and finance.",
            "I'd have to run this by the leadership team before committing to anything.",
        ],
        ObjectionCategory::Competition => &[
            "We already work with one of your competitors and they're doing fine.",
            "Another vendor offered us something very similar for less.",
            "Switching from our current provider seems like more hassle than it's worth.",
        ],
        ObjectionCategory::Need => &[
            "I'm not sure we actually need this. Our current process works okay.",
            "We handle this in spreadsheets today and nobody has complained.",
            "I don't see what problem this would solve for us.",
        ],
    }
}

pub fn bucket_rebuttals(bucket: KeywordBucket) -> &'static [&'static str] {
    match bucket {
        KeywordBucket::Budget => &[
            "Even so, the number is the number. What flexibility do you have on cost?",
            "Our budget for this year is already locked. How would we even pay for it?",
        ],
        KeywordBucket::Timeline => &[
            "And how long would implementation take? We can't afford a drawn-out rollout.",
            "When would we actually start seeing results? I need something I can report on.",
        ],
        KeywordBucket::Proof => &[
            "Examples are nice, but do you have a customer in our industry I could talk to?",
            "Case studies always look great. What happened with the customers it didn't work for?",
        ],
        KeywordBucket::Value => &[
            "Everyone promises ROI. How exactly would you measure it for us?",
            "That value sounds theoretical. What would it look like in our first ninety days?",
        ],
        KeywordBucket::Question => &[
            "That's a fair question. Honestly, I'm still not convinced this is worth the change.",
            "Good question, but let me turn it around: why should I move on this now?",
        ],
    }
}

pub fn generic_rebuttals(category: ObjectionCategory) -> &'static [&'static str] {
    match category {
        ObjectionCategory::Price => &[
            "I hear you, but I still can't justify the price.",
            "That doesn't really change the fact that it's expensive.",
        ],
        ObjectionCategory::Timing => &[
            "I understand, but the timing still doesn't work for us.",
            "It all sounds fine, but we just don't have the bandwidth right now.",
        ],
        ObjectionCategory::Trust => &[
            "I'd need a lot more proof before I trust that.",
            "That's what every vendor says. Why should I believe you?",
        ],
        ObjectionCategory::Authority => &[
            "Like I said, I'm not the one who decides this.",
            "You'll need to get this in front of the people who sign the contracts.",
        ],
        ObjectionCategory::Competition => &[
            "Our current provider does most of that already.",
            "I still don't see why we'd switch from what we have.",
        ],
        ObjectionCategory::Need => &[
            "I'm still not convinced we have a problem that needs solving.",
            "That's interesting, but it's not something we're struggling with.",
        ],
    }
}

/// 回退台词选择器。随机源可用种子固定，便于复现。
#[derive(Debug)]
pub struct FallbackResponder {
    rng: Mutex<StdRng>,
}

impl Default for FallbackResponder {
    fn default() -> Self {
        Self::new(None)
    }
}

impl FallbackResponder {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng: Mutex::new(rng),
        }
    }

    fn pick(&self, options: &'static [&'static str]) -> &'static str {
        if options.len() <= 1 {
            return options.first().copied().unwrap_or_default();
        }
        let index = self
            .rng
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .random_range(0..options.len());
        options[index]
    }

    /// 首轮开场异议；若场景自带异议文本则原样使用。
    pub fn opening(&self, scenario: &Scenario) -> String {
        match scenario.custom_objection_text() {
            Some(custom) => custom.to_string(),
            None => self
                .pick(opening_lines(scenario.objection_category()))
                .to_string(),
        }
    }

    pub fn respond(&self, user_input: &str, scenario: &Scenario, first_turn: bool) -> String {
        if first_turn {
            return self.opening(scenario);
        }

        match classify(user_input) {
            Some(bucket) => self.pick(bucket_rebuttals(bucket)).to_string(),
            None => self
                .pick(generic_rebuttals(scenario.objection_category()))
                .to_string(),
        }
    }
}
