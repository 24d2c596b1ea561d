use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::scenario::{Difficulty, Scenario};
use crate::scoring::rules::{
    category_improvement, category_keywords, category_strength, contains_phrase, count_phrase,
    DEVELOPED_ANSWER_WORDS, EMPATHY_PHRASES, HEDGE_LIMIT, HEDGE_PHRASES,
    IMPROVEMENT_HEDGING, IMPROVEMENT_MISSING_ACKNOWLEDGEMENT,
    IMPROVEMENT_MISSING_DISCOVERY_QUESTION, IMPROVEMENT_NO_NUMBERS, IMPROVEMENT_TOO_SHORT,
    MAX_FEEDBACK_ITEMS, SHORT_ANSWER_WORDS, STRENGTH_ACKNOWLEDGED, STRENGTH_CONCRETE_NUMBERS,
    STRENGTH_DEVELOPED_ANSWER, STRENGTH_DISCOVERY_QUESTION,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryScores {
    pub clarity: u8,
    pub confidence: u8,
    pub handling: u8,
    pub vocabulary: u8,
}

/// 会话完成时产出一次，之后不可变。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub overall_score: u8,
    pub categories: CategoryScores,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
}

/// 从转写中提取的特征。
#[derive(Debug)]
struct TranscriptFeatures {
    words: usize,
    questions: usize,
    keyword_hits: usize,
    empathy: bool,
    hedges: usize,
    distinct_words: usize,
    has_numbers: bool,
}

impl TranscriptFeatures {
    fn extract(transcript: &str, scenario: &Scenario) -> Self {
        let lowered = transcript.to_lowercase();
        let tokens: Vec<String> = lowered
            .split_whitespace()
            .map(|token| {
                token
                    .trim_matches(|c: char| !c.is_alphanumeric())
                    .to_string()
            })
            .filter(|token| !token.is_empty())
            .collect();

        let keyword_hits = category_keywords(scenario.objection_category())
            .iter()
            .filter(|keyword| contains_phrase(&lowered, &tokens, keyword))
            .count();
        let empathy = EMPATHY_PHRASES
            .iter()
            .any(|phrase| contains_phrase(&lowered, &tokens, phrase));
        let hedges = HEDGE_PHRASES
            .iter()
            .map(|phrase| count_phrase(&lowered, &tokens, phrase))
            .sum();
        let distinct_words = tokens
            .iter()
            .filter(|token| token.chars().all(char::is_alphabetic))
            .collect::<HashSet<_>>()
            .len();

        Self {
            words: transcript.split_whitespace().count(),
            questions: transcript.matches('?').count(),
            keyword_hits,
            empathy,
            hedges,
            distinct_words,
            has_numbers: transcript.chars().any(|c| c.is_ascii_digit()),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScoringEngine;

impl ScoringEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, transcript: &str, scenario: &Scenario) -> ScoreResult {
        let features = TranscriptFeatures::extract(transcript, scenario);
        let categories = Self::category_scores(&features, scenario.difficulty());

        let overall = 0.3 * f64::from(categories.clarity)
            + 0.3 * f64::from(categories.confidence)
            + 0.2 * f64::from(categories.handling)
            + 0.2 * f64::from(categories.vocabulary);
        // 加权和在浮点下可能出现 5.999…，先做微小修正再取整。
        let overall_score = ((overall + 1e-9).floor() as i64).clamp(0, 10) as u8;

        ScoreResult {
            overall_score,
            categories,
            strengths: Self::strengths(&features, scenario),
            improvements: Self::improvements(&features, scenario),
        }
    }

    fn category_scores(features: &TranscriptFeatures, difficulty: Difficulty) -> CategoryScores {
        let words = features.words as i64;
        let keyword_hits = features.keyword_hits as i64;
        let empathy = i64::from(features.empathy);

        let clarity = clamp(3 + words / 15, 3, 10);
        let confidence = clamp(
            4 + (words / 20).min(3) + empathy - features.hedges as i64,
            1,
            10,
        );
        let difficulty_adjust = match difficulty {
            Difficulty::Easy => 1,
            Difficulty::Medium => 0,
            Difficulty::Hard => -1,
        };
        let handling = clamp(
            2 + 2 * keyword_hits.min(3)
                + (features.questions as i64).min(2)
                + empathy
                + difficulty_adjust,
            1,
            10,
        );
        let vocabulary = clamp(
            1 + features.distinct_words as i64 / 8 + keyword_hits.min(2),
            1,
            10,
        );

        CategoryScores {
            clarity,
            confidence,
            handling,
            vocabulary,
        }
    }

    fn strengths(features: &TranscriptFeatures, scenario: &Scenario) -> Vec<String> {
        let candidates = [
            (
                features.keyword_hits > 0,
                category_strength(scenario.objection_category()),
            ),
            (features.questions > 0, STRENGTH_DISCOVERY_QUESTION),
            (features.empathy, STRENGTH_ACKNOWLEDGED),
            (features.has_numbers, STRENGTH_CONCRETE_NUMBERS),
            (
                features.words >= DEVELOPED_ANSWER_WORDS,
                STRENGTH_DEVELOPED_ANSWER,
            ),
        ];
        top_items(&candidates)
    }

    fn improvements(features: &TranscriptFeatures, scenario: &Scenario) -> Vec<String> {
        let candidates = [
            (features.questions == 0, IMPROVEMENT_MISSING_DISCOVERY_QUESTION),
            (
                features.keyword_hits == 0,
                category_improvement(scenario.objection_category()),
            ),
            (!features.empathy, IMPROVEMENT_MISSING_ACKNOWLEDGEMENT),
            (features.words < SHORT_ANSWER_WORDS, IMPROVEMENT_TOO_SHORT),
            (features.hedges >= HEDGE_LIMIT, IMPROVEMENT_HEDGING),
            (!features.has_numbers, IMPROVEMENT_NO_NUMBERS),
        ];
        top_items(&candidates)
    }
}

fn clamp(value: i64, min: i64, max: i64) -> u8 {
    value.clamp(min, max) as u8
}

fn top_items(candidates: &[(bool, &str)]) -> Vec<String> {
    candidates
        .iter()
        .filter(|(applies, _)| *applies)
        .take(MAX_FEEDBACK_ITEMS)
        .map(|(_, text)| text.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::ObjectionCategory;

    const PRICE_TRANSCRIPT: &str = "I understand the cost concern. Our ROI is typically realized within 3 months. Would that work for your budget?";

    fn price_scenario() -> Scenario {
        Scenario::parse("Medium", "Price", "SaaS", None).expect("scenario")
    }

    #[test]
    fn price_example_scores_as_expected() {
        let result = ScoringEngine::new().score(PRICE_TRANSCRIPT, &price_scenario());

        assert!(result.categories.clarity >= 4);
        assert!((1..=10).contains(&result.overall_score));
        assert!(result
            .strengths
            .iter()
            .any(|strength| strength.contains("ROI") || strength.contains("value")));
        assert!(!result
            .improvements
            .iter()
            .any(|item| item == IMPROVEMENT_MISSING_DISCOVERY_QUESTION));
    }

    #[test]
    fn price_example_exact_breakdown() {
        let result = ScoringEngine::new().score(PRICE_TRANSCRIPT, &price_scenario());

        // 19 words, 1 question, keywords {roi, budget}, 18 distinct words, no hedges.
        assert_eq!(
            result.categories,
            CategoryScores {
                clarity: 4,
                confidence: 5,
                handling: 8,
                vocabulary: 5,
            }
        );
        assert_eq!(result.overall_score, 5);
        assert_eq!(
            result.strengths,
            vec![
                "Reframed price around value and ROI".to_string(),
                STRENGTH_DISCOVERY_QUESTION.to_string(),
                STRENGTH_ACKNOWLEDGED.to_string(),
            ]
        );
        assert_eq!(result.improvements, Vec::<String>::new());
    }

    #[test]
    fn scoring_is_deterministic() {
        let engine = ScoringEngine::new();
        let scenario = price_scenario();
        for transcript in ["", PRICE_TRANSCRIPT, "um I guess maybe it's like fine"] {
            assert_eq!(
                engine.score(transcript, &scenario),
                engine.score(transcript, &scenario)
            );
        }
    }

    #[test]
    fn empty_transcript_hits_score_floor() {
        let result = ScoringEngine::new().score("", &price_scenario());

        assert_eq!(result.categories.clarity, 3);
        assert!(result.categories.confidence >= 1);
        assert!(result.categories.handling >= 1);
        assert!(result.categories.vocabulary >= 1);
        assert!(result.overall_score >= 1);
        assert!(result.strengths.is_empty());
        assert_eq!(
            result.improvements,
            vec![
                IMPROVEMENT_MISSING_DISCOVERY_QUESTION.to_string(),
                "Anchor the conversation on value and ROI rather than price".to_string(),
                IMPROVEMENT_MISSING_ACKNOWLEDGEMENT.to_string(),
            ]
        );
    }

    #[test]
    fn clarity_caps_at_ten() {
        let transcript = "word ".repeat(500);
        let result = ScoringEngine::new().score(&transcript, &price_scenario());
        assert_eq!(result.categories.clarity, 10);
        assert!(result.overall_score <= 10);
    }

    #[test]
    fn hedging_lowers_confidence() {
        let scenario = price_scenario();
        let engine = ScoringEngine::new();
        let plain = engine.score("The plan fits your budget well.", &scenario);
        let hedged = engine.score(
            "Um I guess the plan maybe kind of fits your budget.",
            &scenario,
        );
        assert!(hedged.categories.confidence < plain.categories.confidence);
        assert_eq!(hedged.categories.confidence, 1);
    }

    #[test]
    fn keywords_follow_the_objection_category() {
        let engine = ScoringEngine::new();
        let transcript = "Who else on your team needs to approve this decision?";
        let authority = Scenario::new(Difficulty::Medium, ObjectionCategory::Authority, "Retail")
            .expect("scenario");
        let price = price_scenario();

        let for_authority = engine.score(transcript, &authority);
        let for_price = engine.score(transcript, &price);

        assert!(for_authority.categories.handling > for_price.categories.handling);
        assert_eq!(
            for_authority.strengths.first().map(String::as_str),
            Some("Engaged the wider decision-making team")
        );
    }

    #[test]
    fn difficulty_adjusts_handling() {
        let engine = ScoringEngine::new();
        let easy = Scenario::new(Difficulty::Easy, ObjectionCategory::Price, "SaaS").expect("s");
        let hard = Scenario::new(Difficulty::Hard, ObjectionCategory::Price, "SaaS").expect("s");

        let easy_score = engine.score(PRICE_TRANSCRIPT, &easy);
        let hard_score = engine.score(PRICE_TRANSCRIPT, &hard);
        assert_eq!(
            easy_score.categories.handling,
            hard_score.categories.handling + 2
        );
    }
}
