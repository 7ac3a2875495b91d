//! Keyword sentiment scoring.
//!
//! Scores are the clamped sum of signed token weights, so a text with many
//! negative words lands near -1.0 while one stray "bad" in a long neutral
//! post stays near zero. `None` means the text carried no sentiment-bearing
//! words at all, which is distinct from a balanced 0.0.

use std::collections::HashSet;
use std::sync::OnceLock;

use serde::Serialize;

/// Contribution of one sentiment-bearing token before intensification.
const BASE_WEIGHT: f64 = 0.5;
/// Applied when the previous token was an intensifier ("really awful").
const INTENSIFIER_MULTIPLIER: f64 = 1.5;

const POSITIVE_WORDS: &[&str] = &[
    "love", "loved", "loving", "great", "amazing", "wonderful", "fantastic",
    "happy", "happier", "recommend", "recommended", "perfect", "relief",
    "comfortable", "easy", "easier", "helped", "helping", "works", "worked",
    "effective", "glad", "satisfied", "awesome", "excellent", "best", "better",
    "worth", "grateful", "thankful", "thrilled", "pleased", "enjoy", "enjoying",
    "improvement", "improved", "freedom", "convenient", "reliable", "safe",
    "success", "successful", "smooth", "positive", "hopeful", "reassuring",
];

const NEGATIVE_WORDS: &[&str] = &[
    "hate", "hated", "hating", "terrible", "awful", "horrible", "worst",
    "pain", "painful", "suffering", "miserable", "nightmare", "regret",
    "regretted", "angry", "frustrated", "frustrating", "unbearable",
    "ruined", "scared", "scary", "fear", "worried", "worry", "worrying",
    "concerned", "bad", "worse", "sucks", "sucked", "annoying", "annoyed",
    "disappointing", "disappointed", "uncomfortable", "difficult", "hard",
    "struggle", "struggling", "failed", "failure", "problem", "problems",
    "issue", "issues", "wrong", "severe", "seriously", "misery", "cry",
    "crying", "cried", "upset", "distressed", "hurt", "hurts",
];

const INTENSIFIERS: &[&str] = &[
    "very", "really", "extremely", "so", "incredibly", "super", "absolutely",
    "totally",
];

const NEGATORS: &[&str] = &[
    "not", "no", "never", "don't", "didn't", "doesn't", "wasn't", "weren't",
    "isn't", "aren't", "won't", "can't", "couldn't", "shouldn't", "hardly",
    "barely",
];

struct WordSets {
    positive: HashSet<&'static str>,
    negative: HashSet<&'static str>,
    intensifiers: HashSet<&'static str>,
    negators: HashSet<&'static str>,
}

fn word_sets() -> &'static WordSets {
    static SETS: OnceLock<WordSets> = OnceLock::new();
    SETS.get_or_init(|| WordSets {
        positive: POSITIVE_WORDS.iter().copied().collect(),
        negative: NEGATIVE_WORDS.iter().copied().collect(),
        intensifiers: INTENSIFIERS.iter().copied().collect(),
        negators: NEGATORS.iter().copied().collect(),
    })
}

/// Score `text` in [-1.0, 1.0], or `None` when it contains no sentiment
/// words. A negator flips the sign of the next sentiment word; an
/// intensifier boosts its weight. Both modifiers reset after any other
/// token, so "not a huge fan but okay" does not negate words a sentence
/// later.
pub fn score(text: &str) -> Option<f64> {
    if text.is_empty() {
        return None;
    }
    let sets = word_sets();

    let mut sum = 0.0;
    let mut hits = 0u32;
    let mut negate = false;
    let mut intensify = 1.0;

    for word in tokenize(text) {
        let word = word.as_str();
        if sets.negators.contains(word) {
            negate = true;
            continue;
        }
        if sets.intensifiers.contains(word) {
            intensify = INTENSIFIER_MULTIPLIER;
            continue;
        }

        let polarity = if sets.positive.contains(word) {
            Some(1.0)
        } else if sets.negative.contains(word) {
            Some(-1.0)
        } else {
            None
        };

        match polarity {
            Some(sign) => {
                let sign = if negate { -sign } else { sign };
                sum += sign * BASE_WEIGHT * intensify;
                hits += 1;
            }
            None => {}
        }
        negate = false;
        intensify = 1.0;
    }

    if hits == 0 {
        None
    } else {
        Some(sum.clamp(-1.0, 1.0))
    }
}

/// One token's part in a score, for the annotated breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreStep {
    pub word: String,
    pub role: &'static str,
    /// Signed contribution to the running sum; modifiers contribute 0.
    pub contribution: f64,
}

/// Step-by-step account of how a text was scored.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub score: Option<f64>,
    pub steps: Vec<ScoreStep>,
    pub summary: String,
}

/// The same walk as `score`, recording what each recognized token did.
/// Plain tokens reset the pending modifiers silently and emit no step.
pub fn explain(text: &str) -> ScoreBreakdown {
    let sets = word_sets();

    let mut steps = Vec::new();
    let mut sum = 0.0;
    let mut hits = 0u32;
    let mut negate = false;
    let mut intensify = 1.0;

    for word in tokenize(text) {
        let w = word.as_str();
        if sets.negators.contains(w) {
            negate = true;
            steps.push(ScoreStep { word, role: "negator", contribution: 0.0 });
            continue;
        }
        if sets.intensifiers.contains(w) {
            intensify = INTENSIFIER_MULTIPLIER;
            steps.push(ScoreStep { word, role: "intensifier", contribution: 0.0 });
            continue;
        }

        let polarity = if sets.positive.contains(w) {
            Some((1.0, "positive", "positive (negated)"))
        } else if sets.negative.contains(w) {
            Some((-1.0, "negative", "negative (negated)"))
        } else {
            None
        };
        if let Some((sign, role, negated_role)) = polarity {
            let (sign, role) = if negate { (-sign, negated_role) } else { (sign, role) };
            let contribution = sign * BASE_WEIGHT * intensify;
            sum += contribution;
            hits += 1;
            steps.push(ScoreStep { word, role, contribution });
        }
        negate = false;
        intensify = 1.0;
    }

    let score = if hits == 0 { None } else { Some(sum.clamp(-1.0, 1.0)) };
    let summary = match score {
        None => "No sentiment words detected.".to_string(),
        Some(s) => format!("{hits} sentiment words, raw sum {sum:.2}, score {s:.2}"),
    };
    ScoreBreakdown { score, steps, summary }
}

/// Lowercased runs of letters and apostrophes, so contractions like "didn't"
/// survive as single tokens.
fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in lower.chars() {
        if ch.is_ascii_alphabetic() || ch == '\'' {
            current.push(ch);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}
