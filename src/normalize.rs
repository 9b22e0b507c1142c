//! Question classification, OCR text cleanup and answer canonicalization
//!
//! Everything here is heuristic. Misclassification is tolerated downstream: the
//! page renders whatever string comes out.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel returned when no option letter can be recovered from an MCQ answer
pub const INVALID_ANSWER: &str = "Invalid Answer";

/// How a question is asked and therefore how its answer is cleaned up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionMode {
    Mcq,
    ShortAnswer,
}

impl QuestionMode {
    pub fn from_short_answer_flag(is_short_answer: bool) -> Self {
        if is_short_answer { QuestionMode::ShortAnswer } else { QuestionMode::Mcq }
    }
}

impl fmt::Display for QuestionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionMode::Mcq => write!(f, "MCQ"),
            QuestionMode::ShortAnswer => write!(f, "short answer"),
        }
    }
}

static MCQ_MARKERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b[a-e]\s*\.\s*\w+",
        r"(?i)\b[a-e]\s*\)\s*\w+",
        r"(?i)\([a-e]\)\s*\w+",
        r"(?i)\boption\s+[a-e]\s*:",
        r"(?i)\bchoice\s+[a-e]\s*:",
        r"(?i)\banswer\s+[a-e]\s*:",
        r"(?im)^\s*[a-e]\s*$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid regex"))
    .collect()
});

static SEPARATOR_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-_\s]*$").expect("valid regex"));
static QUESTION_MARKERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"^\d+[.)]", r"(?i)question\s+\d+", r"(?i)^q\.?\s*\d+"]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("valid regex"))
        .collect()
});
static NUMBERED_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+[.)]").expect("valid regex"));
static OPTION_WITH_TEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)[a-e][.)]\s+\w+").expect("valid regex"));
static BARE_OPTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^[a-e][.)]\s*$").expect("valid regex"));

static ANSWER_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^answer:?\s*").expect("valid regex"));
static MCQ_ANSWER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // bare leading letter: "b", "b)", "c. paris"
        r"^([a-e])(?:[.:,)\s]|$)",
        // "option c", "choice: d", "the answer is b"
        r"\b(?:option|choice|answer(?:\s+is)?)\s*:?\s*\(?([a-e])\b",
        r"\(([a-e])\)",
        // exactly one candidate letter anywhere in the noise
        r"^[^a-e]*([a-e])[^a-e]*$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid regex"))
    .collect()
});
static QUALIFIER_CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+(?:but|note|however)\b").expect("valid regex"));

/// Guess whether `text` is a multiple-choice question from its option markers
pub fn classify_question(text: &str) -> QuestionMode {
    if MCQ_MARKERS.iter().any(|pattern| pattern.is_match(text)) {
        QuestionMode::Mcq
    } else {
        QuestionMode::ShortAnswer
    }
}

/// Isolate a single question block from raw OCR output.
///
/// Blank and punctuation-only lines are dropped. If a question marker is found,
/// lines are kept from it up to the next numbered line; otherwise the whole
/// cleaned text is returned.
pub fn clean_extracted_text(raw: &str) -> String {
    let lines: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !SEPARATOR_LINE.is_match(line))
        .filter(|line| line.chars().any(|c| c.is_ascii_alphanumeric()))
        .collect();

    let Some(start) = lines
        .iter()
        .position(|line| QUESTION_MARKERS.iter().any(|marker| marker.is_match(line)))
    else {
        debug!("No question marker found, keeping all {} lines", lines.len());
        return lines.join("\n");
    };

    let mut kept = Vec::new();
    let mut options_seen = false;
    for (offset, line) in lines[start..].iter().enumerate() {
        if offset > 0 && NUMBERED_LINE.is_match(line) {
            break;
        }
        if OPTION_WITH_TEXT.is_match(line) {
            options_seen = true;
        }
        if options_seen || !BARE_OPTION.is_match(line) {
            kept.push(*line);
        }
    }

    debug!("Kept {} of {} OCR lines", kept.len(), lines.len());
    kept.join("\n")
}

/// Canonicalize a backend's raw answer for display
pub fn format_answer(raw: &str, mode: QuestionMode) -> String {
    match mode {
        QuestionMode::Mcq => format_mcq_answer(raw),
        QuestionMode::ShortAnswer => format_short_answer(raw),
    }
}

fn format_mcq_answer(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let answer = ANSWER_PREFIX.replace(&lowered, "");

    for pattern in MCQ_ANSWER_PATTERNS.iter() {
        if let Some(letter) = pattern.captures(&answer).and_then(|caps| caps.get(1)) {
            return letter.as_str().to_uppercase();
        }
    }

    debug!("No MCQ answer pattern in {:?}", raw);
    INVALID_ANSWER.to_string()
}

fn format_short_answer(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_prefix = ANSWER_PREFIX.replace(trimmed, "");
    let first_clause = without_prefix
        .split(['.', '(', ')'])
        .next()
        .unwrap_or_default()
        .trim();
    QUALIFIER_CLAUSE
        .split(first_clause)
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Shape an answer for the popup: comma-separated parts are trimmed and
/// non-numeric parts upper-cased. Error messages pass through untouched.
pub fn display_answer(answer: &str) -> String {
    if is_error_message(answer) {
        return answer.to_string();
    }
    answer
        .split(',')
        .map(str::trim)
        .map(|part| if part.parse::<f64>().is_ok() { part.to_string() } else { part.to_uppercase() })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Whether a rendered message is an error notice
pub fn is_error_message(text: &str) -> bool {
    text.starts_with("Error:")
}

/// Prefix a failure for rendering in the page
pub fn error_message(detail: impl fmt::Display) -> String {
    format!("Error: {}", detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_mcq() {
        assert_eq!(classify_question("1. What is 2+2?\na) 3\nb) 4"), QuestionMode::Mcq);
        assert_eq!(classify_question("Which is prime?\n(a) 4 (b) 7"), QuestionMode::Mcq);
        assert_eq!(classify_question("Option A: red\nOption B: blue"), QuestionMode::Mcq);
        assert_eq!(classify_question("Pick one\nA. Mercury\nB. Venus"), QuestionMode::Mcq);
        assert_eq!(classify_question("Pick one:\na\nb\nc"), QuestionMode::Mcq);
    }

    #[test]
    fn test_classify_short_answer() {
        assert_eq!(classify_question("What is the capital of France?"), QuestionMode::ShortAnswer);
        assert_eq!(classify_question("Name the largest planet."), QuestionMode::ShortAnswer);
        // letters inside words are not option markers
        assert_eq!(classify_question("The sky is blue. Why?"), QuestionMode::ShortAnswer);
    }

    #[test]
    fn test_clean_isolates_first_question() {
        let raw = "Chapter 3 Quiz\n-----\n\n1. What is 2+2?\na) 3\nb) 4\n2. What is 3+3?\na) 6";
        assert_eq!(clean_extracted_text(raw), "1. What is 2+2?\na) 3\nb) 4");
    }

    #[test]
    fn test_clean_recognizes_question_word_marker() {
        let raw = "Page header\nQuestion 7 of 10\nWho wrote Hamlet?\n***";
        assert_eq!(clean_extracted_text(raw), "Question 7 of 10\nWho wrote Hamlet?");
    }

    #[test]
    fn test_clean_drops_bare_option_letters_before_options() {
        let raw = "Q3 Which gas do plants absorb?\na.\nb)\na. Oxygen\nb. Carbon dioxide";
        assert_eq!(
            clean_extracted_text(raw),
            "Q3 Which gas do plants absorb?\na. Oxygen\nb. Carbon dioxide"
        );
    }

    #[test]
    fn test_clean_without_marker_keeps_everything() {
        let raw = "  What is the boiling point of water?  \n\n...\n in Celsius ";
        assert_eq!(clean_extracted_text(raw), "What is the boiling point of water?\nin Celsius");
    }

    #[test]
    fn test_clean_empty() {
        assert_eq!(clean_extracted_text(""), "");
        assert_eq!(clean_extracted_text("---\n***\n"), "");
    }

    #[test]
    fn test_format_mcq() {
        assert_eq!(format_answer("b) paris", QuestionMode::Mcq), "B");
        assert_eq!(format_answer("The answer is c.", QuestionMode::Mcq), "C");
        assert_eq!(format_answer("no letter here", QuestionMode::Mcq), INVALID_ANSWER);
    }

    #[test]
    fn test_format_mcq_variants() {
        assert_eq!(format_answer("A", QuestionMode::Mcq), "A");
        assert_eq!(format_answer("Answer: d", QuestionMode::Mcq), "D");
        assert_eq!(format_answer("Option E", QuestionMode::Mcq), "E");
        assert_eq!(format_answer("I pick (b)", QuestionMode::Mcq), "B");
        assert_eq!(format_answer("  ...c!!  ", QuestionMode::Mcq), "C");
        assert_eq!(format_answer("", QuestionMode::Mcq), INVALID_ANSWER);
    }

    #[test]
    fn test_format_mcq_leading_word_is_not_a_letter() {
        // "about" starts with a-e but is not a bare letter
        assert_eq!(format_answer("about option d", QuestionMode::Mcq), "D");
    }

    #[test]
    fn test_format_short_answer() {
        assert_eq!(
            format_answer("Answer: Paris. but note alternate spelling", QuestionMode::ShortAnswer),
            "Paris"
        );
        assert_eq!(format_answer("Jupiter (the largest)", QuestionMode::ShortAnswer), "Jupiter");
        assert_eq!(format_answer("Oxygen however it varies", QuestionMode::ShortAnswer), "Oxygen");
        assert_eq!(format_answer("cat,dog", QuestionMode::ShortAnswer), "cat,dog");
    }

    #[test]
    fn test_display_answer() {
        assert_eq!(display_answer("cat, dog"), "CAT, DOG");
        assert_eq!(display_answer("a,b"), "A, B");
        assert_eq!(display_answer("4"), "4");
        assert_eq!(display_answer(" 12 ,x"), "12, X");
        assert_eq!(display_answer("Error: Selection area too small"), "Error: Selection area too small");
    }

    #[test]
    fn test_mode_from_flag() {
        assert_eq!(QuestionMode::from_short_answer_flag(true), QuestionMode::ShortAnswer);
        assert_eq!(QuestionMode::from_short_answer_flag(false), QuestionMode::Mcq);
    }
}
