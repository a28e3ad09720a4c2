//! Structured content parser.
//!
//! Pulls a JSON document of a known shape out of noisy model output: an
//! optional fenced code block, surrounding prose, or both.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

use crate::types::{StructuredDocument, DOCUMENT_TYPES};

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("Invalid fence regex"));

/// Inner content of the first fenced block, or the whole text.
fn unfence(text: &str) -> &str {
    FENCE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(text)
}

/// Greedy span from the first `{` to the last `}`.
fn object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse `text` into a structured document.
///
/// Returns `None` when no object is found, the JSON is malformed, the
/// `type` is missing or unknown, the fields do not fit the shape, or the
/// document breaks an invariant.
pub fn parse(text: &str) -> Option<StructuredDocument> {
    let candidate = object_span(unfence(text))?;
    let value: Value = serde_json::from_str(candidate).ok()?;

    let kind = value.get("type").and_then(Value::as_str)?.to_owned();
    if !DOCUMENT_TYPES.contains(&kind.as_str()) {
        debug!(kind = %kind, "Ignoring document with unknown type");
        return None;
    }

    let document: StructuredDocument = match serde_json::from_value(value) {
        Ok(doc) => doc,
        Err(e) => {
            debug!(kind = %kind, error = %e, "Document does not fit its shape");
            return None;
        }
    };
    if let Err(e) = document.validate() {
        debug!(kind = %kind, error = %e, "Rejecting invalid document");
        return None;
    }
    Some(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QuizDocument;

    const QUIZ: &str = r#"{"type":"quiz","title":"Cardiologia","questions":[
        {"question":"Q1?","options":["A) a","B) b","C) c"],"correct":2,"explanation":"e1"},
        {"question":"Q2?","options":["A) a","B) b"],"correct":0,"explanation":"e2"}
    ]}"#;

    fn quiz(doc: StructuredDocument) -> QuizDocument {
        match doc {
            StructuredDocument::Quiz(q) => q,
            other => panic!("expected quiz, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_bare_object() {
        let q = quiz(parse(QUIZ).unwrap());
        assert_eq!(q.title, "Cardiologia");
        assert_eq!(q.questions.len(), 2);
    }

    #[test]
    fn test_parse_fenced_with_prose() {
        let text = format!("Claro! Aqui está seu quiz:\n\n```json\n{}\n```\n\nBons estudos!", QUIZ);
        let q = quiz(parse(&text).unwrap());
        assert_eq!(q.title, "Cardiologia");
        assert_eq!(q.questions.len(), 2);
        let correct: Vec<usize> = q.questions.iter().map(|q| q.correct).collect();
        assert_eq!(correct, vec![2, 0]);
    }

    #[test]
    fn test_parse_unlabelled_fence() {
        let text = format!("```\n{}\n```", QUIZ);
        assert!(parse(&text).is_some());
    }

    #[test]
    fn test_parse_prose_wrapped_without_fence() {
        let text = format!("Segue: {} Espero que ajude.", QUIZ);
        assert!(parse(&text).is_some());
    }

    #[test]
    fn test_parse_flashcards_and_case() {
        let cards = r#"{"type":"flashcards","title":"Farmaco","cards":[{"front":"f","back":"b"}]}"#;
        assert!(matches!(parse(cards), Some(StructuredDocument::Flashcards(_))));

        let case = r#"{"type":"case_study","title":"IAM","sections":[{"heading":"HMA","content":"c"},{"heading":"Diagnóstico","content":"d","spoiler":true}]}"#;
        match parse(case) {
            Some(StructuredDocument::CaseStudy(c)) => {
                assert!(!c.sections[0].reveal_gated);
                assert!(c.sections[1].reveal_gated);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rejects_missing_or_unknown_type() {
        assert!(parse(r#"{"title":"x","questions":[]}"#).is_none());
        assert!(parse(r#"{"type":"essay","title":"x"}"#).is_none());
        assert!(parse(r#"{"type":7}"#).is_none());
    }

    #[test]
    fn test_rejects_non_json() {
        assert!(parse("Sem JSON aqui.").is_none());
        assert!(parse("{ isto não é json }").is_none());
        assert!(parse("} invertido {").is_none());
        assert!(parse("").is_none());
    }

    #[test]
    fn test_rejects_invariant_violations() {
        let out_of_range =
            r#"{"type":"quiz","title":"t","questions":[{"question":"q","options":["a","b"],"correct":2}]}"#;
        assert!(parse(out_of_range).is_none());

        let one_option =
            r#"{"type":"quiz","title":"t","questions":[{"question":"q","options":["a"],"correct":0}]}"#;
        assert!(parse(one_option).is_none());

        let no_cards = r#"{"type":"flashcards","title":"t","cards":[]}"#;
        assert!(parse(no_cards).is_none());
    }

    #[test]
    fn test_rejects_wrong_field_shapes() {
        let bad = r#"{"type":"flashcards","title":"t","cards":[{"front":"f"}]}"#;
        assert!(parse(bad).is_none());
    }

    #[test]
    fn test_single_item_document_is_valid() {
        let one = r#"{"type":"quiz","questions":[{"question":"q","options":["a","b"],"correct":1}]}"#;
        let q = quiz(parse(one).unwrap());
        assert_eq!(q.questions.len(), 1);
        assert_eq!(q.title, "");
    }
}
