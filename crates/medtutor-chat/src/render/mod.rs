//! Interactive renderers: one explicit state machine per document kind.
//!
//! Sessions are ephemeral. They are created when a structured response is
//! shown and dropped with it; nothing here is persisted.

pub mod case_study;
pub mod flashcards;
pub mod quiz;

pub use case_study::CaseStudySession;
pub use flashcards::{CardSide, FlashcardSession, FlashcardTally};
pub use quiz::{OptionMark, QuizResults, QuizSession, QuizState};

use crate::types::StructuredDocument;

/// Invalid transitions. The session state is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("question {0} was already answered")]
    AlreadyAnswered(usize),
    #[error("question {0} has not been answered yet")]
    NotAnswered(usize),
    #[error("option {index} does not exist (question has {count} options)")]
    InvalidOption { index: usize, count: usize },
    #[error("item {index} does not exist (document has {count} items)")]
    OutOfRange { index: usize, count: usize },
    #[error("the quiz is finished")]
    Finished,
    #[error("{0}")]
    InvalidDocument(String),
}

impl From<crate::error::ChatError> for SessionError {
    fn from(err: crate::error::ChatError) -> Self {
        SessionError::InvalidDocument(err.to_string())
    }
}

/// A session attached to one structured document.
#[derive(Debug, Clone)]
pub enum InteractiveSession {
    Quiz(QuizSession),
    Flashcards(FlashcardSession),
    CaseStudy(CaseStudySession),
}

impl InteractiveSession {
    /// Start the session matching the document kind, in its initial state.
    ///
    /// Documents that break their invariants are rejected.
    pub fn start(document: StructuredDocument) -> Result<Self, SessionError> {
        Ok(match document {
            StructuredDocument::Quiz(d) => InteractiveSession::Quiz(QuizSession::new(d)?),
            StructuredDocument::Flashcards(d) => {
                InteractiveSession::Flashcards(FlashcardSession::new(d)?)
            }
            StructuredDocument::CaseStudy(d) => {
                InteractiveSession::CaseStudy(CaseStudySession::new(d)?)
            }
        })
    }

    pub fn title(&self) -> &str {
        match self {
            InteractiveSession::Quiz(s) => s.title(),
            InteractiveSession::Flashcards(s) => s.title(),
            InteractiveSession::CaseStudy(s) => s.title(),
        }
    }
}

/// `round(100 * part / whole)`, or 0 when `whole` is 0.
pub(crate) fn percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((part as f64 / whole as f64) * 100.0).round() as u32
}
