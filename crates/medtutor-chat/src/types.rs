//! Pipeline types: categories, output shapes and structured documents.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

// =============================================================================
// Category
// =============================================================================

/// Classification label selecting a system instruction and output shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    /// Lesson plans, rubrics, OSCE checklists and other teaching material.
    CurriculumTooling,
    /// Printable exams in board-exam style.
    AssessmentGenerator,
    /// Interactive multiple-choice quiz.
    ExamGenerator,
    /// Interactive flashcards.
    StudyCardGenerator,
    /// Interactive clinical case.
    ScenarioSimulator,
    /// Radiology and other medical image reports.
    ImageAnalysis,
    /// Socratic tutor; the default.
    GeneralTutor,
}

impl Category {
    /// Every category, in classification priority order. The default is last.
    pub const ALL: [Category; 7] = [
        Category::CurriculumTooling,
        Category::AssessmentGenerator,
        Category::ExamGenerator,
        Category::StudyCardGenerator,
        Category::ScenarioSimulator,
        Category::ImageAnalysis,
        Category::GeneralTutor,
    ];

    /// The category returned when no rule matches.
    pub const DEFAULT: Category = Category::GeneralTutor;

    pub fn is_default(self) -> bool {
        self == Self::DEFAULT
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::CurriculumTooling => "CURRICULUM_TOOLING",
            Category::AssessmentGenerator => "ASSESSMENT_GENERATOR",
            Category::ExamGenerator => "EXAM_GENERATOR",
            Category::StudyCardGenerator => "STUDY_CARD_GENERATOR",
            Category::ScenarioSimulator => "SCENARIO_SIMULATOR",
            Category::ImageAnalysis => "IMAGE_ANALYSIS",
            Category::GeneralTutor => "GENERAL_TUTOR",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Shape the model is instructed to answer in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputShape {
    FreeText,
    QuizDocument,
    FlashcardDocument,
    CaseStudyDocument,
}

impl OutputShape {
    /// Structured shapes are awaited in full and parsed; free text is streamed.
    pub fn is_structured(self) -> bool {
        !matches!(self, OutputShape::FreeText)
    }
}

// =============================================================================
// Structured documents
// =============================================================================

/// A machine-checkable document returned by the model.
///
/// On the wire the variant is selected by a `type` field:
/// `quiz`, `flashcards` or `case_study`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StructuredDocument {
    Quiz(QuizDocument),
    Flashcards(FlashcardDocument),
    CaseStudy(CaseStudyDocument),
}

/// Wire names accepted in the `type` discriminator.
pub const DOCUMENT_TYPES: [&str; 3] = ["quiz", "flashcards", "case_study"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizDocument {
    #[serde(default)]
    pub title: String,
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    #[serde(rename = "question")]
    pub prompt: String,
    pub options: Vec<String>,
    /// Zero-based index into `options`.
    pub correct: usize,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashcardDocument {
    #[serde(default)]
    pub title: String,
    pub cards: Vec<Flashcard>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseStudyDocument {
    #[serde(default)]
    pub title: String,
    pub sections: Vec<CaseSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSection {
    pub heading: String,
    #[serde(rename = "content")]
    pub body: String,
    /// Hidden until the user reveals it (the case resolution).
    #[serde(rename = "spoiler", default)]
    pub reveal_gated: bool,
}

impl StructuredDocument {
    pub fn shape(&self) -> OutputShape {
        match self {
            StructuredDocument::Quiz(_) => OutputShape::QuizDocument,
            StructuredDocument::Flashcards(_) => OutputShape::FlashcardDocument,
            StructuredDocument::CaseStudy(_) => OutputShape::CaseStudyDocument,
        }
    }

    /// Title, or a kind-specific fallback when the model left it empty.
    pub fn display_title(&self) -> &str {
        let (title, fallback) = match self {
            StructuredDocument::Quiz(d) => (&d.title, "Quiz Médico"),
            StructuredDocument::Flashcards(d) => (&d.title, "Flashcards Médicos"),
            StructuredDocument::CaseStudy(d) => (&d.title, "Caso Clínico"),
        };
        if title.trim().is_empty() {
            fallback
        } else {
            title
        }
    }

    /// Number of items in the primary collection.
    pub fn item_count(&self) -> usize {
        match self {
            StructuredDocument::Quiz(d) => d.questions.len(),
            StructuredDocument::Flashcards(d) => d.cards.len(),
            StructuredDocument::CaseStudy(d) => d.sections.len(),
        }
    }

    /// Check the document invariants: a non-empty primary collection and,
    /// for quizzes, at least two options with an in-range correct index.
    pub fn validate(&self) -> Result<(), ChatError> {
        match self {
            StructuredDocument::Quiz(d) => d.validate(),
            StructuredDocument::Flashcards(d) => d.validate(),
            StructuredDocument::CaseStudy(d) => d.validate(),
        }
    }
}

fn require_items(count: usize) -> Result<(), ChatError> {
    if count == 0 {
        return Err(ChatError::InvalidDocument(
            "document has no items".to_string(),
        ));
    }
    Ok(())
}

impl QuizDocument {
    pub fn validate(&self) -> Result<(), ChatError> {
        require_items(self.questions.len())?;
        for (i, q) in self.questions.iter().enumerate() {
            if q.options.len() < 2 {
                return Err(ChatError::InvalidDocument(format!(
                    "question {} has {} option(s)",
                    i + 1,
                    q.options.len()
                )));
            }
            if q.correct >= q.options.len() {
                return Err(ChatError::InvalidDocument(format!(
                    "question {} marks option {} correct but has {} options",
                    i + 1,
                    q.correct,
                    q.options.len()
                )));
            }
        }
        Ok(())
    }
}

impl FlashcardDocument {
    pub fn validate(&self) -> Result<(), ChatError> {
        require_items(self.cards.len())
    }
}

impl CaseStudyDocument {
    pub fn validate(&self) -> Result<(), ChatError> {
        require_items(self.sections.len())
    }
}
