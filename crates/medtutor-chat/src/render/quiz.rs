//! Quiz session.
//!
//! ```text
//! ShowingQuestion(i) --select--> Answered(i)
//! Answered(i) --next--> ShowingQuestion(i+1) | Answered(i+1)   (if i+1 < total)
//! any(i) --previous--> question i-1, replaying a recorded answer
//! Answered(last) --results--> ShowingResults(percent)
//! ```

use regex::Regex;
use std::sync::LazyLock;

use super::{percent, SessionError};
use crate::types::{QuizDocument, QuizQuestion};

static OPTION_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-E]\)\s*").expect("Invalid option label regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizState {
    ShowingQuestion { index: usize },
    Answered { index: usize, selected: usize },
    ShowingResults { percent: u32 },
}

/// How an option is displayed once its question is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionMark {
    Neutral,
    Correct,
    Wrong,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizResults {
    pub score: usize,
    pub total: usize,
    pub percent: u32,
    pub message: &'static str,
}

#[derive(Debug, Clone)]
pub struct QuizSession {
    doc: QuizDocument,
    current: usize,
    answers: Vec<Option<usize>>,
    score: usize,
    finished: bool,
}

impl QuizSession {
    /// Fails when the document has no questions or a malformed question.
    pub fn new(doc: QuizDocument) -> Result<Self, SessionError> {
        doc.validate()?;
        let total = doc.questions.len();
        Ok(Self {
            doc,
            current: 0,
            answers: vec![None; total],
            score: 0,
            finished: false,
        })
    }

    pub fn title(&self) -> &str {
        if self.doc.title.trim().is_empty() {
            "Quiz Médico"
        } else {
            &self.doc.title
        }
    }

    pub fn total(&self) -> usize {
        self.doc.questions.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_question(&self) -> &QuizQuestion {
        &self.doc.questions[self.current]
    }

    pub fn score(&self) -> usize {
        self.score
    }

    pub fn state(&self) -> QuizState {
        if self.finished {
            return QuizState::ShowingResults {
                percent: percent(self.score, self.total()),
            };
        }
        match self.answers[self.current] {
            Some(selected) => QuizState::Answered {
                index: self.current,
                selected,
            },
            None => QuizState::ShowingQuestion {
                index: self.current,
            },
        }
    }

    /// Answer the current question. A question can be answered only once.
    ///
    /// Returns whether the selection was correct.
    pub fn select(&mut self, option: usize) -> Result<bool, SessionError> {
        if self.finished {
            return Err(SessionError::Finished);
        }
        let question = &self.doc.questions[self.current];
        if option >= question.options.len() {
            return Err(SessionError::InvalidOption {
                index: option,
                count: question.options.len(),
            });
        }
        if self.answers[self.current].is_some() {
            return Err(SessionError::AlreadyAnswered(self.current));
        }

        let correct = option == question.correct;
        self.answers[self.current] = Some(option);
        if correct {
            self.score += 1;
        }
        Ok(correct)
    }

    /// Move to the next question once the current one is answered.
    ///
    /// Returns `Ok(false)` and stays put on the last question.
    pub fn next(&mut self) -> Result<bool, SessionError> {
        if self.finished {
            return Err(SessionError::Finished);
        }
        if self.answers[self.current].is_none() {
            return Err(SessionError::NotAnswered(self.current));
        }
        if self.current + 1 < self.total() {
            self.current += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Move back one question. A recorded answer is replayed, not re-scored.
    pub fn previous(&mut self) -> Result<bool, SessionError> {
        if self.finished {
            return Err(SessionError::Finished);
        }
        if self.current == 0 {
            return Ok(false);
        }
        self.current -= 1;
        Ok(true)
    }

    /// Finish the quiz. Requires the last question to be answered.
    pub fn results(&mut self) -> Result<QuizResults, SessionError> {
        let last = self.total().saturating_sub(1);
        if !self.finished {
            if self.current != last || self.answers.get(last).copied().flatten().is_none() {
                return Err(SessionError::NotAnswered(last));
            }
            self.finished = true;
        }
        let pct = percent(self.score, self.total());
        Ok(QuizResults {
            score: self.score,
            total: self.total(),
            percent: pct,
            message: feedback(pct),
        })
    }

    /// Display marks for the current question's options.
    pub fn option_marks(&self) -> Vec<OptionMark> {
        let question = self.current_question();
        let answer = self.answers[self.current];
        (0..question.options.len())
            .map(|i| match answer {
                None => OptionMark::Neutral,
                Some(_) if i == question.correct => OptionMark::Correct,
                Some(selected) if i == selected => OptionMark::Wrong,
                Some(_) => OptionMark::Neutral,
            })
            .collect()
    }

    /// Options of the current question with any `A) ` prefix removed.
    pub fn option_labels(&self) -> Vec<&str> {
        self.current_question()
            .options
            .iter()
            .map(|o| strip_option_label(o))
            .collect()
    }

    /// Explanation, shown only after the current question is answered.
    pub fn explanation(&self) -> Option<&str> {
        let question = self.current_question();
        match self.answers[self.current] {
            Some(_) if !question.explanation.is_empty() => Some(&question.explanation),
            _ => None,
        }
    }
}

/// Remove a leading `A) ` style label from an option.
pub fn strip_option_label(option: &str) -> &str {
    match OPTION_LABEL.find(option) {
        Some(m) => &option[m.end()..],
        None => option,
    }
}

/// Letter shown next to option `index`.
pub fn option_letter(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}

/// Feedback line for a final percentage.
pub fn feedback(percent: u32) -> &'static str {
    match percent {
        90.. => "🏆 Excelente!",
        70..=89 => "👏 Muito bem!",
        50..=69 => "📚 Continue estudando.",
        _ => "💪 Pratique mais!",
    }
}
