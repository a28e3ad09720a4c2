//! Case study session. Gated sections start hidden and toggle one at a time.

use super::SessionError;
use crate::types::{CaseSection, CaseStudyDocument};

#[derive(Debug, Clone)]
pub struct CaseStudySession {
    doc: CaseStudyDocument,
    revealed: Vec<bool>,
}

impl CaseStudySession {
    /// Fails when the case has no sections.
    pub fn new(doc: CaseStudyDocument) -> Result<Self, SessionError> {
        doc.validate()?;
        let revealed = vec![false; doc.sections.len()];
        Ok(Self { doc, revealed })
    }

    pub fn title(&self) -> &str {
        if self.doc.title.trim().is_empty() {
            "Caso Clínico"
        } else {
            &self.doc.title
        }
    }

    pub fn sections(&self) -> &[CaseSection] {
        &self.doc.sections
    }

    /// Non-gated sections are always visible.
    pub fn is_visible(&self, index: usize) -> bool {
        match self.doc.sections.get(index) {
            Some(section) => !section.reveal_gated || self.revealed[index],
            None => false,
        }
    }

    /// Flip one gated section. Returns its new visibility.
    ///
    /// Toggling a non-gated section is a no-op that reports `true`.
    pub fn toggle(&mut self, index: usize) -> Result<bool, SessionError> {
        let section = self.doc.sections.get(index).ok_or(SessionError::OutOfRange {
            index,
            count: self.doc.sections.len(),
        })?;
        if !section.reveal_gated {
            return Ok(true);
        }
        self.revealed[index] = !self.revealed[index];
        Ok(self.revealed[index])
    }

    /// Indices of gated sections that are still hidden.
    pub fn hidden(&self) -> Vec<usize> {
        (0..self.doc.sections.len())
            .filter(|i| !self.is_visible(*i))
            .collect()
    }
}
