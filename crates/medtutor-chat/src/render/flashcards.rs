//! Flashcard session.
//!
//! ```text
//! Front(i) <--flip--> Back(i)
//! any(i) --mark right/wrong--> Front(i+1)   (tally += 1; stays at the last card)
//! any(i) --next/previous--> Front(i±1)      (tally untouched)
//! ```

use super::{percent, SessionError};
use crate::types::{Flashcard, FlashcardDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardSide {
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlashcardTally {
    pub correct: usize,
    pub incorrect: usize,
}

impl FlashcardTally {
    pub fn marked(&self) -> usize {
        self.correct + self.incorrect
    }

    /// `round(100 * correct / marked)`; 0 before anything is marked.
    pub fn percent_correct(&self) -> u32 {
        percent(self.correct, self.marked())
    }
}

#[derive(Debug, Clone)]
pub struct FlashcardSession {
    doc: FlashcardDocument,
    index: usize,
    side: CardSide,
    tally: FlashcardTally,
}

impl FlashcardSession {
    /// Fails when the deck is empty.
    pub fn new(doc: FlashcardDocument) -> Result<Self, SessionError> {
        doc.validate()?;
        Ok(Self {
            doc,
            index: 0,
            side: CardSide::Front,
            tally: FlashcardTally::default(),
        })
    }

    pub fn title(&self) -> &str {
        if self.doc.title.trim().is_empty() {
            "Flashcards Médicos"
        } else {
            &self.doc.title
        }
    }

    pub fn total(&self) -> usize {
        self.doc.cards.len()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn side(&self) -> CardSide {
        self.side
    }

    pub fn tally(&self) -> FlashcardTally {
        self.tally
    }

    pub fn current_card(&self) -> &Flashcard {
        &self.doc.cards[self.index]
    }

    /// Text on the visible side of the current card.
    pub fn visible_text(&self) -> &str {
        let card = self.current_card();
        match self.side {
            CardSide::Front => &card.front,
            CardSide::Back => &card.back,
        }
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 >= self.total()
    }

    pub fn flip(&mut self) -> CardSide {
        self.side = match self.side {
            CardSide::Front => CardSide::Back,
            CardSide::Back => CardSide::Front,
        };
        self.side
    }

    pub fn mark_right(&mut self) {
        self.tally.correct += 1;
        self.advance();
    }

    pub fn mark_wrong(&mut self) {
        self.tally.incorrect += 1;
        self.advance();
    }

    /// Returns whether the session moved.
    pub fn next(&mut self) -> bool {
        self.advance()
    }

    /// Returns whether the session moved.
    pub fn previous(&mut self) -> bool {
        if self.index == 0 {
            return false;
        }
        self.index -= 1;
        self.side = CardSide::Front;
        true
    }

    /// Jump to card `index`, front side up.
    pub fn go_to(&mut self, index: usize) -> Result<(), SessionError> {
        if index >= self.total() {
            return Err(SessionError::OutOfRange {
                index,
                count: self.total(),
            });
        }
        self.index = index;
        self.side = CardSide::Front;
        Ok(())
    }

    fn advance(&mut self) -> bool {
        if self.is_last() {
            return false;
        }
        self.index += 1;
        self.side = CardSide::Front;
        true
    }
}
