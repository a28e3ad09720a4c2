//! Chat pipeline for MedTutor.
//!
//! Classifies a message into a category, sends it to the model provider
//! with that category's prompt configuration, decodes the streamed or
//! complete response, and renders it as prose or as an interactive
//! structured document.

pub mod classifier;
pub mod error;
pub mod extract;
pub mod markdown;
pub mod orchestrator;
pub mod registry;
pub mod render;
pub mod request;
pub mod router;
pub mod stream;
pub mod structured;
pub mod transport;
pub mod types;

pub use classifier::{classify, IntentClassifier};
pub use error::ChatError;
pub use orchestrator::{ChatOrchestrator, SendOutcome};
pub use registry::PromptConfig;
pub use render::{CaseStudySession, FlashcardSession, InteractiveSession, QuizSession, SessionError};
pub use router::{NullSink, ProseSink, RenderedResponse};
pub use stream::StreamDecoder;
pub use transport::{transport_from_config, ChatTransport, HttpTransport, UnconfiguredTransport};
pub use types::{Category, OutputShape, StructuredDocument};
