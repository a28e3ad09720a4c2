//! Response router.
//!
//! Free-text categories are streamed and re-rendered as prose on every
//! delta. Structured categories wait for the complete text and try the
//! structured parser, falling back to prose when it finds nothing.

use serde::Serialize;
use tracing::debug;

use medtutor_core::types::ChatRequest;

use crate::error::ChatError;
use crate::markdown::normalize_markdown;
use crate::registry::PromptConfig;
use crate::stream::decode_stream;
use crate::structured;
use crate::transport::ChatTransport;
use crate::types::StructuredDocument;

/// Receives the whole prose rendered so far. Each call supersedes the last.
pub trait ProseSink {
    fn render(&mut self, cumulative: &str);
}

impl<F> ProseSink for F
where
    F: FnMut(&str),
{
    fn render(&mut self, cumulative: &str) {
        self(cumulative)
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProseSink for NullSink {
    fn render(&mut self, _cumulative: &str) {}
}

/// What the user sees for one response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderedResponse {
    Prose { text: String },
    Document { document: StructuredDocument },
}

impl RenderedResponse {
    pub fn prose(text: impl Into<String>) -> Self {
        RenderedResponse::Prose { text: text.into() }
    }

    pub fn is_document(&self) -> bool {
        matches!(self, RenderedResponse::Document { .. })
    }
}

/// A routed response: the raw model text kept in history, and its rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedResponse {
    pub raw_text: String,
    pub rendered: RenderedResponse,
}

/// Send `request` down the path selected by `config.output_shape`.
///
/// Prose, whether streamed or a structured fallback, always reaches `sink`.
/// An empty response is [`ChatError::EmptyResponse`].
pub async fn route(
    transport: &dyn ChatTransport,
    config: &PromptConfig,
    request: &ChatRequest,
    sink: &mut (dyn ProseSink + Send),
) -> Result<RoutedResponse, ChatError> {
    if !config.output_shape.is_structured() {
        let bytes = transport.stream(request).await?;
        let text = decode_stream(bytes, |_, cumulative| {
            sink.render(&normalize_markdown(cumulative));
        })
        .await?;
        if text.trim().is_empty() {
            return Err(ChatError::EmptyResponse);
        }
        let prose = normalize_markdown(&text);
        return Ok(RoutedResponse {
            raw_text: text,
            rendered: RenderedResponse::prose(prose),
        });
    }

    let text = transport.complete(request).await?;
    if text.trim().is_empty() {
        return Err(ChatError::EmptyResponse);
    }
    let rendered = match structured::parse(&text) {
        Some(document) => {
            debug!(
                category = %config.category,
                items = document.item_count(),
                "Rendering structured document"
            );
            RenderedResponse::Document { document }
        }
        None => {
            debug!(category = %config.category, "No structured document, rendering prose");
            let prose = normalize_markdown(&text);
            sink.render(&prose);
            RenderedResponse::prose(prose)
        }
    };
    Ok(RoutedResponse {
        raw_text: text,
        rendered,
    })
}
