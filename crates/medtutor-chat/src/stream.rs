//! Incremental decoder for line-delimited completion streams.
//!
//! Bytes arrive in arbitrary chunks. The decoder carries split UTF-8 code
//! points and unterminated lines across chunks, extracts one delta per
//! `data:` frame and reports it together with the cumulative text. When a
//! stream produced no deltas at all, the whole raw body is parsed once as
//! plain JSON instead.

use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ChatError;
use crate::extract::{body_text, frame_delta};

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Streamed response accumulator.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    /// Unterminated remainder of the last line.
    line_buf: String,
    /// Leading bytes of a code point split across chunks.
    utf8_carry: Vec<u8>,
    /// Everything received, kept only until the first delta arrives.
    raw: String,
    text: String,
    frames: usize,
    deltas: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cumulative decoded text so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of non-empty, non-sentinel data frames seen.
    pub fn frame_count(&self) -> usize {
        self.frames
    }

    /// Number of deltas reported.
    pub fn delta_count(&self) -> usize {
        self.deltas
    }

    /// Feed one chunk. `on_delta(delta, cumulative)` runs synchronously for
    /// every delta found in the complete lines of this chunk.
    pub fn push<F>(&mut self, chunk: &[u8], on_delta: &mut F)
    where
        F: FnMut(&str, &str),
    {
        let decoded = self.decode_utf8(chunk);
        if decoded.is_empty() {
            return;
        }
        if self.deltas == 0 {
            self.raw.push_str(&decoded);
        }
        self.line_buf.push_str(&decoded);

        while let Some(pos) = self.line_buf.find('\n') {
            let line: String = self.line_buf.drain(..=pos).collect();
            self.process_line(&line, on_delta);
        }
    }

    /// Flush the final unterminated line, run the whole-body fallback when
    /// no deltas were produced, and return the cumulative text.
    pub fn finish<F>(mut self, on_delta: &mut F) -> String
    where
        F: FnMut(&str, &str),
    {
        if !self.utf8_carry.is_empty() {
            let tail = String::from_utf8_lossy(&self.utf8_carry).into_owned();
            self.utf8_carry.clear();
            if self.deltas == 0 {
                self.raw.push_str(&tail);
            }
            self.line_buf.push_str(&tail);
        }

        if !self.line_buf.is_empty() {
            let line = std::mem::take(&mut self.line_buf);
            self.process_line(&line, on_delta);
        }

        if self.deltas == 0 {
            self.fallback(on_delta);
        }

        debug!(
            frames = self.frames,
            deltas = self.deltas,
            chars = self.text.len(),
            "Stream decoded"
        );
        self.text
    }

    fn decode_utf8(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.utf8_carry);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            self.utf8_carry = after.to_vec();
                            break;
                        }
                        Some(n) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[n..];
                        }
                    }
                }
            }
        }
        out
    }

    fn process_line<F>(&mut self, line: &str, on_delta: &mut F)
    where
        F: FnMut(&str, &str),
    {
        let line = line.trim_end_matches(['\n', '\r']);
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return;
        };
        let payload = payload.trim();
        if payload.is_empty() || payload == DONE_SENTINEL {
            return;
        }
        self.frames += 1;

        match serde_json::from_str::<Value>(payload) {
            Ok(frame) => {
                if let Some(delta) = frame_delta(&frame) {
                    self.emit(delta, on_delta);
                }
            }
            Err(e) => {
                let preview: String = payload.chars().take(120).collect();
                warn!(error = %e, frame = %preview, "Skipping malformed stream frame");
            }
        }
    }

    fn fallback<F>(&mut self, on_delta: &mut F)
    where
        F: FnMut(&str, &str),
    {
        let raw = std::mem::take(&mut self.raw);
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(body) => match body_text(&body) {
                Some(text) => {
                    debug!("No stream frames; decoded whole body");
                    self.emit(text, on_delta);
                }
                None => warn!("Stream body parsed but carried no text"),
            },
            Err(e) => {
                if self.frames == 0 {
                    warn!(error = %e, "Could not parse stream body as JSON");
                }
            }
        }
    }

    fn emit<F>(&mut self, delta: &str, on_delta: &mut F)
    where
        F: FnMut(&str, &str),
    {
        if self.deltas == 0 {
            self.raw = String::new();
        }
        self.text.push_str(delta);
        self.deltas += 1;
        on_delta(delta, &self.text);
    }
}

/// Decode an async byte stream to completion.
///
/// A transport error in the middle of the stream ends decoding and is
/// returned; the partial text is discarded.
pub async fn decode_stream<S, B, F>(mut source: S, mut on_delta: F) -> Result<String, ChatError>
where
    S: Stream<Item = Result<B, ChatError>> + Unpin,
    B: AsRef<[u8]>,
    F: FnMut(&str, &str),
{
    let mut decoder = StreamDecoder::new();
    while let Some(chunk) = source.next().await {
        let chunk = chunk?;
        decoder.push(chunk.as_ref(), &mut on_delta);
    }
    Ok(decoder.finish(&mut on_delta))
}

/// Decode an in-memory sequence of chunks.
pub fn decode_chunks<I, B, F>(chunks: I, mut on_delta: F) -> String
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
    F: FnMut(&str, &str),
{
    let mut decoder = StreamDecoder::new();
    for chunk in chunks {
        decoder.push(chunk.as_ref(), &mut on_delta);
    }
    decoder.finish(&mut on_delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sse(deltas: &[&str]) -> String {
        let mut body = String::new();
        for d in deltas {
            let frame = serde_json::json!({"choices":[{"delta":{"content":d}}]});
            body.push_str(&format!("data: {}\n\n", frame));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    fn collect(chunks: Vec<Vec<u8>>) -> (String, Vec<String>) {
        let mut seen = Vec::new();
        let text = decode_chunks(chunks, |delta, _| seen.push(delta.to_string()));
        (text, seen)
    }

    // =========================================================================
    // Frames
    // =========================================================================

    #[test]
    fn test_single_chunk() {
        let body = sse(&["Olá", ", ", "mundo"]);
        let (text, deltas) = collect(vec![body.into_bytes()]);
        assert_eq!(text, "Olá, mundo");
        assert_eq!(deltas, vec!["Olá", ", ", "mundo"]);
    }

    #[test]
    fn test_cumulative_passed_to_callback() {
        let body = sse(&["a", "b", "c"]);
        let mut cumulative = Vec::new();
        decode_chunks([body], |_, full| cumulative.push(full.to_string()));
        assert_eq!(cumulative, vec!["a", "ab", "abc"]);
    }

    #[test]
    fn test_any_chunking_yields_same_text() {
        let body = sse(&["Insuficiência ", "cardíaca ", "é… ", "🫀 grave"]).into_bytes();
        let (expected, _) = collect(vec![body.clone()]);

        for size in 1..=17 {
            let chunks: Vec<Vec<u8>> = body.chunks(size).map(|c| c.to_vec()).collect();
            let (text, _) = collect(chunks);
            assert_eq!(text, expected, "chunk size {}", size);
        }
        // Uneven split points as well.
        for split in 0..body.len() {
            let (a, b) = body.split_at(split);
            let (text, _) = collect(vec![a.to_vec(), b.to_vec()]);
            assert_eq!(text, expected, "split at {}", split);
        }
    }

    #[test]
    fn test_split_code_point_is_carried() {
        let body = sse(&["ação"]).into_bytes();
        let pos = body.iter().position(|b| *b == 0xC3).unwrap();
        let (text, _) = collect(vec![body[..=pos].to_vec(), body[pos + 1..].to_vec()]);
        assert_eq!(text, "ação");
        assert!(!text.contains(char::REPLACEMENT_CHARACTER));
    }

    #[test]
    fn test_malformed_frame_is_skipped() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"um \"}}]}\n",
            "data: {not json\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"dois\"}}]}\n",
            "data: [DONE]\n",
        );
        let mut decoder = StreamDecoder::new();
        decoder.push(body.as_bytes(), &mut |_, _| {});
        assert_eq!(decoder.frame_count(), 3);
        assert_eq!(decoder.delta_count(), 2);
        assert_eq!(decoder.finish(&mut |_, _| {}), "um dois");
    }

    #[test]
    fn test_flat_text_and_content_frames() {
        let body = "data: {\"text\":\"a\"}\ndata: {\"content\":\"b\"}\n";
        let (text, _) = collect(vec![body.as_bytes().to_vec()]);
        assert_eq!(text, "ab");
    }

    #[test]
    fn test_crlf_lines() {
        let body = "data: {\"text\":\"x\"}\r\n\r\ndata: {\"text\":\"y\"}\r\n\r\ndata: [DONE]\r\n";
        let (text, _) = collect(vec![body.as_bytes().to_vec()]);
        assert_eq!(text, "xy");
    }

    #[test]
    fn test_unterminated_final_frame_is_processed() {
        let body = "data: {\"text\":\"a\"}\ndata: {\"text\":\"b\"}";
        let (text, _) = collect(vec![body.as_bytes().to_vec()]);
        assert_eq!(text, "ab");
    }

    #[test]
    fn test_blank_and_comment_lines_ignored() {
        let body = ": keep-alive\n\nevent: message\ndata:   \ndata: {\"text\":\"z\"}\n";
        let mut decoder = StreamDecoder::new();
        decoder.push(body.as_bytes(), &mut |_, _| {});
        assert_eq!(decoder.frame_count(), 1);
        assert_eq!(decoder.text(), "z");
    }

    // =========================================================================
    // Whole-body fallback
    // =========================================================================

    #[test]
    fn test_fallback_pretty_printed_body() {
        let body = "{\n  \"choices\": [\n    {\"message\": {\"content\": \"completo\"}}\n  ]\n}\n";
        let chunks: Vec<Vec<u8>> = body.as_bytes().chunks(5).map(|c| c.to_vec()).collect();
        let (text, deltas) = collect(chunks);
        assert_eq!(text, "completo");
        assert_eq!(deltas.len(), 1);
    }

    #[test]
    fn test_fallback_array_with_outputs() {
        let body = r#"[{"outputs":["saída única"]}]"#;
        let (text, _) = collect(vec![body.as_bytes().to_vec()]);
        assert_eq!(text, "saída única");
    }

    #[test]
    fn test_nothing_decodable_yields_empty() {
        let (text, deltas) = collect(vec![b"<html>502 Bad Gateway</html>".to_vec()]);
        assert_eq!(text, "");
        assert!(deltas.is_empty());

        let (text, _) = collect(vec![]);
        assert_eq!(text, "");
    }

    #[test]
    fn test_fallback_not_used_when_frames_produced_text() {
        // A body that is both a valid frame stream and would be garbage as JSON.
        let body = "data: {\"text\":\"só isso\"}\n";
        let (text, deltas) = collect(vec![body.as_bytes().to_vec()]);
        assert_eq!(text, "só isso");
        assert_eq!(deltas.len(), 1);
    }

    // =========================================================================
    // Async
    // =========================================================================

    #[tokio::test]
    async fn test_decode_stream_async() {
        let body = sse(&["a", "b"]).into_bytes();
        let chunks: Vec<Result<Vec<u8>, ChatError>> =
            body.chunks(7).map(|c| Ok(c.to_vec())).collect();
        let text = decode_stream(futures::stream::iter(chunks), |_, _| {})
            .await
            .unwrap();
        assert_eq!(text, "ab");
    }

    #[tokio::test]
    async fn test_decode_stream_transport_error() {
        let chunks: Vec<Result<Vec<u8>, ChatError>> = vec![
            Ok(b"data: {\"text\":\"parcial\"}\n".to_vec()),
            Err(ChatError::Transport("connection reset".to_string())),
        ];
        let mut seen = Vec::new();
        let err = decode_stream(futures::stream::iter(chunks), |d, _| seen.push(d.to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Transport(_)));
        assert_eq!(seen, vec!["parcial"]);
    }
}
