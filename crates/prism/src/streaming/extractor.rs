//! Object Extractor
//!
//! Pulls text deltas and inline binary attachments out of a decoded
//! response object. The object's shape is validated here: anything that
//! does not match the known response layout yields an empty extraction.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::Value;
use tracing::{debug, warn};

use super::accumulator::DecodedObject;
use crate::media::{sniff_image_mime, DEFAULT_IMAGE_MIME};
use crate::providers::types::GenerateContentChunk;

/// A binary payload found inline in a response part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentCandidate {
    pub payload: Vec<u8>,
    pub mime_type: String,
}

/// An error object the upstream embedded in its stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedError {
    pub code: Option<i64>,
    pub message: String,
}

/// Everything extracted from one decoded object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Concatenation of all text parts, in order
    pub text: String,
    pub attachments: Vec<AttachmentCandidate>,
    pub error: Option<EmbeddedError>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.attachments.is_empty() && self.error.is_none()
    }
}

/// Extracts content from response objects
#[derive(Debug, Clone, Default)]
pub struct ObjectExtractor {
    include_thoughts: bool,
}

impl ObjectExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep parts the model flagged as internal reasoning
    pub fn with_thoughts(mut self, include: bool) -> Self {
        self.include_thoughts = include;
        self
    }

    /// Walk the candidates' content parts of `object`.
    ///
    /// Never fails: an object of unexpected shape, a part without usable
    /// data, or a payload that is not valid base64 is skipped.
    pub fn extract(&self, object: DecodedObject) -> Extraction {
        let chunk: GenerateContentChunk = match serde_json::from_value(Value::Object(object)) {
            Ok(chunk) => chunk,
            Err(err) => {
                debug!(error = %err, "object does not match response shape");
                return Extraction::default();
            }
        };

        let mut extraction = Extraction {
            error: chunk.error.map(|e| EmbeddedError {
                code: e.code,
                message: e
                    .message
                    .or(e.status)
                    .unwrap_or_else(|| "upstream reported an error".to_string()),
            }),
            ..Default::default()
        };

        let parts = chunk
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|content| content.parts);

        for part in parts {
            if part.thought.unwrap_or(false) && !self.include_thoughts {
                continue;
            }

            if let Some(text) = part.text {
                extraction.text.push_str(&text);
            }

            if let Some(inline) = part.inline_data {
                match decode_payload(&inline.data) {
                    Some(payload) => {
                        let mime_type = inline
                            .mime_type
                            .filter(|m| !m.trim().is_empty())
                            .or_else(|| sniff_image_mime(&payload).map(str::to_string))
                            .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string());
                        extraction
                            .attachments
                            .push(AttachmentCandidate { payload, mime_type });
                    }
                    None => warn!(
                        data_len = inline.data.len(),
                        "skipping inline part with undecodable payload"
                    ),
                }
            }
        }

        extraction
    }
}

/// Decode a base64 payload, tolerating embedded line breaks
fn decode_payload(data: &str) -> Option<Vec<u8>> {
    if data.is_empty() {
        return None;
    }

    let decoded = if data.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        STANDARD.decode(compact)
    } else {
        STANDARD.decode(data)
    };

    decoded.ok().filter(|payload| !payload.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> DecodedObject {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_text_parts_concatenate_in_order() {
        let obj = object(json!({
            "candidates": [{"content": {"parts": [{"text": "Hel"}, {"text": "lo"}]}}]
        }));
        let extraction = ObjectExtractor::new().extract(obj);
        assert_eq!(extraction.text, "Hello");
        assert!(extraction.attachments.is_empty());
    }

    #[test]
    fn test_inline_image_becomes_candidate() {
        let obj = object(json!({
            "candidates": [{"content": {"parts": [
                {"text": "here"},
                {"inlineData": {"mimeType": "image/png", "data": STANDARD.encode(b"\x89PNG....")}}
            ]}}]
        }));
        let extraction = ObjectExtractor::new().extract(obj);
        assert_eq!(extraction.text, "here");
        assert_eq!(extraction.attachments.len(), 1);
        assert_eq!(extraction.attachments[0].mime_type, "image/png");
        assert_eq!(extraction.attachments[0].payload, b"\x89PNG....");
    }

    #[test]
    fn test_every_inline_part_is_collected() {
        let obj = object(json!({
            "candidates": [{"content": {"parts": [
                {"inlineData": {"mimeType": "image/jpeg", "data": STANDARD.encode(b"one")}},
                {"inlineData": {"mimeType": "image/webp", "data": STANDARD.encode(b"two")}}
            ]}}]
        }));
        let extraction = ObjectExtractor::new().extract(obj);
        let mimes: Vec<_> = extraction.attachments.iter().map(|a| a.mime_type.as_str()).collect();
        assert_eq!(mimes, vec!["image/jpeg", "image/webp"]);
    }

    #[test]
    fn test_missing_mime_type_is_sniffed() {
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0x00];
        let obj = object(json!({
            "candidates": [{"content": {"parts": [{"inlineData": {"data": STANDARD.encode(jpeg)}}]}}]
        }));
        let extraction = ObjectExtractor::new().extract(obj);
        assert_eq!(extraction.attachments[0].mime_type, "image/jpeg");
    }

    #[test]
    fn test_unknown_payload_defaults_to_png() {
        let obj = object(json!({
            "candidates": [{"content": {"parts": [{"inlineData": {"mimeType": "", "data": STANDARD.encode(b"raw")}}]}}]
        }));
        let extraction = ObjectExtractor::new().extract(obj);
        assert_eq!(extraction.attachments[0].mime_type, DEFAULT_IMAGE_MIME);
    }

    #[test]
    fn test_invalid_base64_is_skipped() {
        let obj = object(json!({
            "candidates": [{"content": {"parts": [{"inlineData": {"mimeType": "image/png", "data": "!!not base64!!"}}]}}]
        }));
        assert!(ObjectExtractor::new().extract(obj).is_empty());
    }

    #[test]
    fn test_wrapped_base64_is_accepted() {
        let encoded = STANDARD.encode(vec![7u8; 90]);
        let wrapped = format!("{}\n{}", &encoded[..60], &encoded[60..]);
        let obj = object(json!({
            "candidates": [{"content": {"parts": [{"inlineData": {"mimeType": "image/gif", "data": wrapped}}]}}]
        }));
        let extraction = ObjectExtractor::new().extract(obj);
        assert_eq!(extraction.attachments[0].payload, vec![7u8; 90]);
    }

    #[test]
    fn test_unexpected_shape_yields_empty() {
        let obj = object(json!({"candidates": "nope"}));
        assert!(ObjectExtractor::new().extract(obj).is_empty());

        let obj = object(json!({"usageMetadata": {"totalTokenCount": 5}}));
        assert!(ObjectExtractor::new().extract(obj).is_empty());
    }

    #[test]
    fn test_thought_parts_are_skipped_by_default() {
        let obj = object(json!({
            "candidates": [{"content": {"parts": [
                {"text": "thinking...", "thought": true},
                {"text": "answer"}
            ]}}]
        }));
        assert_eq!(ObjectExtractor::new().extract(obj.clone()).text, "answer");
        assert_eq!(
            ObjectExtractor::new().with_thoughts(true).extract(obj).text,
            "thinking...answer"
        );
    }

    #[test]
    fn test_bad_part_does_not_discard_its_siblings() {
        let obj = object(json!({
            "candidates": [{"content": {"parts": [
                {"text": "draft", "thought": "true"},
                {"inlineData": {"mimeType": "image/png", "data": 42}},
                {"text": "visible"},
                {"inlineData": {"mimeType": "image/png", "data": STANDARD.encode(b"img")}}
            ]}}]
        }));
        let extraction = ObjectExtractor::new().extract(obj);
        assert_eq!(extraction.text, "visible");
        assert_eq!(extraction.attachments.len(), 1);
        assert_eq!(extraction.attachments[0].payload, b"img");
    }

    #[test]
    fn test_embedded_error_is_reported() {
        let obj = object(json!({
            "error": {"code": 429, "message": "Resource exhausted", "status": "RESOURCE_EXHAUSTED"}
        }));
        let extraction = ObjectExtractor::new().extract(obj);
        assert_eq!(
            extraction.error,
            Some(EmbeddedError {
                code: Some(429),
                message: "Resource exhausted".to_string()
            })
        );
    }
}
