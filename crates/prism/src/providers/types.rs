//! Generation API wire types
//!
//! Request bodies and the streamed response shape. Every response field is
//! optional so that a partial or unexpected object still deserializes and
//! simply yields nothing. Candidates and parts are decoded one element at a
//! time: an element with a malformed field is dropped on its own.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Requested output modalities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Modality {
    #[default]
    TextAndImage,
    Text,
    Image,
}

impl Modality {
    /// Values for `generationConfig.responseModalities`
    pub fn response_modalities(&self) -> &'static [&'static str] {
        match self {
            Modality::TextAndImage => &["TEXT", "IMAGE"],
            Modality::Text => &["TEXT"],
            Modality::Image => &["IMAGE"],
        }
    }
}

/// One upstream generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamRequest {
    pub prompt: String,
    #[serde(default)]
    pub modality: Modality,
    pub aspect_ratio: String,
    pub image_size: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentBody<'a> {
    pub contents: Vec<RequestContent<'a>>,
    pub generation_config: GenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RequestContent<'a> {
    pub role: &'static str,
    pub parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RequestPart<'a> {
    pub text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerationConfig<'a> {
    pub response_modalities: &'static [&'static str],
    pub image_config: ImageConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ImageConfig<'a> {
    pub aspect_ratio: &'a str,
    pub image_size: &'a str,
}

impl<'a> GenerateContentBody<'a> {
    pub(crate) fn from_request(request: &'a UpstreamRequest) -> Self {
        Self {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart {
                    text: &request.prompt,
                }],
            }],
            generation_config: GenerationConfig {
                response_modalities: request.modality.response_modalities(),
                image_config: ImageConfig {
                    aspect_ratio: &request.aspect_ratio,
                    image_size: &request.image_size,
                },
            },
        }
    }
}

/// One streamed response object
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentChunk {
    #[serde(default, deserialize_with = "lenient_seq")]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Content {
    #[serde(default, deserialize_with = "lenient_seq")]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub inline_data: Option<InlineData>,
    #[serde(default)]
    pub thought: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub data: String,
}

/// Error object the API embeds in its stream
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Decode each array element on its own, skipping the ones that do not fit.
/// A value that is not an array yields no elements.
fn lenient_seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Value::Array(items) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let request = UpstreamRequest {
            prompt: "a lighthouse".to_string(),
            modality: Modality::TextAndImage,
            aspect_ratio: "16:9".to_string(),
            image_size: "1k".to_string(),
        };
        let body = serde_json::to_value(GenerateContentBody::from_request(&request)).unwrap();

        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "a lighthouse");
        assert_eq!(
            body["generationConfig"]["responseModalities"],
            serde_json::json!(["TEXT", "IMAGE"])
        );
        assert_eq!(body["generationConfig"]["imageConfig"]["aspectRatio"], "16:9");
        assert_eq!(body["generationConfig"]["imageConfig"]["imageSize"], "1k");
    }

    #[test]
    fn test_modality_serde() {
        let m: Modality = serde_json::from_str("\"TEXT_AND_IMAGE\"").unwrap();
        assert_eq!(m, Modality::TextAndImage);
        assert_eq!(Modality::Image.response_modalities(), &["IMAGE"]);
    }

    #[test]
    fn test_chunk_tolerates_unknown_fields() {
        let chunk: GenerateContentChunk = serde_json::from_str(
            r#"{"usageMetadata":{"promptTokenCount":3},"candidates":[{"index":0}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.candidates.len(), 1);
        assert!(chunk.candidates[0].content.is_none());
    }

    #[test]
    fn test_malformed_part_is_dropped_alone() {
        let chunk: GenerateContentChunk = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"kept"},{"text":"lost","thought":"true"},{"text":7}]}}]}"#,
        )
        .unwrap();
        let parts = &chunk.candidates[0].content.as_ref().unwrap().parts;
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].text.as_deref(), Some("kept"));
    }

    #[test]
    fn test_malformed_candidate_is_dropped_alone() {
        let chunk: GenerateContentChunk = serde_json::from_str(
            r#"{"candidates":[{"content":"oops"},{"content":{"parts":[{"text":"ok"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.candidates.len(), 1);

        let chunk: GenerateContentChunk =
            serde_json::from_str(r#"{"candidates":"nope","error":{"code":500}}"#).unwrap();
        assert!(chunk.candidates.is_empty());
        assert_eq!(chunk.error.unwrap().code, Some(500));
    }
}
