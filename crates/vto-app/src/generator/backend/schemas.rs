use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vto_core::{RawOutput, RawOutputItem};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PredictionRequest {
    pub input: PredictionInput,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PredictionInput {
    pub model_image: String,
    pub garments: Vec<GarmentInput>,
    pub category: String,
    pub num_outputs: u32,
    pub seed: i32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GarmentInput {
    #[serde(rename = "type")]
    pub garment_type: String,
    pub image: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PredictionUrls {
    pub get: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Prediction {
    #[serde(default)]
    pub id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub urls: Option<PredictionUrls>,
}

impl Prediction {
    pub fn error_text(&self) -> String {
        match &self.error {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => format!("prediction {}", self.status),
        }
    }

    pub fn poll_url(&self) -> Option<&str> {
        self.urls.as_ref().and_then(|u| u.get.as_deref())
    }
}

pub fn to_data_uri(bytes: &[u8]) -> String {
    let mime = image::guess_format(bytes)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream");
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Decode a base64 `data:` URI. Anything else, including a malformed payload, is `None`.
pub fn from_data_uri(uri: &str) -> Option<Vec<u8>> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    if !header.ends_with(";base64") {
        return None;
    }
    STANDARD.decode(payload.trim()).ok()
}

/// Map prediction output JSON onto the raw output union. Total: every value maps somewhere.
pub fn decode_output(value: Value) -> RawOutput {
    match value {
        Value::Array(items) => RawOutput::Many(items.into_iter().map(decode_item).collect()),
        Value::Null => RawOutput::Many(Vec::new()),
        other => RawOutput::Single(decode_item(other)),
    }
}

fn decode_item(value: Value) -> RawOutputItem {
    match value {
        Value::String(s) => match from_data_uri(&s) {
            Some(bytes) => RawOutputItem::Bytes(bytes),
            None => RawOutputItem::Url(s),
        },
        Value::Object(map) => match map.get("url").and_then(Value::as_str).map(str::to_string) {
            Some(url) => RawOutputItem::StaticUrl { url },
            None => RawOutputItem::Unrecognized(Value::Object(map)),
        },
        other => RawOutputItem::Unrecognized(other),
    }
}
