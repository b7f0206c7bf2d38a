use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MimeType {
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/png")]
    Png,
}

impl MimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MimeType::Jpeg => "image/jpeg",
            MimeType::Png => "image/png",
        }
    }
}

/// One inline image attached to a prompt. Position in `PromptPayload::parts`
/// is what the instruction text refers to as "IMAGE n".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePart {
    pub mime_type: MimeType,
    pub data: Bytes,
}

impl ImagePart {
    pub fn jpeg(data: Bytes) -> Self {
        Self { mime_type: MimeType::Jpeg, data }
    }

    pub fn png(data: Bytes) -> Self {
        Self { mime_type: MimeType::Png, data }
    }
}

#[derive(Debug, Clone)]
pub struct PromptPayload {
    pub instruction_text: String,
    pub parts: Vec<ImagePart>,
}

impl PromptPayload {
    pub fn text_only(instruction_text: String) -> Self {
        Self { instruction_text, parts: Vec::new() }
    }
}

/// Everything the generation core needs for one request. Images are already
/// normalised by the caller.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub product_id: String,
    pub product_name: String,
    pub scene_image: Option<Bytes>,
    pub product_reference: Bytes,
    pub brand_mark: Option<Bytes>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CaptionStyle {
    #[serde(rename = "confident-professional", alias = "styleA")]
    ConfidentProfessional,
    #[serde(rename = "aesthetic-oriental", alias = "styleB")]
    AestheticOriental,
    #[serde(rename = "ingredient-explainer", alias = "styleC")]
    IngredientExplainer,
}

impl CaptionStyle {
    pub const ALL: [CaptionStyle; 3] = [
        CaptionStyle::ConfidentProfessional,
        CaptionStyle::AestheticOriental,
        CaptionStyle::IngredientExplainer,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            CaptionStyle::ConfidentProfessional => "confident-professional",
            CaptionStyle::AestheticOriental => "aesthetic-oriental",
            CaptionStyle::IngredientExplainer => "ingredient-explainer",
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    #[serde_as(as = "Base64")]
    pub image_data: Bytes,
    #[serde(rename = "copyTexts")]
    pub captions: BTreeMap<CaptionStyle, String>,
    pub product_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub product_id: String,
    pub has_env: bool,
    #[serde(default, rename = "imageSizeKB")]
    pub image_size_kb: Option<u64>,
    #[serde(default)]
    pub copy_texts: Option<BTreeMap<CaptionStyle, String>>,
}

impl GenerationRecord {
    pub fn from_result(product_id: &str, has_env: bool, result: &GenerationResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            product_id: product_id.to_string(),
            has_env,
            image_size_kb: Some((result.image_data.len() as u64).div_ceil(1024)),
            copy_texts: Some(result.captions.clone()),
        }
    }
}
