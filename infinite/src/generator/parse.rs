use serde::Deserialize;
use serde_json::Value;

use super::GenerationError;
use crate::llm::extract_json_object;
use crate::model::{FaqEntry, Section};

pub const REQUIRED_FIELDS: [&str; 5] = ["metaTitle", "metaDescription", "perex", "sections", "faq"];

/// Article body as returned by the model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedContent {
    pub meta_title: String,
    pub meta_description: String,
    #[serde(default)]
    pub h1_title: Option<String>,
    pub perex: String,
    pub sections: Vec<Section>,
    pub faq: Vec<FaqEntry>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub estimated_reading_time: Option<String>,
}

impl GeneratedContent {
    /// Perex plus all section bodies, as fed to keyword generation.
    pub fn body_text(&self) -> String {
        std::iter::once(self.perex.as_str())
            .chain(self.sections.iter().map(|s| s.content.as_str()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Locate, decode and shape-check the JSON object in a model response.
pub fn parse_generated(text: &str) -> Result<GeneratedContent, GenerationError> {
    let json = extract_json_object(text).ok_or(GenerationError::NoJson)?;
    let mut value: Value =
        serde_json::from_str(json).map_err(|e| GenerationError::Malformed(e.to_string()))?;

    let object = value
        .as_object_mut()
        .ok_or_else(|| GenerationError::Malformed("top-level JSON is not an object".into()))?;
    for field in REQUIRED_FIELDS {
        if object.get(field).map_or(true, Value::is_null) {
            return Err(GenerationError::MissingField(field));
        }
    }

    // Models sometimes answer keywords as one comma-separated string and the
    // reading time as a bare number of minutes.
    if let Some(Value::String(joined)) = object.get("keywords") {
        let list = joined
            .split(',')
            .map(|k| Value::String(k.trim().to_string()))
            .collect();
        object.insert("keywords".into(), Value::Array(list));
    }
    if let Some(Value::Number(minutes)) = object.get("estimatedReadingTime") {
        let text = format!("{} minút", minutes);
        object.insert("estimatedReadingTime".into(), Value::String(text));
    }
    if object.get("keywords").is_some_and(Value::is_null) {
        object.remove("keywords");
    }

    serde_json::from_value(value).map_err(|e| GenerationError::Malformed(e.to_string()))
}
