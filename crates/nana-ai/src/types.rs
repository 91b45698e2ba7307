//! Core types for image generation requests and results

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Model used when nothing else is configured
pub const DEFAULT_MODEL: &str = "gemini-3-pro-image-preview";

/// Endpoint used when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "https://api.apizoo.top";

/// Maximum number of input images accepted for one run
pub const MAX_ATTACHMENTS: usize = 14;

/// MIME type assumed for inline images that arrive without one
pub const FALLBACK_IMAGE_MIME: &str = "image/png";

/// Normalize a configured endpoint into a base URL without trailing slashes.
pub fn base_url(endpoint: Option<&str>) -> String {
    match endpoint.map(str::trim) {
        Some(endpoint) if !endpoint.is_empty() => endpoint.trim_end_matches('/').to_string(),
        _ => DEFAULT_BASE_URL.to_string(),
    }
}

/// Author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// Content parts in a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    /// Answer text
    Text { text: String },
    /// Generated or attached image (base64 encoded)
    Image {
        mime_type: String,
        data: String,
        /// Prompt that produced the image, when known
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_prompt: Option<String>,
    },
    /// Reasoning text
    Thinking { thinking: String },
    /// Intermediate image produced while reasoning (base64 encoded)
    ThinkingImage { mime_type: String, data: String },
}

impl Part {
    /// Create text content
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create image content from base64 data
    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Image {
            mime_type: mime_type.into(),
            data: data.into(),
            source_prompt: None,
        }
    }

    /// Create reasoning text
    pub fn thinking(thinking: impl Into<String>) -> Self {
        Self::Thinking {
            thinking: thinking.into(),
        }
    }

    /// Create a reasoning image from base64 data
    pub fn thinking_image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::ThinkingImage {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Whether this part is model reasoning (never replayed as history)
    pub fn is_reasoning(&self) -> bool {
        match self {
            Self::Thinking { .. } | Self::ThinkingImage { .. } => true,
            Self::Text { .. } | Self::Image { .. } => false,
        }
    }

    /// Get text if this is answer text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Get `(mime_type, data)` if this is a non-reasoning image
    pub fn as_image(&self) -> Option<(&str, &str)> {
        match self {
            Self::Image {
                mime_type, data, ..
            } => Some((mime_type, data)),
            _ => None,
        }
    }

    /// Tag a non-reasoning image with the prompt that produced it.
    /// Other parts are returned unchanged.
    pub fn with_source_prompt(self, prompt: &str) -> Self {
        match self {
            Self::Image {
                mime_type, data, ..
            } => Self::Image {
                mime_type,
                data,
                source_prompt: Some(prompt.to_string()),
            },
            other => other,
        }
    }
}

/// A conversation turn as sent to the generation API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    /// Build the user turn for a prompt: images first, then the prompt text
    /// unless it is blank.
    pub fn user_prompt(prompt: &str, attachments: &[Attachment]) -> Self {
        let mut parts: Vec<Part> = attachments.iter().map(Attachment::to_part).collect();
        if !prompt.is_empty() {
            parts.push(Part::text(prompt));
        }
        Self::new(Role::User, parts)
    }
}

/// An input image supplied before generation starts
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Raw image bytes
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

impl Attachment {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }

    /// Decode an attachment from base64 inline data
    pub fn from_base64(data: &str, mime_type: impl Into<String>) -> Result<Self> {
        let bytes = STANDARD
            .decode(data.trim())
            .map_err(|e| Error::InvalidImage(e.to_string()))?;
        Ok(Self::new(bytes, mime_type))
    }

    /// Base64 encoding of the raw bytes
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    /// Inline image part carrying this attachment
    pub fn to_part(&self) -> Part {
        Part::image(self.to_base64(), self.mime_type.clone())
    }

    /// `data:` URI form, used by endpoints that take image URLs
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

/// Output resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[default]
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::OneK => "1K",
            Resolution::TwoK => "2K",
            Resolution::FourK => "4K",
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "1K" => Ok(Resolution::OneK),
            "2K" => Ok(Resolution::TwoK),
            "4K" => Ok(Resolution::FourK),
            other => Err(format!("unknown resolution '{}' (expected 1K, 2K or 4K)", other)),
        }
    }
}

/// Output aspect ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    Auto,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "3:4")]
    Portrait3x4,
    #[serde(rename = "4:3")]
    Landscape4x3,
    #[serde(rename = "9:16")]
    Portrait9x16,
    #[serde(rename = "16:9")]
    Landscape16x9,
    #[serde(rename = "21:9")]
    Ultrawide21x9,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Auto => "Auto",
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Landscape16x9 => "16:9",
            AspectRatio::Ultrawide21x9 => "21:9",
        }
    }

    /// Ratio to send to the API; `None` lets the model decide
    pub fn ratio(&self) -> Option<&'static str> {
        match self {
            AspectRatio::Auto => None,
            other => Some(other.as_str()),
        }
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(AspectRatio::Auto),
            "1:1" => Ok(AspectRatio::Square),
            "3:4" => Ok(AspectRatio::Portrait3x4),
            "4:3" => Ok(AspectRatio::Landscape4x3),
            "9:16" => Ok(AspectRatio::Portrait9x16),
            "16:9" => Ok(AspectRatio::Landscape16x9),
            "21:9" => Ok(AspectRatio::Ultrawide21x9),
            other => Err(format!("unknown aspect ratio '{}'", other)),
        }
    }
}

/// Per-call model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier (e.g., "gemini-3-pro-image-preview")
    pub model: String,
    pub resolution: Resolution,
    pub aspect_ratio: AspectRatio,
    /// Enable Google Search grounding
    pub grounding: bool,
    /// Ask the model to include its reasoning
    pub thinking: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            resolution: Resolution::default(),
            aspect_ratio: AspectRatio::default(),
            grounding: false,
            thinking: false,
        }
    }
}

impl ModelConfig {
    /// Copy of this config targeting another model
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }
}
