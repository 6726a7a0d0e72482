//! Per-call generation policy.
//!
//! Nothing here is caller-controlled. The configuration is rebuilt for every
//! generation so that a change to the search toggle takes effect on the next call.

/// Persona given to the model on every call.
pub const SYSTEM_INSTRUCTION: &str = "You are an AI Bible Assistant. Provide concise, biblically-grounded answers to questions about Christian faith and scripture.";

pub const TEMPERATURE: f32 = 0.2;
pub const TOP_P: f32 = 0.95;
pub const MAX_OUTPUT_TOKENS: i32 = 8192;

/// Harm categories the upstream API filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarmCategory {
    HateSpeech,
    DangerousContent,
    SexuallyExplicit,
    Harassment,
}

impl HarmCategory {
    pub const ALL: [HarmCategory; 4] = [
        HarmCategory::HateSpeech,
        HarmCategory::DangerousContent,
        HarmCategory::SexuallyExplicit,
        HarmCategory::Harassment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HarmCategory::HateSpeech => "HARM_CATEGORY_HATE_SPEECH",
            HarmCategory::DangerousContent => "HARM_CATEGORY_DANGEROUS_CONTENT",
            HarmCategory::SexuallyExplicit => "HARM_CATEGORY_SEXUALLY_EXPLICIT",
            HarmCategory::Harassment => "HARM_CATEGORY_HARASSMENT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockThreshold {
    BlockNone,
}

impl BlockThreshold {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockThreshold::BlockNone => "BLOCK_NONE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: BlockThreshold,
}

/// Augmentation tools the model may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    GoogleSearch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseModality {
    Text,
}

impl ResponseModality {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseModality::Text => "TEXT",
        }
    }
}

/// Everything sent upstream besides the messages themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: i32,
    pub response_modalities: Vec<ResponseModality>,
    pub safety_settings: Vec<SafetySetting>,
    pub tools: Vec<Tool>,
    pub system_instruction: String,
}

/// Build the generation configuration for one call.
///
/// Every harm category is set to block nothing.
pub fn build_generation_config(search_enabled: bool) -> GenerationConfig {
    let tools = if search_enabled {
        vec![Tool::GoogleSearch]
    } else {
        Vec::new()
    };

    GenerationConfig {
        temperature: TEMPERATURE,
        top_p: TOP_P,
        max_output_tokens: MAX_OUTPUT_TOKENS,
        response_modalities: vec![ResponseModality::Text],
        safety_settings: HarmCategory::ALL
            .iter()
            .map(|category| SafetySetting {
                category: *category,
                threshold: BlockThreshold::BlockNone,
            })
            .collect(),
        tools,
        system_instruction: SYSTEM_INSTRUCTION.to_string(),
    }
}
