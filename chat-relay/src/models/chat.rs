//! Conversation turns as sent by callers and as forwarded upstream.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use service_core::error::AppError;

pub const NO_DATA_PROVIDED: &str = "No data provided";
pub const NO_USER_INPUT_PROVIDED: &str = "No user input provided";
pub const INVALID_CONTEXT_HISTORY: &str = "Invalid context history";

/// A prior turn of the conversation, owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// "user" or "assistant". Anything other than "user" is treated as the model.
    pub sender: String,

    /// Text of the turn. May be empty.
    pub content: String,
}

/// Author of a message as the model API sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
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

/// A role-tagged message, built fresh for every upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Body of `POST /chat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub user_input: String,
    pub context_history: Vec<Turn>,
}

impl ChatRequest {
    /// Validate a decoded JSON body.
    ///
    /// An absent body, a non-object or an empty object all count as "no data".
    /// `user_input` must be a non-empty string. `context_history` may be absent
    /// or null, but every entry that is present needs both `sender` and `content`.
    pub fn from_body(body: Option<Value>) -> Result<Self, AppError> {
        let fields = match body {
            Some(Value::Object(fields)) if !fields.is_empty() => fields,
            _ => return Err(bad_request(NO_DATA_PROVIDED)),
        };

        let user_input = fields
            .get("user_input")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if user_input.is_empty() {
            return Err(bad_request(NO_USER_INPUT_PROVIDED));
        }

        let context_history = match fields.get("context_history") {
            None | Some(Value::Null) => Vec::new(),
            Some(history) => serde_json::from_value::<Vec<Turn>>(history.clone()).map_err(|e| {
                tracing::debug!(error = %e, "Rejected malformed context history");
                bad_request(INVALID_CONTEXT_HISTORY)
            })?,
        };

        Ok(Self {
            user_input: user_input.to_string(),
            context_history,
        })
    }
}

fn bad_request(message: &'static str) -> AppError {
    AppError::BadRequest(anyhow::anyhow!(message))
}
