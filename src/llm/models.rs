use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// Speaker of a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// One message of the conversation handed to a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A provider-agnostic completion request.
///
/// `model` falls back to the manager's default when `None`.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub model: Option<String>,
    pub system: Option<String>,
    pub messages: Vec<PromptMessage>,
}

impl GenerationRequest {
    pub fn prompt(text: impl Into<String>) -> Self {
        Self {
            messages: vec![PromptMessage::user(text)],
            ..Default::default()
        }
    }

    pub fn conversation(messages: Vec<PromptMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// System prompt first, then the conversation.
    pub fn flattened(&self) -> Vec<PromptMessage> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if let Some(system) = &self.system {
            out.push(PromptMessage {
                role: Role::System,
                content: system.clone(),
            });
        }
        out.extend(self.messages.iter().cloned());
        out
    }
}

/// JSON schema a structured completion must satisfy.
#[derive(Debug, Clone)]
pub struct ObjectSchema {
    pub name: &'static str,
    pub schema: Value,
}

// What the provider is asked to return
#[derive(Debug, Clone, Copy)]
pub enum ResponseFormat<'a> {
    Text,
    Json(&'a ObjectSchema),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flattened_puts_system_first() {
        let request = GenerationRequest::prompt("hi").with_system("be brief");
        let messages = request.flattened();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1], PromptMessage::user("hi"));
    }

    #[test]
    fn test_role_round_trips_through_str() {
        for role in [Role::System, Role::User, Role::Assistant] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("tool"), None);
    }
}
