use serde::{Deserialize, Serialize};

/// Role of a turn in a grounded conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    System,
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::System => "system",
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Model family used to pick a prompt serializer.
///
/// Each family has its own token-marker syntax; the retrieval pipeline only
/// produces [`PromptTurn`]s and never embeds markers itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    #[default]
    ChatMl,
    Llama3,
    Gemma,
}

impl ModelFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::ChatMl => "chat_ml",
            ModelFamily::Llama3 => "llama3",
            ModelFamily::Gemma => "gemma",
        }
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ModelFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chat_ml" | "chatml" | "chat-ml" => Ok(ModelFamily::ChatMl),
            "llama3" | "llama-3" | "llama_3" => Ok(ModelFamily::Llama3),
            "gemma" => Ok(ModelFamily::Gemma),
            _ => Err(format!("Unknown model family: {}", s)),
        }
    }
}

/// One provider-neutral turn of a prompt.
///
/// The user turn carries the retrieved context block separately from the
/// question so serializers can place it consistently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum PromptTurn {
    System {
        text: String,
    },
    User {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },
    Assistant {
        text: String,
    },
}

impl PromptTurn {
    pub fn system(text: impl Into<String>) -> Self {
        Self::System { text: text.into() }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            text: text.into(),
            context: None,
        }
    }

    pub fn user_with_context(text: impl Into<String>, context: impl Into<String>) -> Self {
        Self::User {
            text: text.into(),
            context: Some(context.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant { text: text.into() }
    }

    pub fn role(&self) -> TurnRole {
        match self {
            PromptTurn::System { .. } => TurnRole::System,
            PromptTurn::User { .. } => TurnRole::User,
            PromptTurn::Assistant { .. } => TurnRole::Assistant,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            PromptTurn::System { text }
            | PromptTurn::User { text, .. }
            | PromptTurn::Assistant { text } => text,
        }
    }

    /// Turn body as a model should see it: context block, blank line, question.
    pub fn rendered_body(&self) -> String {
        match self {
            PromptTurn::User {
                text,
                context: Some(context),
            } => format!("{context}\n\n{text}"),
            other => other.text().to_string(),
        }
    }
}
