use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value };
use std::fmt;

/// Caller-owned bag carried through a chat call and echoed back in the envelope.
pub type Context = Map<String, Value>;

/// Grounding document as produced by a retriever. Only the prompt renderer looks inside.
pub type Document = Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Chat protocol response: the model reply plus the context bag the caller handed in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub message: ChatMessage,
    pub context: Context,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn roles_serialize_lowercase() {
        let msg = ChatMessage::assistant("X");
        assert_eq!(serde_json::to_value(&msg).unwrap(), json!({ "role": "assistant", "content": "X" }));
    }

    #[test]
    fn unknown_role_is_rejected() {
        let parsed = serde_json::from_value::<ChatMessage>(json!({ "role": "tool", "content": "" }));
        assert!(parsed.is_err());
    }

    #[test]
    fn envelope_shape() {
        let mut context = Context::new();
        context.insert("session".into(), json!("abc"));
        let envelope = ResponseEnvelope {
            message: ChatMessage::assistant("hello"),
            context,
        };
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "message": { "role": "assistant", "content": "hello" },
                "context": { "session": "abc" }
            })
        );
    }
}
