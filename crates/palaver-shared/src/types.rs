use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationType {
    Direct,
    Group,
}

impl ConversationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationType::Direct => "DIRECT",
            ConversationType::Group => "GROUP",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ParseEnumError> {
        match s {
            "DIRECT" => Ok(ConversationType::Direct),
            "GROUP" => Ok(ConversationType::Group),
            other => Err(ParseEnumError {
                kind: "conversation type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantRole {
    Admin,
    Member,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Admin => "ADMIN",
            ParticipantRole::Member => "MEMBER",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ParseEnumError> {
        match s {
            "ADMIN" => Ok(ParticipantRole::Admin),
            "MEMBER" => Ok(ParticipantRole::Member),
            other => Err(ParseEnumError {
                kind: "participant role",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    Text,
    Image,
    File,
    Audio,
    Video,
    System,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "TEXT",
            ContentType::Image => "IMAGE",
            ContentType::File => "FILE",
            ContentType::Audio => "AUDIO",
            ContentType::Video => "VIDEO",
            ContentType::System => "SYSTEM",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ParseEnumError> {
        match s {
            "TEXT" => Ok(ContentType::Text),
            "IMAGE" => Ok(ContentType::Image),
            "FILE" => Ok(ContentType::File),
            "AUDIO" => Ok(ContentType::Audio),
            "VIDEO" => Ok(ContentType::Video),
            "SYSTEM" => Ok(ContentType::System),
            other => Err(ParseEnumError {
                kind: "content type",
                value: other.to_string(),
            }),
        }
    }

    /// Clients may send any casing; the stored value is always upper-case.
    pub fn parse_client(s: &str) -> Result<Self, ParseEnumError> {
        Self::parse(&s.to_uppercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceiptStatus {
    Delivered,
    Read,
}

impl ReceiptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptStatus::Delivered => "DELIVERED",
            ReceiptStatus::Read => "READ",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ParseEnumError> {
        match s {
            "DELIVERED" => Ok(ReceiptStatus::Delivered),
            "READ" => Ok(ReceiptStatus::Read),
            other => Err(ParseEnumError {
                kind: "receipt status",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for ConversationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
