//! Transcript Models
//!
//! A [`Message`] is one immutable transcript entry. Messages are created with
//! their identity and timestamp already assigned and are never edited after
//! being appended to the session store.

use crate::protocol::{CorrectionDetail, QuizItem, SuccessData};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// Orderable message identity: creation time in milliseconds, then a random
/// tie-breaker for entries created within the same millisecond.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId {
    pub created_ms: i64,
    pub nonce: u32,
}

impl MessageId {
    pub fn generate() -> Self {
        Self {
            created_ms: Utc::now().timestamp_millis(),
            nonce: rand::random(),
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:08x}", self.created_ms, self.nonce)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub role: MessageRole,
    /// RFC 3339 creation instant, millisecond precision, UTC.
    pub timestamp: String,
    pub content: String,
    pub chinese_content: Option<String>,
    pub pinyin: Option<String>,
    pub emotion: Option<String>,
    pub action: Option<String>,
    pub quiz_list: Vec<QuizItem>,
    pub correction_detail: Option<CorrectionDetail>,
    pub audio_payload: Option<String>,
}

impl Message {
    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        let id = MessageId::generate();
        let timestamp = chrono::DateTime::from_timestamp_millis(id.created_ms)
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        Self {
            id,
            role,
            timestamp,
            content: content.into(),
            chinese_content: None,
            pinyin: None,
            emotion: None,
            action: None,
            quiz_list: Vec::new(),
            correction_detail: None,
            audio_payload: None,
        }
    }

    /// A line the local user typed.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// A locally generated notice, e.g. a server error surfaced to the user.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// An agent turn built from a `success` payload.
    pub fn assistant_from(data: &SuccessData) -> Self {
        let mut message = Self::new(MessageRole::Assistant, data.display_text().unwrap_or_default());
        message.chinese_content = data.chinese_content.clone();
        message.pinyin = data.pinyin.clone();
        message.emotion = data.emotion.clone();
        message.action = data.action.clone();
        message.quiz_list = data.quiz_list.clone();
        message.correction_detail = data.correction_detail.clone();
        message.audio_payload = data.audio().map(str::to_string);
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_role_display_and_serde() {
        assert_eq!(MessageRole::Assistant.to_string(), "assistant");
        assert_eq!(
            serde_json::to_string(&MessageRole::System).unwrap(),
            "\"system\""
        );
    }

    #[test]
    fn test_message_ids_order_by_creation_time() {
        let earlier = MessageId {
            created_ms: 1_000,
            nonce: u32::MAX,
        };
        let later = MessageId {
            created_ms: 1_001,
            nonce: 0,
        };
        assert!(earlier < later);
        assert_eq!(earlier.to_string(), "1000-ffffffff");
    }

    #[test]
    fn test_timestamp_matches_id() {
        let message = Message::user("hello");
        let parsed = chrono::DateTime::parse_from_rfc3339(&message.timestamp).unwrap();
        assert_eq!(parsed.timestamp_millis(), message.id.created_ms);
        assert!(message.timestamp.ends_with('Z'));
    }

    #[test]
    fn test_assistant_from_success_data() {
        let data = SuccessData {
            vietnamese_display: Some("Chào sư huynh!".into()),
            chinese_content: Some("师兄好！".into()),
            pinyin: Some("shī xiōng hǎo".into()),
            emotion: Some("happy".into()),
            action: Some("none".into()),
            audio_payload: Some("SUQz".into()),
            ..Default::default()
        };
        let message = Message::assistant_from(&data);
        assert_eq!(message.role, MessageRole::Assistant);
        assert_eq!(message.content, "Chào sư huynh!");
        assert_eq!(message.chinese_content.as_deref(), Some("师兄好！"));
        assert_eq!(message.audio_payload.as_deref(), Some("SUQz"));
        assert!(message.quiz_list.is_empty());
        assert!(message.correction_detail.is_none());
    }
}
