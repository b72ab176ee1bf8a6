//! Defines the JSON frame protocol between the client and the tutor server.
//!
//! Field names follow the server's snake_case wire format. Inbound types are
//! deliberately lenient: every field is optional and unknown fields are
//! ignored, so a newer server never makes a frame unparseable.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Commands sent from the client to the server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OutboundCommand {
    /// A chat line typed by the user.
    Chat { message: String, user_role: String },
    /// Clears the server-side conversation history and mood.
    Reset { user_role: String },
    /// Asks the server to echo the stored user state.
    GetState,
    /// Overrides the agent's sulking level (testing aid).
    SetSulking { level: u8 },
    /// Syncs the playback volume setting.
    SetVolume { volume: f32 },
}

impl OutboundCommand {
    /// The `action` discriminator, useful for logging.
    pub fn action(&self) -> &'static str {
        match self {
            OutboundCommand::Chat { .. } => "chat",
            OutboundCommand::Reset { .. } => "reset",
            OutboundCommand::GetState => "get_state",
            OutboundCommand::SetSulking { .. } => "set_sulking",
            OutboundCommand::SetVolume { .. } => "set_volume",
        }
    }
}

/// Classification of an inbound frame by its `status` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind<'a> {
    Typing,
    Connected,
    Success,
    Error,
    Unknown(&'a str),
}

/// One frame received from the server.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct InboundFrame {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub data: Option<SuccessData>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

impl InboundFrame {
    pub fn kind(&self) -> FrameKind<'_> {
        match self.status.as_str() {
            "typing" => FrameKind::Typing,
            "connected" => FrameKind::Connected,
            "success" => FrameKind::Success,
            "error" => FrameKind::Error,
            other => FrameKind::Unknown(other),
        }
    }
}

/// Payload of a `success` frame.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct SuccessData {
    #[serde(default)]
    pub emotion: Option<String>,
    #[serde(default, deserialize_with = "lenient_integer")]
    pub sulking_level: Option<i64>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub vietnamese_display: Option<String>,
    #[serde(default)]
    pub chinese_content: Option<String>,
    #[serde(default)]
    pub pinyin: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub quiz_list: Vec<QuizItem>,
    #[serde(default)]
    pub correction_detail: Option<CorrectionDetail>,
    #[serde(default, rename = "audio_base64")]
    pub audio_payload: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub volume: Option<f64>,
}

impl SuccessData {
    /// The emotion label, treating an empty string as absent.
    pub fn emotion_label(&self) -> Option<&str> {
        self.emotion.as_deref().filter(|label| !label.trim().is_empty())
    }

    /// Text to show as the message body: the Vietnamese rendering, else the Chinese.
    pub fn display_text(&self) -> Option<&str> {
        non_empty(self.vietnamese_display.as_deref())
            .or_else(|| non_empty(self.chinese_content.as_deref()))
    }

    /// The audio payload, treating an empty string as absent.
    pub fn audio(&self) -> Option<&str> {
        non_empty(self.audio_payload.as_deref())
    }
}

/// A single practice question attached to an agent turn.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct QuizItem {
    #[serde(default)]
    pub id: i64,
    /// `fill_blank`, `multiple_choice` or `listening`.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub question: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub options: Vec<String>,
    #[serde(default)]
    pub answer: String,
}

/// Grammar feedback for the user's previous line.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct CorrectionDetail {
    #[serde(default)]
    pub is_correct: Option<bool>,
    #[serde(default)]
    pub mistake_highlight: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

/// Accepts integers, integral floats, and numeric strings; anything else is `None`.
fn lenient_integer<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outbound_command_wire_shapes() {
        let chat = OutboundCommand::Chat {
            message: "你好".into(),
            user_role: "Sư huynh".into(),
        };
        assert_eq!(
            serde_json::to_value(&chat).unwrap(),
            json!({"action": "chat", "message": "你好", "user_role": "Sư huynh"})
        );
        assert_eq!(
            serde_json::to_value(OutboundCommand::GetState).unwrap(),
            json!({"action": "get_state"})
        );
        assert_eq!(
            serde_json::to_value(OutboundCommand::SetSulking { level: 2 }).unwrap(),
            json!({"action": "set_sulking", "level": 2})
        );
        assert_eq!(
            serde_json::to_value(OutboundCommand::SetVolume { volume: 0.5 }).unwrap(),
            json!({"action": "set_volume", "volume": 0.5})
        );
        assert_eq!(
            serde_json::to_value(OutboundCommand::Reset {
                user_role: "Tỷ tỷ".into()
            })
            .unwrap(),
            json!({"action": "reset", "user_role": "Tỷ tỷ"})
        );
    }

    #[test]
    fn test_frame_kind_classification() {
        let frame = |status: &str| InboundFrame {
            status: status.to_string(),
            ..Default::default()
        };
        assert_eq!(frame("typing").kind(), FrameKind::Typing);
        assert_eq!(frame("connected").kind(), FrameKind::Connected);
        assert_eq!(frame("success").kind(), FrameKind::Success);
        assert_eq!(frame("error").kind(), FrameKind::Error);
        assert_eq!(frame("streaming").kind(), FrameKind::Unknown("streaming"));
    }

    #[test]
    fn test_success_frame_parses_full_payload() {
        let raw = json!({
            "status": "success",
            "data": {
                "thought": "ignored",
                "chinese_content": "师兄好！",
                "vietnamese_display": "Chào sư huynh!",
                "pinyin": "shī xiōng hǎo",
                "emotion": "happy",
                "action": "quiz",
                "quiz_list": [
                    {"id": 1, "type": "multiple_choice", "question": "早上好?", "options": ["a", "b"], "answer": "a"}
                ],
                "correction_detail": {"is_correct": false, "mistake_highlight": "高心", "explanation": "高兴"},
                "audio_base64": "SUQz",
                "sulking_level": 2,
                "timestamp": "2025-01-01T00:00:00Z"
            }
        });
        let frame: InboundFrame = serde_json::from_value(raw).unwrap();
        let data = frame.data.unwrap();
        assert_eq!(data.display_text(), Some("Chào sư huynh!"));
        assert_eq!(data.emotion_label(), Some("happy"));
        assert_eq!(data.sulking_level, Some(2));
        assert_eq!(data.quiz_list.len(), 1);
        assert_eq!(data.quiz_list[0].kind, "multiple_choice");
        assert_eq!(data.quiz_list[0].options, vec!["a", "b"]);
        assert_eq!(
            data.correction_detail.as_ref().unwrap().mistake_highlight.as_deref(),
            Some("高心")
        );
        assert_eq!(data.audio(), Some("SUQz"));
    }

    #[test]
    fn test_lenient_fields() {
        let frame: InboundFrame = serde_json::from_value(json!({
            "status": "success",
            "data": {"sulking_level": "3", "quiz_list": null, "emotion": "", "audio_base64": ""}
        }))
        .unwrap();
        let data = frame.data.unwrap();
        assert_eq!(data.sulking_level, Some(3));
        assert!(data.quiz_list.is_empty());
        assert_eq!(data.emotion_label(), None);
        assert_eq!(data.audio(), None);

        let frame: InboundFrame =
            serde_json::from_value(json!({"status": "success", "data": {"sulking_level": [1]}}))
                .unwrap();
        assert_eq!(frame.data.unwrap().sulking_level, None);
    }

    #[test]
    fn test_display_text_falls_back_to_chinese() {
        let data = SuccessData {
            vietnamese_display: Some(String::new()),
            chinese_content: Some("好".into()),
            ..Default::default()
        };
        assert_eq!(data.display_text(), Some("好"));
        assert_eq!(SuccessData::default().display_text(), None);
    }

    #[test]
    fn test_handshake_frame_ignores_extra_fields() {
        let frame: InboundFrame = serde_json::from_str(
            r#"{"status":"connected","message":"欢迎回来","user_state":{"sulking_level":0}}"#,
        )
        .unwrap();
        assert_eq!(frame.kind(), FrameKind::Connected);
        assert_eq!(frame.message.as_deref(), Some("欢迎回来"));
        assert!(frame.data.is_none());
    }
}
