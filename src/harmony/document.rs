//! The channel-tagged dialogue document.
//!
//! A [`HarmonyDocument`] is the training-data artifact: a system message, a
//! developer message, and an ordered list of channel-tagged messages. The
//! hard guarantee downstream consumers rely on: exactly one
//! `role=assistant, channel=final` message is always present.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message channel in the harmony dialogue format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Internal reasoning reconstructed from captured calls.
    Analysis,
    /// Intermediate commentary (tool-call narration and the like).
    Commentary,
    /// The user-visible conclusion.
    Final,
}

/// One message in the dialogue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HarmonyMessage {
    pub role: String,
    pub channel: Channel,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

impl HarmonyMessage {
    #[must_use]
    pub fn assistant(channel: Channel, content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            channel,
            content: content.into(),
            recipient: None,
        }
    }

    #[must_use]
    pub fn is_final_assistant(&self) -> bool {
        self.role == "assistant" && self.channel == Channel::Final
    }
}

/// The structured conversation produced by the harmony compiler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HarmonyDocument {
    pub system_message: Value,
    pub developer_message: Value,
    pub messages: Vec<HarmonyMessage>,
}

impl HarmonyDocument {
    /// The final assistant message, if present.
    #[must_use]
    pub fn final_message(&self) -> Option<&HarmonyMessage> {
        self.messages.iter().find(|m| m.is_final_assistant())
    }

    /// Messages on a given channel.
    #[must_use]
    pub fn on_channel(&self, channel: Channel) -> Vec<&HarmonyMessage> {
        self.messages
            .iter()
            .filter(|m| m.channel == channel)
            .collect()
    }

    /// Enforce the single-final guarantee in place.
    ///
    /// No final message: `fallback` is appended. More than one: the first is
    /// kept and the rest are demoted to commentary.
    pub fn normalize_final(&mut self, fallback: HarmonyMessage) {
        let mut finals = 0usize;
        for message in &mut self.messages {
            if message.is_final_assistant() {
                finals += 1;
                if finals > 1 {
                    message.channel = Channel::Commentary;
                }
            }
        }
        if finals == 0 {
            self.messages.push(fallback);
        }
    }

    /// Render the dialogue as channel-tagged text.
    #[must_use]
    pub fn render_dialogue(&self) -> String {
        let mut out = String::new();
        out.push_str("<|system|>\n");
        out.push_str(&pretty(&self.system_message));
        out.push_str("\n\n<|developer|>\n");
        out.push_str(&pretty(&self.developer_message));
        for message in &self.messages {
            out.push_str(&format!(
                "\n\n<|{}|{}|>\n{}",
                message.role,
                channel_tag(message.channel),
                message.content
            ));
        }
        out.push('\n');
        out
    }
}

fn channel_tag(channel: Channel) -> &'static str {
    match channel {
        Channel::Analysis => "analysis",
        Channel::Commentary => "commentary",
        Channel::Final => "final",
    }
}

fn pretty(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(messages: Vec<HarmonyMessage>) -> HarmonyDocument {
        HarmonyDocument {
            system_message: json!({"instructions": "s"}),
            developer_message: json!({"instructions": "d"}),
            messages,
        }
    }

    #[test]
    fn normalize_appends_missing_final() {
        let mut document = doc(vec![HarmonyMessage::assistant(Channel::Analysis, "a")]);
        document.normalize_final(HarmonyMessage::assistant(Channel::Final, "the poem"));
        assert_eq!(document.on_channel(Channel::Final).len(), 1);
        assert_eq!(document.final_message().unwrap().content, "the poem");
    }

    #[test]
    fn normalize_demotes_extra_finals() {
        let mut document = doc(vec![
            HarmonyMessage::assistant(Channel::Final, "first"),
            HarmonyMessage::assistant(Channel::Final, "second"),
        ]);
        document.normalize_final(HarmonyMessage::assistant(Channel::Final, "fallback"));
        let finals = document.on_channel(Channel::Final);
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].content, "first");
        assert_eq!(document.on_channel(Channel::Commentary).len(), 1);
    }

    #[test]
    fn dialogue_render_carries_channel_tags() {
        let document = doc(vec![
            HarmonyMessage::assistant(Channel::Analysis, "thinking"),
            HarmonyMessage::assistant(Channel::Final, "بيت الشعر"),
        ]);
        let text = document.render_dialogue();
        assert!(text.contains("<|system|>"));
        assert!(text.contains("<|assistant|analysis|>"));
        assert!(text.contains("<|assistant|final|>\nبيت الشعر"));
    }

    #[test]
    fn channel_serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&Channel::Final).unwrap(), "\"final\"");
        let back: Channel = serde_json::from_str("\"analysis\"").unwrap();
        assert_eq!(back, Channel::Analysis);
    }
}
