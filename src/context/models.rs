//! # User Context Models
//!
//! Profile and conversation state kept per caller. Each type converts to and
//! from [`StructuredValue`] so it can pass through the attribute codec, and
//! derives serde for the HTTP surface.

use crate::codec::StructuredValue;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Language assumed for callers who never said otherwise.
pub const DEFAULT_LANGUAGE: &str = "hi-IN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub phone_number: String,
    pub crop_type: Option<String>,
    pub language: String,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(name: impl Into<String>, phone_number: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone_number: phone_number.into(),
            crop_type: None,
            language: DEFAULT_LANGUAGE.to_string(),
            location: None,
            created_at: Utc::now(),
        }
    }

    pub fn to_structured(&self) -> StructuredValue {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), self.name.clone().into());
        fields.insert("phone_number".to_string(), self.phone_number.clone().into());
        fields.insert("crop_type".to_string(), self.crop_type.clone().into());
        fields.insert("language".to_string(), self.language.clone().into());
        fields.insert("location".to_string(), self.location.clone().into());
        fields.insert("created_at".to_string(), self.created_at.into());
        StructuredValue::Map(fields)
    }

    pub fn from_structured(value: &StructuredValue) -> Result<Self> {
        Ok(Self {
            name: required_str(value, "name")?,
            phone_number: required_str(value, "phone_number")?,
            crop_type: optional_str(value, "crop_type"),
            language: optional_str(value, "language")
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            location: optional_str(value, "location"),
            created_at: optional_timestamp(value, "created_at")?.unwrap_or_else(Utc::now),
        })
    }
}

/// One exchange between caller and assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub timestamp: DateTime<Utc>,
    pub user_input: String,
    pub assistant_response: String,
    pub session_id: String,
    pub confidence_score: Option<f64>,
}

impl ConversationEntry {
    pub fn to_structured(&self) -> StructuredValue {
        let mut fields = BTreeMap::new();
        fields.insert("timestamp".to_string(), self.timestamp.into());
        fields.insert("user_input".to_string(), self.user_input.clone().into());
        fields.insert(
            "assistant_response".to_string(),
            self.assistant_response.clone().into(),
        );
        fields.insert("session_id".to_string(), self.session_id.clone().into());
        fields.insert("confidence_score".to_string(), self.confidence_score.into());
        StructuredValue::Map(fields)
    }

    pub fn from_structured(value: &StructuredValue) -> Result<Self> {
        Ok(Self {
            timestamp: optional_timestamp(value, "timestamp")?
                .ok_or_else(|| anyhow!("Conversation entry is missing 'timestamp'"))?,
            user_input: required_str(value, "user_input")?,
            assistant_response: required_str(value, "assistant_response")?,
            session_id: required_str(value, "session_id")?,
            confidence_score: value.get("confidence_score").and_then(StructuredValue::as_f64),
        })
    }
}

/// Everything remembered about one caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub phone_number: String,
    pub user_profile: UserProfile,
    pub conversation_history: Vec<ConversationEntry>,
    pub last_interaction: Option<DateTime<Utc>>,
    pub total_interactions: u32,
}

impl UserContext {
    /// Fresh context with no history.
    pub fn new(user_profile: UserProfile) -> Self {
        Self {
            phone_number: user_profile.phone_number.clone(),
            user_profile,
            conversation_history: Vec::new(),
            last_interaction: None,
            total_interactions: 0,
        }
    }

    /// Append an entry and bump the interaction counters.
    pub fn add_conversation(&mut self, entry: ConversationEntry) {
        self.last_interaction = Some(entry.timestamp);
        self.total_interactions += 1;
        self.conversation_history.push(entry);
    }

    /// Drop the oldest entries so at most `max_entries` remain.
    ///
    /// `total_interactions` keeps counting everything ever added.
    pub fn truncate_history(&mut self, max_entries: usize) {
        let len = self.conversation_history.len();
        if len > max_entries {
            self.conversation_history.drain(..len - max_entries);
        }
    }

    /// Up to `limit` entries, newest first.
    pub fn recent_conversations(&self, limit: usize) -> Vec<&ConversationEntry> {
        let mut entries: Vec<&ConversationEntry> = self.conversation_history.iter().collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        entries
    }

    pub fn to_structured(&self) -> StructuredValue {
        let mut fields = BTreeMap::new();
        fields.insert("phone_number".to_string(), self.phone_number.clone().into());
        fields.insert("user_profile".to_string(), self.user_profile.to_structured());
        fields.insert(
            "conversation_history".to_string(),
            StructuredValue::List(
                self.conversation_history
                    .iter()
                    .map(ConversationEntry::to_structured)
                    .collect(),
            ),
        );
        fields.insert("last_interaction".to_string(), self.last_interaction.into());
        fields.insert("total_interactions".to_string(), self.total_interactions.into());
        StructuredValue::Map(fields)
    }

    pub fn from_structured(value: &StructuredValue) -> Result<Self> {
        let profile = value
            .get("user_profile")
            .ok_or_else(|| anyhow!("User context is missing 'user_profile'"))?;

        let conversation_history = match value.get("conversation_history") {
            Some(StructuredValue::List(entries)) => entries
                .iter()
                .enumerate()
                .map(|(i, entry)| {
                    ConversationEntry::from_structured(entry)
                        .with_context(|| format!("Invalid conversation entry at index {}", i))
                })
                .collect::<Result<Vec<_>>>()?,
            Some(StructuredValue::Null) | None => Vec::new(),
            Some(_) => return Err(anyhow!("'conversation_history' is not a list")),
        };

        let total_interactions = value
            .get("total_interactions")
            .and_then(StructuredValue::as_i64)
            .unwrap_or(0);

        Ok(Self {
            phone_number: required_str(value, "phone_number")?,
            user_profile: UserProfile::from_structured(profile)
                .context("Invalid user profile")?,
            conversation_history,
            last_interaction: optional_timestamp(value, "last_interaction")?,
            total_interactions: u32::try_from(total_interactions)
                .map_err(|_| anyhow!("total_interactions out of range: {}", total_interactions))?,
        })
    }
}

fn required_str(value: &StructuredValue, key: &str) -> Result<String> {
    value
        .get(key)
        .and_then(StructuredValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Missing or non-string field '{}'", key))
}

fn optional_str(value: &StructuredValue, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(StructuredValue::as_str)
        .map(str::to_string)
}

fn optional_timestamp(value: &StructuredValue, key: &str) -> Result<Option<DateTime<Utc>>> {
    match value.get(key).and_then(StructuredValue::as_str) {
        Some(text) => DateTime::parse_from_rfc3339(text)
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .with_context(|| format!("Field '{}' is not an RFC 3339 timestamp: {}", key, text)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_item, encode_item};
    use chrono::Duration;

    fn entry(minutes_ago: i64, text: &str) -> ConversationEntry {
        ConversationEntry {
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
            user_input: text.to_string(),
            assistant_response: format!("reply to {}", text),
            session_id: format!("kinesis_caller_{}", minutes_ago),
            confidence_score: Some(0.9),
        }
    }

    #[test]
    fn test_context_survives_codec_round_trip() {
        let mut profile = UserProfile::new("रमेश", "+919876543210");
        profile.crop_type = Some("wheat".to_string());
        let mut context = UserContext::new(profile);
        context.add_conversation(entry(2, "मौसम कैसा है?"));
        context.add_conversation(entry(1, "धन्यवाद"));

        let fields = match context.to_structured() {
            StructuredValue::Map(fields) => fields,
            other => panic!("expected map, got {:?}", other),
        };
        let item = encode_item(&fields);
        let restored =
            UserContext::from_structured(&StructuredValue::Map(decode_item(&item))).unwrap();

        assert_eq!(restored, context);
    }

    #[test]
    fn test_add_conversation_updates_counters() {
        let mut context = UserContext::new(UserProfile::new("A", "1"));
        let e = entry(0, "hi");
        let ts = e.timestamp;
        context.add_conversation(e);

        assert_eq!(context.total_interactions, 1);
        assert_eq!(context.last_interaction, Some(ts));
    }

    #[test]
    fn test_recent_conversations_newest_first() {
        let mut context = UserContext::new(UserProfile::new("A", "1"));
        context.add_conversation(entry(5, "old"));
        context.add_conversation(entry(1, "new"));
        context.add_conversation(entry(3, "mid"));

        let recent: Vec<&str> = context
            .recent_conversations(2)
            .iter()
            .map(|e| e.user_input.as_str())
            .collect();
        assert_eq!(recent, vec!["new", "mid"]);
    }

    #[test]
    fn test_truncate_keeps_newest() {
        let mut context = UserContext::new(UserProfile::new("A", "1"));
        for i in 0..5 {
            context.add_conversation(entry(10 - i, &format!("m{}", i)));
        }
        context.truncate_history(3);

        let inputs: Vec<&str> = context
            .conversation_history
            .iter()
            .map(|e| e.user_input.as_str())
            .collect();
        assert_eq!(inputs, vec!["m2", "m3", "m4"]);
        assert_eq!(context.total_interactions, 5);
    }

    #[test]
    fn test_profile_defaults_language() {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), StructuredValue::from("A"));
        fields.insert("phone_number".to_string(), StructuredValue::from("1"));
        let profile = UserProfile::from_structured(&StructuredValue::Map(fields)).unwrap();

        assert_eq!(profile.language, DEFAULT_LANGUAGE);
        assert_eq!(profile.crop_type, None);
    }

    #[test]
    fn test_missing_profile_is_an_error() {
        let mut fields = BTreeMap::new();
        fields.insert("phone_number".to_string(), StructuredValue::from("1"));
        assert!(UserContext::from_structured(&StructuredValue::Map(fields)).is_err());
    }
}
