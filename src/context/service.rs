//! # User Context Service
//!
//! Reads and writes [`UserContext`] documents through a [`DocumentStore`],
//! one item per caller keyed on `phone_number`.
//!
//! ## Error Mapping:
//! - Store or decode failures → `IngestError::Database` (`DB_002`)
//! - Appending history for an unknown caller → `IngestError::UserNotFound`

use super::models::{ConversationEntry, UserContext, UserProfile};
use crate::codec::{decode_item, encode_item, Item, StructuredValue, WireAttribute};
use crate::config::ContextConfig;
use crate::error::{ErrorCode, IngestError, IngestResult, Severity, ValidationError};
use crate::storage::DocumentStore;
use serde::Deserialize;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Partition key attribute of the user-context table.
pub const PARTITION_KEY: &str = "phone_number";

/// Fields accepted when creating a profile.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProfile {
    pub phone_number: String,
    pub name: String,
    #[serde(default)]
    pub crop_type: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

pub struct UserContextService {
    store: Arc<dyn DocumentStore>,
    table: String,
    settings: RwLock<ContextConfig>,
}

impl UserContextService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        table: impl Into<String>,
        settings: ContextConfig,
    ) -> Self {
        let table = table.into();
        info!(table = %table, "Initialized user context service");
        Self {
            store,
            table,
            settings: RwLock::new(settings),
        }
    }

    /// Swap in new history limits and defaults. Applies to the next call.
    pub fn update_settings(&self, settings: ContextConfig) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    fn settings(&self) -> ContextConfig {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fetch a caller's context. `Ok(None)` when nothing is stored.
    pub fn get_user_context(&self, phone_number: &str) -> IngestResult<Option<UserContext>> {
        debug!(phone_number, "Retrieving user context");

        let item = self
            .store
            .get(&self.table, &key_for(phone_number))
            .map_err(|err| database_error("Failed to read user context", phone_number, err))?;

        let Some(item) = item else {
            info!(phone_number, "No user context found");
            return Ok(None);
        };

        let context = UserContext::from_structured(&StructuredValue::Map(decode_item(&item)))
            .map_err(|err| database_error("Stored user context is malformed", phone_number, err))?;

        info!(
            phone_number,
            total_interactions = context.total_interactions,
            "Retrieved user context"
        );
        Ok(Some(context))
    }

    /// Insert or replace a caller's context.
    pub fn save_user_context(&self, context: &UserContext) -> IngestResult<()> {
        debug!(phone_number = %context.phone_number, "Saving user context");

        let item = match context.to_structured() {
            StructuredValue::Map(fields) => encode_item(&fields),
            _ => Item::new(),
        };

        self.store
            .put(&self.table, item)
            .map_err(|err| database_error("Failed to save user context", &context.phone_number, err))?;

        info!(phone_number = %context.phone_number, "Saved user context");
        Ok(())
    }

    /// Create a profile with an empty history. An existing context for the
    /// same number is replaced.
    pub fn create_user_profile(&self, new: NewProfile) -> IngestResult<UserProfile> {
        debug!(phone_number = %new.phone_number, name = %new.name, "Creating user profile");

        let mut profile = UserProfile::new(new.name, new.phone_number);
        profile.crop_type = new.crop_type;
        profile.location = new.location;
        profile.language = new
            .language
            .unwrap_or_else(|| self.settings().default_language);

        self.save_user_context(&UserContext::new(profile.clone()))?;

        info!(phone_number = %profile.phone_number, name = %profile.name, "Created user profile");
        Ok(profile)
    }

    /// Append one exchange, keeping only the newest `max_history_entries`.
    pub fn update_conversation_history(
        &self,
        phone_number: &str,
        entry: ConversationEntry,
    ) -> IngestResult<UserContext> {
        debug!(phone_number, "Updating conversation history");

        let Some(mut context) = self.get_user_context(phone_number)? else {
            let detail = ValidationError::new(
                ErrorCode::UserNotFound,
                format!("User context not found for phone number: {}", phone_number),
                Severity::Medium,
            )
            .with_context("phone_number", phone_number);
            warn!(phone_number, "User not found for conversation update");
            return Err(IngestError::UserNotFound(detail));
        };

        context.add_conversation(entry);
        context.truncate_history(self.settings().max_history_entries);
        self.save_user_context(&context)?;

        info!(
            phone_number,
            total_interactions = context.total_interactions,
            history_len = context.conversation_history.len(),
            "Updated conversation history"
        );
        Ok(context)
    }

    /// Existing context, or a new one under the configured default name.
    pub fn get_or_create_user_context(&self, phone_number: &str) -> IngestResult<UserContext> {
        if let Some(context) = self.get_user_context(phone_number)? {
            return Ok(context);
        }

        info!(phone_number, "Creating new user context");
        let profile = self.create_user_profile(NewProfile {
            phone_number: phone_number.to_string(),
            name: self.settings().default_user_name,
            crop_type: None,
            language: None,
            location: None,
        })?;
        Ok(UserContext::new(profile))
    }

    /// Remove a caller's context. Missing callers are not an error.
    pub fn delete_user_context(&self, phone_number: &str) -> IngestResult<()> {
        debug!(phone_number, "Deleting user context");

        self.store
            .delete(&self.table, &key_for(phone_number))
            .map_err(|err| database_error("Failed to delete user context", phone_number, err))?;

        info!(phone_number, "Deleted user context");
        Ok(())
    }
}

fn key_for(phone_number: &str) -> Item {
    let mut key = Item::new();
    key.insert(
        PARTITION_KEY.to_string(),
        WireAttribute::S(phone_number.to_string()),
    );
    key
}

fn database_error(message: &str, phone_number: &str, err: anyhow::Error) -> IngestError {
    IngestError::Database {
        detail: ValidationError::new(
            ErrorCode::Database,
            format!("{}: {}", message, err),
            Severity::High,
        )
        .with_context("phone_number", phone_number),
        source: err.into(),
    }
}
