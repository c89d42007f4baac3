//! Persisted user settings: the tracked network, the alert switch and the
//! optional webhook endpoint.

use std::sync::Arc;

use thiserror::Error;

use crate::{
    config::{SettingsDefaults, parse_webhook_url},
    models::Settings,
    persistence::{
        error::PersistenceError,
        keys,
        traits::{KeyValueStore, StateBatch},
    },
};

/// Errors raised while reading or changing settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The value is not acceptable for the setting.
    #[error("Invalid setting: {0}")]
    InvalidValue(String),

    /// Error occurred in the state repository
    #[error("State repository error: {0}")]
    StateRepositoryError(#[from] PersistenceError),
}

/// Typed access to the `settings:*` keys.
pub struct SettingsStore<T: KeyValueStore> {
    store: Arc<T>,
}

impl<T: KeyValueStore> SettingsStore<T> {
    /// Creates a settings view over the given store.
    pub fn new(store: Arc<T>) -> Self {
        Self { store }
    }

    /// Loads the current settings. Missing keys take their default value.
    pub async fn load(&self) -> Result<Settings, SettingsError> {
        let defaults = Settings::default();
        let check_enabled = self
            .store
            .get_json_state::<bool>(keys::SETTINGS_CHECK_ENABLED)
            .await?
            .unwrap_or(defaults.check_enabled);
        let target_network_name = self
            .store
            .get_json_state::<String>(keys::SETTINGS_TARGET_NETWORK_NAME)
            .await?
            .unwrap_or(defaults.target_network_name);
        let webhook_url = self
            .store
            .get_json_state::<String>(keys::SETTINGS_WEBHOOK_URL)
            .await?
            .filter(|url| !url.trim().is_empty());

        Ok(Settings { check_enabled, target_network_name, webhook_url })
    }

    /// Writes each configured default whose key is not stored yet. Values
    /// changed by the user are never overwritten.
    pub async fn seed_defaults(&self, defaults: &SettingsDefaults) -> Result<(), SettingsError> {
        let mut batch = StateBatch::new();

        if self.store.get_raw_state(keys::SETTINGS_CHECK_ENABLED).await?.is_none() {
            batch.set_json(keys::SETTINGS_CHECK_ENABLED, &defaults.check_enabled)?;
        }
        if self.store.get_raw_state(keys::SETTINGS_TARGET_NETWORK_NAME).await?.is_none() {
            batch.set_json(keys::SETTINGS_TARGET_NETWORK_NAME, defaults.target_network_name.trim())?;
        }
        if let Some(url) = &defaults.webhook_url {
            if self.store.get_raw_state(keys::SETTINGS_WEBHOOK_URL).await?.is_none() {
                batch.set_json(keys::SETTINGS_WEBHOOK_URL, url)?;
            }
        }

        if !batch.is_empty() {
            tracing::info!(writes = batch.writes().len(), "Seeding default settings.");
            self.store.commit_batch(batch).await?;
        }
        Ok(())
    }

    /// Sets the tracked network name.
    pub async fn set_target(&self, name: &str) -> Result<(), SettingsError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SettingsError::InvalidValue(
                "target network name must not be empty".to_string(),
            ));
        }
        self.store.set_json_state(keys::SETTINGS_TARGET_NETWORK_NAME, &name.to_string()).await?;
        Ok(())
    }

    /// Turns alerts on or off. Accounting is not affected.
    pub async fn set_enabled(&self, enabled: bool) -> Result<(), SettingsError> {
        self.store.set_json_state(keys::SETTINGS_CHECK_ENABLED, &enabled).await?;
        Ok(())
    }

    /// Sets the webhook endpoint. A blank URL clears it.
    pub async fn set_webhook(&self, url: &str) -> Result<(), SettingsError> {
        match parse_webhook_url(url).map_err(SettingsError::InvalidValue)? {
            Some(url) => {
                self.store.set_json_state(keys::SETTINGS_WEBHOOK_URL, &url).await?;
                Ok(())
            }
            None => self.clear_webhook().await,
        }
    }

    /// Removes the webhook endpoint.
    pub async fn clear_webhook(&self) -> Result<(), SettingsError> {
        // An empty value marks the webhook as deliberately cleared, so it is
        // not seeded again from the configuration.
        self.store.set_json_state(keys::SETTINGS_WEBHOOK_URL, &String::new()).await?;
        Ok(())
    }
}
