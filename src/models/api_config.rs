use base64::Engine;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::now_millis;
use crate::utils::serde_helpers::{object_id_as_hex, option_object_id_as_hex};

pub const API_KEY_PREFIX: &str = "ck_";

/// Chave de API para integração programática (uma por usuário)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none", serialize_with = "option_object_id_as_hex")]
    pub id: Option<ObjectId>,
    #[serde(serialize_with = "object_id_as_hex")]
    pub user_id: ObjectId,
    pub api_key: String,
    pub is_active: bool,
    pub webhook_url: Option<String>,
    pub last_used_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ApiConfig {
    /// Generates the key up front, so every stored config has one.
    pub fn new(user_id: ObjectId, webhook_url: Option<String>) -> Self {
        let now = now_millis();
        Self {
            id: None,
            user_id,
            api_key: generate_api_key(),
            is_active: true,
            webhook_url,
            last_used_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn masked_key(&self) -> String {
        mask_key(&self.api_key)
    }
}

pub fn generate_api_key() -> String {
    let mut bytes = Vec::with_capacity(32);
    bytes.extend_from_slice(Uuid::new_v4().as_bytes());
    bytes.extend_from_slice(Uuid::new_v4().as_bytes());
    format!(
        "{}{}",
        API_KEY_PREFIX,
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    )
}

pub fn mask_key(key: &str) -> String {
    let visible: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("{}****{}", API_KEY_PREFIX, visible)
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiConfigView {
    pub id: String,
    pub api_key: String,
    pub is_active: bool,
    pub webhook_url: Option<String>,
    pub last_used_at: Option<i64>,
    pub created_at: i64,
}

impl ApiConfigView {
    /// The full key is only shown right after it is generated.
    pub fn revealed(config: ApiConfig) -> Self {
        Self::build(config.api_key.clone(), config)
    }

    pub fn masked(config: ApiConfig) -> Self {
        Self::build(config.masked_key(), config)
    }

    fn build(api_key: String, config: ApiConfig) -> Self {
        ApiConfigView {
            id: config.id.map(|id| id.to_hex()).unwrap_or_default(),
            api_key,
            is_active: config.is_active,
            webhook_url: config.webhook_url,
            last_used_at: config.last_used_at,
            created_at: config.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfigRequest {
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateApiConfigRequest {
    pub is_active: Option<bool>,
    pub webhook_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_prefixed_and_unique() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert!(a.starts_with(API_KEY_PREFIX));
        // 32 bytes -> 43 chars base64 sem padding
        assert_eq!(a.len(), API_KEY_PREFIX.len() + 43);
        assert_ne!(a, b);
    }

    #[test]
    fn masking_keeps_last_four() {
        assert_eq!(mask_key("ck_abcdefgh1234"), "ck_****1234");
    }

    #[test]
    fn new_config_is_active_with_key() {
        let config = ApiConfig::new(ObjectId::new(), None);
        assert!(config.is_active);
        assert!(config.api_key.starts_with(API_KEY_PREFIX));
        assert!(ApiConfigView::masked(config).api_key.contains("****"));
    }
}
