use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::utils::serde_helpers::option_object_id_as_hex;

/// Tentativa de login (sucesso ou falha)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginHistory {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none", serialize_with = "option_object_id_as_hex")]
    pub id: Option<ObjectId>,
    /// None when the identifier matched no account
    #[serde(serialize_with = "option_object_id_as_hex")]
    pub user_id: Option<ObjectId>,
    pub identifier: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub reason: Option<String>,
    pub created_at: i64,
}
