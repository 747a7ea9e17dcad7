use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::utils::serde_helpers::{object_id_as_hex, option_object_id_as_hex};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none", serialize_with = "option_object_id_as_hex")]
    pub id: Option<ObjectId>,
    #[serde(serialize_with = "object_id_as_hex")]
    pub user_id: ObjectId,
    /// "Home", "Office"...
    pub label: String,
    pub contact_name: String,
    pub phone: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: String,
    pub is_default: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddressRequest {
    pub label: String,
    pub contact_name: String,
    pub phone: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: String,
}

/// Address copied into an order so later edits don't rewrite history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddressSnapshot {
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: String,
}

impl From<&Address> for AddressSnapshot {
    fn from(address: &Address) -> Self {
        AddressSnapshot {
            line1: address.line1.clone(),
            line2: address.line2.clone(),
            city: address.city.clone(),
            state: address.state.clone(),
            postal_code: address.postal_code.clone(),
            country_code: address.country_code.clone(),
        }
    }
}
