use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::utils::serde_helpers::option_object_id_as_hex;

/// País atendido + tabela de preço do destino
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Country {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none", serialize_with = "option_object_id_as_hex")]
    pub id: Option<ObjectId>,
    /// ISO-3166 alpha-2, uppercase
    pub code: String,
    pub name: String,
    pub dial_code: String,
    pub currency: String,
    pub base_rate: f64,
    pub per_kg_rate: f64,
    pub express_multiplier: f64,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CountryRequest {
    pub code: String,
    pub name: String,
    pub dial_code: String,
    pub currency: String,
    pub base_rate: f64,
    pub per_kg_rate: f64,
    pub express_multiplier: Option<f64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCountryRequest {
    pub name: Option<String>,
    pub dial_code: Option<String>,
    pub currency: Option<String>,
    pub base_rate: Option<f64>,
    pub per_kg_rate: Option<f64>,
    pub express_multiplier: Option<f64>,
    pub is_active: Option<bool>,
}
