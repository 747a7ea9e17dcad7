use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::utils::serde_helpers::option_object_id_as_hex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    Percentage,
    Flat,
}

/// Oferta / cupom promocional
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none", serialize_with = "option_object_id_as_hex")]
    pub id: Option<ObjectId>,
    /// Uppercase, unique
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    #[serde(default)]
    pub min_order_value: f64,
    pub max_discount: Option<f64>,
    pub valid_from: i64,
    pub valid_until: i64,
    pub usage_limit: Option<i64>,
    #[serde(default)]
    pub used_count: i64,
    pub is_active: bool,
    /// Destination country codes; empty means everywhere.
    #[serde(default)]
    pub countries: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOfferRequest {
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub min_order_value: Option<f64>,
    pub max_discount: Option<f64>,
    pub valid_from: i64,
    pub valid_until: i64,
    pub usage_limit: Option<i64>,
    pub is_active: Option<bool>,
    pub countries: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOfferRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<f64>,
    pub min_order_value: Option<f64>,
    pub max_discount: Option<f64>,
    pub valid_from: Option<i64>,
    pub valid_until: Option<i64>,
    pub usage_limit: Option<i64>,
    pub is_active: Option<bool>,
    pub countries: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateOfferQuery {
    pub amount: f64,
    pub destination: Option<String>,
}
