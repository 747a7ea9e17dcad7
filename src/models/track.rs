use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::order::{OrderStatus, ServiceType};
use crate::utils::serde_helpers::{object_id_as_hex, option_object_id_as_hex};

/// Evento de rastreamento de um pedido
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none", serialize_with = "option_object_id_as_hex")]
    pub id: Option<ObjectId>,
    #[serde(serialize_with = "object_id_as_hex")]
    pub order_id: ObjectId,
    pub tracking_number: String,
    pub status: OrderStatus,
    pub location: Option<String>,
    pub note: Option<String>,
    #[serde(serialize_with = "option_object_id_as_hex")]
    pub updated_by: Option<ObjectId>,
    pub created_at: i64,
}

/// Public event, without who changed it.
#[derive(Debug, Clone, Serialize)]
pub struct TrackEvent {
    pub status: OrderStatus,
    pub location: Option<String>,
    pub note: Option<String>,
    pub at: i64,
}

impl From<Track> for TrackEvent {
    fn from(track: Track) -> Self {
        TrackEvent {
            status: track.status,
            location: track.location,
            note: track.note,
            at: track.created_at,
        }
    }
}

/// Resposta pública do rastreio (sem dados pessoais)
#[derive(Debug, Clone, Serialize)]
pub struct TrackingInfo {
    pub tracking_number: String,
    pub status: OrderStatus,
    pub origin_country: String,
    pub destination_country: String,
    pub service_type: ServiceType,
    pub parcel_count: u32,
    pub created_at: i64,
    pub delivered_at: Option<i64>,
    pub events: Vec<TrackEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddTrackRequest {
    pub status: OrderStatus,
    pub location: Option<String>,
    pub note: Option<String>,
}
