use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::address::AddressSnapshot;
use crate::utils::serde_helpers::{object_id_as_hex, object_ids_as_hex, option_object_id_as_hex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PickupStatus {
    Requested,
    Scheduled,
    Completed,
    Cancelled,
}

impl PickupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PickupStatus::Requested => "requested",
            PickupStatus::Scheduled => "scheduled",
            PickupStatus::Completed => "completed",
            PickupStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(&self, next: PickupStatus) -> bool {
        use PickupStatus::*;
        matches!(
            (self, next),
            (Requested, Scheduled) | (Requested, Cancelled) | (Scheduled, Completed) | (Scheduled, Cancelled)
        )
    }

    pub fn is_open(&self) -> bool {
        matches!(self, PickupStatus::Requested | PickupStatus::Scheduled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pickup {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none", serialize_with = "option_object_id_as_hex")]
    pub id: Option<ObjectId>,
    #[serde(serialize_with = "object_id_as_hex")]
    pub user_id: ObjectId,
    #[serde(serialize_with = "object_id_as_hex")]
    pub address_id: ObjectId,
    pub address: AddressSnapshot,
    pub phone: String,
    /// YYYY-MM-DD
    pub scheduled_date: String,
    pub time_slot: Option<String>,
    pub parcel_count: u32,
    pub status: PickupStatus,
    #[serde(serialize_with = "option_object_id_as_hex")]
    pub assigned_to: Option<ObjectId>,
    pub notes: Option<String>,
    #[serde(default, serialize_with = "object_ids_as_hex")]
    pub order_ids: Vec<ObjectId>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePickupRequest {
    pub address_id: String,
    pub phone: String,
    pub scheduled_date: String,
    pub time_slot: Option<String>,
    pub parcel_count: u32,
    pub notes: Option<String>,
    pub order_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StaffUpdatePickupRequest {
    pub status: Option<PickupStatus>,
    pub scheduled_date: Option<String>,
    pub time_slot: Option<String>,
    pub assigned_to: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PickupListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub status: Option<PickupStatus>,
    pub date: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pickup_transitions() {
        use PickupStatus::*;
        assert!(Requested.can_transition_to(Scheduled));
        assert!(Scheduled.can_transition_to(Completed));
        assert!(!Requested.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Scheduled));
        assert!(Scheduled.is_open());
        assert!(!Completed.is_open());
    }
}
