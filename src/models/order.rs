use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::address::AddressSnapshot;
use crate::utils::serde_helpers::{object_id_as_hex, option_object_id_as_hex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    PickedUp,
    InTransit,
    OutForDelivery,
    Delivered,
    Cancelled,
    Returned,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Returned => "returned",
        }
    }

    /// Legal next states. Terminal states return an empty slice.
    pub fn next_states(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[PickedUp, Cancelled],
            PickedUp => &[InTransit],
            InTransit => &[OutForDelivery, Returned],
            OutForDelivery => &[Delivered, Returned],
            Delivered | Cancelled | Returned => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.next_states().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.next_states().is_empty()
    }

    /// Customers may cancel until the parcel leaves their hands.
    pub fn is_cancellable_by_owner(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Standard,
    Express,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Standard => "standard",
            ServiceType::Express => "express",
        }
    }
}

/// Remetente ou destinatário
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: AddressSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, utoipa::ToSchema)]
pub struct Pricing {
    pub base: f64,
    pub weight_charge: f64,
    pub express_surcharge: f64,
    pub subtotal: f64,
    pub discount: f64,
    pub total: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none", serialize_with = "option_object_id_as_hex")]
    pub id: Option<ObjectId>,
    #[serde(serialize_with = "object_id_as_hex")]
    pub user_id: ObjectId,
    pub tracking_number: String,
    pub sender: Party,
    pub receiver: Party,
    pub origin_country: String,
    pub destination_country: String,
    pub service_type: ServiceType,
    pub weight_kg: f64,
    pub parcel_count: u32,
    pub description: Option<String>,
    pub declared_value: Option<f64>,
    pub pricing: Pricing,
    pub offer_code: Option<String>,
    pub status: OrderStatus,
    #[serde(serialize_with = "option_object_id_as_hex")]
    pub pickup_id: Option<ObjectId>,
    pub delivered_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartyRequest {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    /// Saved address of the caller; takes precedence over `address`.
    pub address_id: Option<String>,
    pub address: Option<AddressSnapshot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub sender: PartyRequest,
    pub receiver: PartyRequest,
    pub service_type: ServiceType,
    pub weight_kg: f64,
    pub parcel_count: Option<u32>,
    pub description: Option<String>,
    pub declared_value: Option<f64>,
    pub offer_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct QuoteRequest {
    pub origin_country: String,
    pub destination_country: String,
    pub weight_kg: f64,
    pub service_type: ServiceType,
    pub offer_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    pub location: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub status: Option<OrderStatus>,
    pub user_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        use OrderStatus::*;
        let path = [Pending, Confirmed, PickedUp, InTransit, OutForDelivery, Delivered];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn no_skipping_or_reviving() {
        use OrderStatus::*;
        assert!(!Pending.can_transition_to(Delivered));
        assert!(!PickedUp.can_transition_to(Cancelled));
        assert!(!Delivered.can_transition_to(Returned));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(Delivered.is_terminal());
        assert!(Returned.is_terminal());
    }

    #[test]
    fn owner_cancellation_window() {
        assert!(OrderStatus::Pending.is_cancellable_by_owner());
        assert!(OrderStatus::Confirmed.is_cancellable_by_owner());
        assert!(!OrderStatus::PickedUp.is_cancellable_by_owner());
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(serde_json::to_value(OrderStatus::OutForDelivery).unwrap(), "out_for_delivery");
        let parsed: OrderStatus = serde_json::from_value(serde_json::json!("picked_up")).unwrap();
        assert_eq!(parsed, OrderStatus::PickedUp);
        assert_eq!(OrderStatus::InTransit.to_string(), "in_transit");
    }
}
