use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::Role;
use crate::utils::serde_helpers::{object_id_as_hex, option_object_id_as_hex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Order,
    Pickup,
    Offer,
    Account,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none", serialize_with = "option_object_id_as_hex")]
    pub id: Option<ObjectId>,
    #[serde(serialize_with = "object_id_as_hex")]
    pub user_id: ObjectId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub unread: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastRequest {
    pub title: String,
    pub message: String,
    /// Only users with this role; everyone when absent.
    pub role: Option<Role>,
    pub kind: Option<NotificationKind>,
}
