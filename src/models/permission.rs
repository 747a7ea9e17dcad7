use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::Role;
use crate::utils::serde_helpers::option_object_id_as_hex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Users,
    Orders,
    Pickups,
    Tracks,
    Offers,
    Countries,
    Notifications,
    Analytics,
    Permissions,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Users => "users",
            Resource::Orders => "orders",
            Resource::Pickups => "pickups",
            Resource::Tracks => "tracks",
            Resource::Offers => "offers",
            Resource::Countries => "countries",
            Resource::Notifications => "notifications",
            Resource::Analytics => "analytics",
            Resource::Permissions => "permissions",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Write,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Delete => "delete",
        }
    }
}

/// Grant: which actions a role may perform on a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none", serialize_with = "option_object_id_as_hex")]
    pub id: Option<ObjectId>,
    pub role: Role,
    pub resource: Resource,
    pub actions: Vec<Action>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Permission {
    pub fn allows(&self, resource: Resource, action: Action) -> bool {
        self.resource == resource && self.actions.contains(&action)
    }
}

#[derive(Debug, Deserialize)]
pub struct UpsertPermissionRequest {
    pub role: Role,
    pub resource: Resource,
    pub actions: Vec<Action>,
}
