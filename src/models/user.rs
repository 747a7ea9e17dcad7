use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::now_millis;
use crate::utils::serde_helpers::option_object_id_as_hex;

/// Papéis do sistema, em ordem crescente de privilégio
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Moderator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }

    pub fn is_staff(&self) -> bool {
        *self >= Role::Moderator
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none", serialize_with = "option_object_id_as_hex")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    pub phone: String,
    /// bcrypt hash
    pub password: String,
    pub role: Role,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
    pub last_login: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

fn default_is_active() -> bool {
    true
}

impl User {
    /// Hashes the password before the document ever exists.
    pub fn new(
        name: &str,
        email: &str,
        phone: &str,
        password: &str,
        role: Role,
        bcrypt_cost: u32,
    ) -> Result<Self, bcrypt::BcryptError> {
        let now = now_millis();
        Ok(Self {
            id: None,
            name: name.trim().to_string(),
            email: email.to_string(),
            phone: phone.to_string(),
            password: bcrypt::hash(password, bcrypt_cost)?,
            role,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn verify_password(&self, candidate: &str) -> bool {
        bcrypt::verify(candidate, &self.password).unwrap_or(false)
    }
}

/// Public view of a user, never carries the password hash.
#[derive(Debug, Serialize, Clone, utoipa::ToSchema)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: Role,
    pub is_active: bool,
    pub last_login: Option<i64>,
    pub created_at: i64,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        UserInfo {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: user.name,
            email: user.email,
            phone: user.phone,
            role: user.role,
            is_active: user.is_active,
            last_login: user.last_login,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdminUpdateUserRequest {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub search: Option<String>,
    pub role: Option<Role>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering() {
        assert!(Role::Admin > Role::Moderator);
        assert!(Role::Moderator > Role::User);
        assert!(Role::Moderator.is_staff());
        assert!(!Role::User.is_staff());
        assert_eq!("moderator".parse::<Role>().unwrap(), Role::Moderator);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn new_user_hashes_password() {
        let user = User::new("Ada", "ada@example.com", "+15550100", "correct horse", Role::User, 4).unwrap();
        assert_ne!(user.password, "correct horse");
        assert!(user.verify_password("correct horse"));
        assert!(!user.verify_password("wrong horse"));
    }

    #[test]
    fn user_info_hides_password() {
        let mut user = User::new("Ada", "ada@example.com", "+15550100", "correct horse", Role::Admin, 4).unwrap();
        user.id = Some(ObjectId::new());
        let value = serde_json::to_value(UserInfo::from(user)).unwrap();
        assert!(value.get("password").is_none());
        assert_eq!(value["role"], "admin");
    }
}
