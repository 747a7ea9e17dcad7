use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};

use crate::database::{self, MongoDB};
use crate::models::{
    now_millis, Action, Address, AdminUpdateUserRequest, ApiConfig, LoginHistory, Notification, Resource, Role,
    UpdateProfileRequest, User, UserListQuery,
};
use crate::services::auth_service::Claims;
use crate::services::permission_service;
use crate::utils::pagination::{PageMeta, PaginationQuery};
use crate::utils::validation::normalize_phone;
use crate::utils::AppError;

pub async fn get_user(db: &MongoDB, id: ObjectId) -> Result<User, AppError> {
    db.collection::<User>(database::USERS)
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))
}

pub async fn update_profile(db: &MongoDB, user_id: ObjectId, request: &UpdateProfileRequest) -> Result<User, AppError> {
    let collection = db.collection::<User>(database::USERS);
    let mut set = doc! { "updated_at": now_millis() };

    if let Some(name) = &request.name {
        if name.trim().is_empty() {
            return Err(AppError::validation("name", "is required"));
        }
        set.insert("name", name.trim());
    }

    if let Some(phone) = &request.phone {
        let phone = normalize_phone(phone)?;
        let taken = collection
            .find_one(doc! { "phone": &phone, "_id": { "$ne": user_id } })
            .await?;
        if taken.is_some() {
            return Err(AppError::Conflict("Phone is already registered".to_string()));
        }
        set.insert("phone", phone);
    }

    collection
        .find_one_and_update(doc! { "_id": user_id }, doc! { "$set": set })
        .return_document(mongodb::options::ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))
}

/// Removes the account with its addresses, notifications and API key.
/// Orders stay for accounting.
pub async fn delete_account(db: &MongoDB, user_id: ObjectId) -> Result<(), AppError> {
    let deleted = db
        .collection::<User>(database::USERS)
        .delete_one(doc! { "_id": user_id })
        .await?;
    if deleted.deleted_count == 0 {
        return Err(AppError::NotFound("User".to_string()));
    }

    let owned = doc! { "user_id": user_id };
    let addresses = db
        .collection::<Address>(database::ADDRESSES)
        .delete_many(owned.clone())
        .await?;
    let notifications = db
        .collection::<Notification>(database::NOTIFICATIONS)
        .delete_many(owned.clone())
        .await?;
    db.collection::<ApiConfig>(database::API_CONFIGS)
        .delete_many(owned)
        .await?;

    log::info!(
        "🗑️  User {} deleted ({} addresses, {} notifications)",
        user_id,
        addresses.deleted_count,
        notifications.deleted_count
    );
    Ok(())
}

pub async fn login_history(
    db: &MongoDB,
    user_id: ObjectId,
    page: &PaginationQuery,
) -> Result<(Vec<LoginHistory>, PageMeta), AppError> {
    let collection = db.collection::<LoginHistory>(database::LOGIN_HISTORY);
    let filter = doc! { "user_id": user_id };

    let total = collection.count_documents(filter.clone()).await?;
    let entries: Vec<LoginHistory> = collection
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .skip(page.skip())
        .limit(page.limit() as i64)
        .await?
        .try_collect()
        .await?;

    Ok((entries, page.meta(total)))
}

/// Case-insensitive search over name, email and phone.
pub fn user_filter(query: &UserListQuery) -> Document {
    let mut filter = Document::new();
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = regex::escape(search);
        filter.insert(
            "$or",
            vec![
                doc! { "name": { "$regex": &pattern, "$options": "i" } },
                doc! { "email": { "$regex": &pattern, "$options": "i" } },
                doc! { "phone": { "$regex": &pattern, "$options": "i" } },
            ],
        );
    }
    if let Some(role) = query.role {
        filter.insert("role", role.as_str());
    }
    filter
}

pub async fn list_users(
    db: &MongoDB,
    claims: &Claims,
    query: &UserListQuery,
) -> Result<(Vec<User>, PageMeta), AppError> {
    permission_service::authorize(db, claims, Resource::Users, Action::Read).await?;

    let page = PaginationQuery { page: query.page, limit: query.limit };
    let filter = user_filter(query);
    let collection = db.collection::<User>(database::USERS);

    let total = collection.count_documents(filter.clone()).await?;
    let users: Vec<User> = collection
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .skip(page.skip())
        .limit(page.limit() as i64)
        .await?
        .try_collect()
        .await?;

    Ok((users, page.meta(total)))
}

pub async fn staff_get_user(db: &MongoDB, claims: &Claims, id: ObjectId) -> Result<User, AppError> {
    permission_service::authorize(db, claims, Resource::Users, Action::Read).await?;
    get_user(db, id).await
}

/// Regras de papel: só admin concede admin, e ninguém mexe no próprio papel
pub fn check_role_change(actor: &Claims, target: &User, request: &AdminUpdateUserRequest) -> Result<(), AppError> {
    let is_self = target.id.map(|id| id.to_hex()) == Some(actor.sub.clone());

    if target.role == Role::Admin && !actor.is_admin() {
        return Err(AppError::Forbidden("Only admins can modify an admin account".to_string()));
    }
    if let Some(role) = request.role {
        if role == Role::Admin && !actor.is_admin() {
            return Err(AppError::Forbidden("Only admins can grant the admin role".to_string()));
        }
        if is_self && role != target.role {
            return Err(AppError::validation("role", "you cannot change your own role"));
        }
    }
    if is_self && request.is_active == Some(false) {
        return Err(AppError::validation("is_active", "you cannot deactivate your own account"));
    }
    Ok(())
}

pub async fn admin_update_user(
    db: &MongoDB,
    claims: &Claims,
    id: ObjectId,
    request: &AdminUpdateUserRequest,
) -> Result<User, AppError> {
    permission_service::authorize(db, claims, Resource::Users, Action::Write).await?;
    let target = get_user(db, id).await?;
    check_role_change(claims, &target, request)?;

    let mut set = doc! { "updated_at": now_millis() };
    if let Some(role) = request.role {
        set.insert("role", role.as_str());
    }
    if let Some(is_active) = request.is_active {
        set.insert("is_active", is_active);
    }

    let updated = db
        .collection::<User>(database::USERS)
        .find_one_and_update(doc! { "_id": id }, doc! { "$set": set })
        .return_document(mongodb::options::ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

    log::info!(
        "👤 {} updated {}: role={} active={}",
        claims.email,
        updated.email,
        updated.role,
        updated.is_active
    );
    Ok(updated)
}

pub async fn delete_user(db: &MongoDB, claims: &Claims, id: ObjectId) -> Result<(), AppError> {
    permission_service::authorize(db, claims, Resource::Users, Action::Delete).await?;
    if claims.sub == id.to_hex() {
        return Err(AppError::validation("id", "use account deletion to remove yourself"));
    }
    let target = get_user(db, id).await?;
    if target.role == Role::Admin && !claims.is_admin() {
        return Err(AppError::forbidden());
    }
    delete_account(db, id).await
}

pub async fn staff_login_history(
    db: &MongoDB,
    claims: &Claims,
    id: ObjectId,
    page: &PaginationQuery,
) -> Result<(Vec<LoginHistory>, PageMeta), AppError> {
    permission_service::authorize(db, claims, Resource::Users, Action::Read).await?;
    login_history(db, id, page).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth_service::TokenType;

    fn claims_for(user: &User) -> Claims {
        Claims {
            sub: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            phone: user.phone.clone(),
            token_type: TokenType::Access,
            iat: 0,
            exp: 0,
            jti: "test".into(),
            aud: "courier-api".into(),
            iss: "courier-service".into(),
        }
    }

    fn user(role: Role) -> User {
        let mut user = User::new("Grace", "grace@example.com", "+15550100300", "correct horse", role, 4).unwrap();
        user.id = Some(ObjectId::new());
        user
    }

    #[test]
    fn search_is_escaped_and_case_insensitive() {
        let filter = user_filter(&UserListQuery {
            page: None,
            limit: None,
            search: Some("a.b+".into()),
            role: Some(Role::Moderator),
        });
        let clauses = filter.get_array("$or").unwrap();
        assert_eq!(clauses.len(), 3);
        let name = clauses[0].as_document().unwrap().get_document("name").unwrap();
        assert_eq!(name.get_str("$regex").unwrap(), r"a\.b\+");
        assert_eq!(name.get_str("$options").unwrap(), "i");
        assert_eq!(filter.get_str("role").unwrap(), "moderator");
    }

    #[test]
    fn only_admins_grant_admin() {
        let moderator = claims_for(&user(Role::Moderator));
        let admin = claims_for(&user(Role::Admin));
        let target = user(Role::User);
        let promote = AdminUpdateUserRequest { role: Some(Role::Admin), is_active: None };

        assert!(matches!(
            check_role_change(&moderator, &target, &promote),
            Err(AppError::Forbidden(_))
        ));
        assert!(check_role_change(&admin, &target, &promote).is_ok());
    }

    #[test]
    fn moderators_cannot_touch_admins() {
        let moderator = claims_for(&user(Role::Moderator));
        let target = user(Role::Admin);
        let deactivate = AdminUpdateUserRequest { role: None, is_active: Some(false) };
        assert!(check_role_change(&moderator, &target, &deactivate).is_err());
    }

    #[test]
    fn no_self_demotion_or_lockout() {
        let admin_user = user(Role::Admin);
        let admin = claims_for(&admin_user);

        let demote = AdminUpdateUserRequest { role: Some(Role::User), is_active: None };
        assert!(check_role_change(&admin, &admin_user, &demote).is_err());

        let lockout = AdminUpdateUserRequest { role: None, is_active: Some(false) };
        assert!(check_role_change(&admin, &admin_user, &lockout).is_err());
    }
}
