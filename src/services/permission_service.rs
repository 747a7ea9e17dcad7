use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};

use crate::database::{self, MongoDB};
use crate::models::{now_millis, Action, Permission, Resource, Role, UpsertPermissionRequest};
use crate::services::auth_service::Claims;
use crate::utils::AppError;

/// Decide se um papel pode executar a ação, dado o conjunto de grants do papel
pub fn is_allowed(role: Role, grants: &[Permission], resource: Resource, action: Action) -> bool {
    match role {
        Role::Admin => true,
        Role::User => false,
        Role::Moderator => grants
            .iter()
            .any(|grant| grant.role == Role::Moderator && grant.allows(resource, action)),
    }
}

pub async fn grants_for_role(db: &MongoDB, role: Role) -> Result<Vec<Permission>, AppError> {
    Ok(db
        .collection::<Permission>(database::PERMISSIONS)
        .find(doc! { "role": role.as_str() })
        .await?
        .try_collect()
        .await?)
}

/// Staff gate for a resource action; 403 when not granted.
pub async fn authorize(
    db: &MongoDB,
    claims: &Claims,
    resource: Resource,
    action: Action,
) -> Result<(), AppError> {
    let grants = match claims.role {
        Role::Moderator => grants_for_role(db, Role::Moderator).await?,
        _ => Vec::new(),
    };

    if is_allowed(claims.role, &grants, resource, action) {
        Ok(())
    } else {
        log::warn!(
            "🚫 {} ({}) denied {} on {}",
            claims.sub,
            claims.role,
            action.as_str(),
            resource.as_str()
        );
        Err(AppError::forbidden())
    }
}

pub async fn list_permissions(db: &MongoDB) -> Result<Vec<Permission>, AppError> {
    Ok(db
        .collection::<Permission>(database::PERMISSIONS)
        .find(doc! {})
        .sort(doc! { "role": 1, "resource": 1 })
        .await?
        .try_collect()
        .await?)
}

pub fn validate_grant(request: &UpsertPermissionRequest) -> Result<(), AppError> {
    if request.role != Role::Moderator {
        return Err(AppError::validation(
            "role",
            "only moderator grants are configurable",
        ));
    }
    if request.actions.is_empty() {
        return Err(AppError::validation("actions", "at least one action is required"));
    }
    Ok(())
}

pub async fn upsert_permission(
    db: &MongoDB,
    request: &UpsertPermissionRequest,
) -> Result<Permission, AppError> {
    validate_grant(request)?;

    let mut actions = request.actions.clone();
    actions.sort_by_key(|action| action.as_str());
    actions.dedup();

    let now = now_millis();
    let action_names: Vec<&str> = actions.iter().map(|action| action.as_str()).collect();

    let updated = db
        .collection::<Permission>(database::PERMISSIONS)
        .find_one_and_update(
            doc! { "role": request.role.as_str(), "resource": request.resource.as_str() },
            doc! {
                "$set": { "actions": action_names, "updated_at": now },
                "$setOnInsert": { "created_at": now },
            },
        )
        .upsert(true)
        .return_document(mongodb::options::ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::Internal("Upsert returned no document".to_string()))?;

    log::info!(
        "🔑 Grant {} on {}: {:?}",
        request.role,
        request.resource.as_str(),
        updated.actions
    );
    Ok(updated)
}

pub async fn delete_permission(db: &MongoDB, id: ObjectId) -> Result<(), AppError> {
    let result = db
        .collection::<Permission>(database::PERMISSIONS)
        .delete_one(doc! { "_id": id })
        .await?;

    if result.deleted_count == 0 {
        return Err(AppError::NotFound("Permission".to_string()));
    }
    Ok(())
}

/// Grants seeded on first start.
pub fn default_moderator_grants() -> Vec<(Resource, Vec<Action>)> {
    vec![
        (Resource::Orders, vec![Action::Read, Action::Write]),
        (Resource::Pickups, vec![Action::Read, Action::Write]),
        (Resource::Tracks, vec![Action::Read, Action::Write]),
        (Resource::Users, vec![Action::Read]),
        (Resource::Analytics, vec![Action::Read]),
        (Resource::Offers, vec![Action::Read]),
        (Resource::Countries, vec![Action::Read]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(role: Role, resource: Resource, actions: Vec<Action>) -> Permission {
        Permission {
            id: None,
            role,
            resource,
            actions,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn admin_is_allowed_everything() {
        assert!(is_allowed(Role::Admin, &[], Resource::Permissions, Action::Delete));
    }

    #[test]
    fn users_never_get_staff_access() {
        let grants = vec![grant(Role::User, Resource::Orders, vec![Action::Read])];
        assert!(!is_allowed(Role::User, &grants, Resource::Orders, Action::Read));
    }

    #[test]
    fn moderator_needs_a_matching_grant() {
        let grants = vec![
            grant(Role::Moderator, Resource::Orders, vec![Action::Read, Action::Write]),
            grant(Role::Moderator, Resource::Analytics, vec![Action::Read]),
        ];

        assert!(is_allowed(Role::Moderator, &grants, Resource::Orders, Action::Write));
        assert!(is_allowed(Role::Moderator, &grants, Resource::Analytics, Action::Read));
        assert!(!is_allowed(Role::Moderator, &grants, Resource::Orders, Action::Delete));
        assert!(!is_allowed(Role::Moderator, &grants, Resource::Offers, Action::Read));
    }

    #[test]
    fn only_moderator_grants_are_editable() {
        let admin_grant = UpsertPermissionRequest {
            role: Role::Admin,
            resource: Resource::Orders,
            actions: vec![Action::Read],
        };
        assert!(matches!(validate_grant(&admin_grant), Err(AppError::Validation(_))));

        let empty = UpsertPermissionRequest {
            role: Role::Moderator,
            resource: Resource::Orders,
            actions: vec![],
        };
        assert!(validate_grant(&empty).is_err());
    }

    #[test]
    fn default_grants_leave_destructive_actions_to_admins() {
        for (resource, actions) in default_moderator_grants() {
            assert!(!actions.contains(&Action::Delete), "{:?}", resource);
        }
    }
}
