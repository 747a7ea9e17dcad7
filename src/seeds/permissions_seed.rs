use crate::database::{self, MongoDB};
use crate::models::{Permission, Role, UpsertPermissionRequest};
use crate::services::permission_service;
use mongodb::bson::doc;

/// Grants padrão de moderador. Só cria o grant de um recurso se ainda não existir,
/// então ajustes feitos por um admin sobrevivem ao restart.
pub async fn seed_moderator_grants(db: &MongoDB) {
    let collection = db.collection::<Permission>(database::PERMISSIONS);
    let mut inserted = 0;

    for (resource, actions) in permission_service::default_moderator_grants() {
        let filter = doc! { "role": Role::Moderator.as_str(), "resource": resource.as_str() };
        if collection.count_documents(filter).await.unwrap_or(0) > 0 {
            continue;
        }

        let request = UpsertPermissionRequest {
            role: Role::Moderator,
            resource,
            actions,
        };
        match permission_service::upsert_permission(db, &request).await {
            Ok(_) => inserted += 1,
            Err(e) => log::error!("   ❌ Failed to seed grant on {}: {}", resource.as_str(), e),
        }
    }

    log::info!("🛡️ Permissions: {} moderator grants seeded", inserted);
}
