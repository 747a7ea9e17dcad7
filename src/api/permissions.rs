use actix_web::{web, HttpResponse};
use mongodb::bson::oid::ObjectId;

use crate::api::response;
use crate::database::MongoDB;
use crate::middleware::auth::Claims;
use crate::models::UpsertPermissionRequest;
use crate::services::permission_service;
use crate::utils::AppError;

// Escopo /admin/permissions já exige Role::Admin no middleware

pub async fn list_permissions(db: web::Data<MongoDB>) -> Result<HttpResponse, AppError> {
    log::info!("🛡️ GET /admin/permissions");
    let permissions = permission_service::list_permissions(&db).await?;
    Ok(response::ok("Permissions", permissions))
}

pub async fn upsert_permission(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<UpsertPermissionRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!(
        "🛡️ PUT /admin/permissions - {} on {} by {}",
        request.role,
        request.resource.as_str(),
        claims.email
    );
    let permission = permission_service::upsert_permission(&db, &request).await?;
    Ok(response::ok("Permission saved", permission))
}

pub async fn delete_permission(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::warn!("🗑️ DELETE /admin/permissions/{} - by {}", id, claims.email);
    permission_service::delete_permission(&db, id).await?;
    Ok(response::message("Permission deleted"))
}
