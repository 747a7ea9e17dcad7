use actix_web::{web, HttpResponse};
use mongodb::bson::oid::ObjectId;
use serde_json::json;

use crate::api::response;
use crate::database::MongoDB;
use crate::middleware::auth::Claims;
use crate::models::{Action, BroadcastRequest, NotificationListQuery, Resource};
use crate::services::{notification_service, permission_service};
use crate::utils::AppError;

pub async fn list_notifications(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    query: web::Query<NotificationListQuery>,
) -> Result<HttpResponse, AppError> {
    log::info!("📬 GET /notifications - {}", claims.email);
    let (notifications, meta) = notification_service::list_notifications(&db, claims.user_id()?, &query).await?;
    Ok(response::paginated("Notifications", notifications, meta))
}

pub async fn unread_count(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> Result<HttpResponse, AppError> {
    log::info!("📬 GET /notifications/unread-count - {}", claims.email);
    let count = notification_service::unread_count(&db, claims.user_id()?).await?;
    Ok(response::ok("Unread notifications", json!({ "unread": count })))
}

pub async fn mark_read(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("📬 PUT /notifications/{}/read - {}", id, claims.email);
    notification_service::mark_read(&db, claims.user_id()?, id).await?;
    Ok(response::message("Notification marked as read"))
}

pub async fn mark_all_read(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> Result<HttpResponse, AppError> {
    log::info!("📬 PUT /notifications/read-all - {}", claims.email);
    let updated = notification_service::mark_all_read(&db, claims.user_id()?).await?;
    Ok(response::ok("Notifications marked as read", json!({ "updated": updated })))
}

pub async fn delete_notification(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("🗑️ DELETE /notifications/{} - {}", id, claims.email);
    notification_service::delete_notification(&db, claims.user_id()?, id).await?;
    Ok(response::message("Notification deleted"))
}

pub async fn broadcast(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<BroadcastRequest>,
) -> Result<HttpResponse, AppError> {
    permission_service::authorize(&db, &claims, Resource::Notifications, Action::Write).await?;
    log::info!("📣 POST /admin/notifications/broadcast - by {} (role: {:?})", claims.email, request.role);

    let sent = notification_service::broadcast(&db, &request).await?;
    log::info!("✅ Broadcast delivered to {} users", sent);
    Ok(response::ok("Broadcast sent", json!({ "recipients": sent })))
}
