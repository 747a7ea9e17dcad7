use actix_web::{web, HttpResponse};
use mongodb::bson::oid::ObjectId;

use crate::api::response;
use crate::database::MongoDB;
use crate::middleware::auth::Claims;
use crate::models::{AdminUpdateUserRequest, UpdateProfileRequest, UserInfo, UserListQuery};
use crate::services::user_service;
use crate::utils::pagination::PaginationQuery;
use crate::utils::AppError;

// ==================== SELF ====================

pub async fn get_profile(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> Result<HttpResponse, AppError> {
    log::info!("👤 GET /users/me - {}", claims.email);
    let user = user_service::get_user(&db, claims.user_id()?).await?;
    Ok(response::ok("Profile", UserInfo::from(user)))
}

pub async fn update_profile(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<UpdateProfileRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("✏️ PUT /users/me - {}", claims.email);
    let user = user_service::update_profile(&db, claims.user_id()?, &request).await?;
    Ok(response::ok("Profile updated", UserInfo::from(user)))
}

pub async fn delete_account(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> Result<HttpResponse, AppError> {
    log::warn!("🗑️ DELETE /users/me - {}", claims.email);
    user_service::delete_account(&db, claims.user_id()?).await?;
    Ok(response::message("Account deleted"))
}

pub async fn login_history(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    query: web::Query<PaginationQuery>,
) -> Result<HttpResponse, AppError> {
    log::info!("📜 GET /users/me/login-history - {}", claims.email);
    let (entries, meta) = user_service::login_history(&db, claims.user_id()?, &query).await?;
    Ok(response::paginated("Login history", entries, meta))
}

// ==================== STAFF ====================

pub async fn list_users(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    query: web::Query<UserListQuery>,
) -> Result<HttpResponse, AppError> {
    log::info!("👥 GET /admin/users - by {}", claims.email);
    let (users, meta) = user_service::list_users(&db, &claims, &query).await?;
    let users: Vec<UserInfo> = users.into_iter().map(UserInfo::from).collect();
    Ok(response::paginated("Users", users, meta))
}

pub async fn get_user(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("👤 GET /admin/users/{} - by {}", id, claims.email);
    let user = user_service::staff_get_user(&db, &claims, id).await?;
    Ok(response::ok("User", UserInfo::from(user)))
}

pub async fn update_user(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<AdminUpdateUserRequest>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("🛠️ PUT /admin/users/{} - by {}", id, claims.email);
    let user = user_service::admin_update_user(&db, &claims, id, &request).await?;
    Ok(response::ok("User updated", UserInfo::from(user)))
}

pub async fn delete_user(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::warn!("🗑️ DELETE /admin/users/{} - by {}", id, claims.email);
    user_service::delete_user(&db, &claims, id).await?;
    Ok(response::message("User deleted"))
}

pub async fn user_login_history(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    query: web::Query<PaginationQuery>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("📜 GET /admin/users/{}/login-history - by {}", id, claims.email);
    let (entries, meta) = user_service::staff_login_history(&db, &claims, id, &query).await?;
    Ok(response::paginated("Login history", entries, meta))
}
