use actix_web::{web, HttpResponse};

use crate::api::response;
use crate::database::MongoDB;
use crate::middleware::auth::Claims;
use crate::models::{ApiConfigRequest, ApiConfigView, UpdateApiConfigRequest};
use crate::services::api_config_service;
use crate::utils::AppError;

pub async fn get_config(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> Result<HttpResponse, AppError> {
    log::info!("🔑 GET /api-config - {}", claims.email);
    let config = api_config_service::get_config(&db, claims.user_id()?).await?;
    Ok(response::ok("API config", ApiConfigView::masked(config)))
}

/// Creates the key, or replaces it when one already exists
pub async fn generate_key(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: Option<web::Json<ApiConfigRequest>>,
) -> Result<HttpResponse, AppError> {
    log::info!("🔑 POST /api-config - {}", claims.email);
    let request = request.map(web::Json::into_inner).unwrap_or_default();
    let config = api_config_service::create_or_regenerate(&db, claims.user_id()?, &request).await?;
    Ok(response::created("API key generated", ApiConfigView::revealed(config)))
}

pub async fn update_config(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<UpdateApiConfigRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("🔑 PUT /api-config - {}", claims.email);
    let config = api_config_service::update_config(&db, claims.user_id()?, &request).await?;
    Ok(response::ok("API config updated", ApiConfigView::masked(config)))
}

pub async fn delete_config(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> Result<HttpResponse, AppError> {
    log::info!("🗑️ DELETE /api-config - {}", claims.email);
    api_config_service::delete_config(&db, claims.user_id()?).await?;
    Ok(response::message("API config deleted"))
}
