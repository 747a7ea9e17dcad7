use actix_web::{web, HttpResponse};
use mongodb::bson::oid::ObjectId;

use crate::api::response;
use crate::database::MongoDB;
use crate::middleware::auth::Claims;
use crate::models::AddressRequest;
use crate::services::address_service;
use crate::utils::AppError;

pub async fn list_addresses(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> Result<HttpResponse, AppError> {
    log::info!("📍 GET /addresses - {}", claims.email);
    let addresses = address_service::list_addresses(&db, claims.user_id()?).await?;
    Ok(response::ok("Addresses", addresses))
}

pub async fn get_address(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("📍 GET /addresses/{} - {}", id, claims.email);
    let address = address_service::find_owned(&db, claims.user_id()?, id).await?;
    Ok(response::ok("Address", address))
}

pub async fn create_address(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<AddressRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("📍 POST /addresses - {}", claims.email);
    let address = address_service::create_address(&db, claims.user_id()?, &request).await?;
    Ok(response::created("Address created", address))
}

pub async fn update_address(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<AddressRequest>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("📍 PUT /addresses/{} - {}", id, claims.email);
    let address = address_service::update_address(&db, claims.user_id()?, id, &request).await?;
    Ok(response::ok("Address updated", address))
}

pub async fn set_default(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("📍 PUT /addresses/{}/default - {}", id, claims.email);
    let address = address_service::set_default(&db, claims.user_id()?, id).await?;
    Ok(response::ok("Default address updated", address))
}

pub async fn delete_address(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("🗑️ DELETE /addresses/{} - {}", id, claims.email);
    address_service::delete_address(&db, claims.user_id()?, id).await?;
    Ok(response::message("Address deleted"))
}
