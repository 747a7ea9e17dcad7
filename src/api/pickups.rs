use actix_web::{web, HttpResponse};
use mongodb::bson::oid::ObjectId;

use crate::api::response;
use crate::database::MongoDB;
use crate::middleware::auth::Claims;
use crate::models::{CreatePickupRequest, PickupListQuery, StaffUpdatePickupRequest};
use crate::services::notification_service::NotificationDispatcher;
use crate::services::pickup_service;
use crate::utils::AppError;

pub async fn create_pickup(
    db: web::Data<MongoDB>,
    dispatcher: web::Data<NotificationDispatcher>,
    claims: web::ReqData<Claims>,
    request: web::Json<CreatePickupRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("🚐 POST /pickups - {} on {}", claims.email, request.scheduled_date);
    let pickup = pickup_service::create_pickup(&db, &dispatcher, &claims, &request).await?;
    Ok(response::created("Pickup requested", pickup))
}

pub async fn list_pickups(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    query: web::Query<PickupListQuery>,
) -> Result<HttpResponse, AppError> {
    log::info!("📋 GET /pickups - {}", claims.email);
    let (pickups, meta) = pickup_service::list_pickups(&db, &claims, &query).await?;
    Ok(response::paginated("Pickups", pickups, meta))
}

pub async fn get_pickup(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("🚐 GET /pickups/{} - {}", id, claims.email);
    let pickup = pickup_service::get_pickup(&db, &claims, id).await?;
    Ok(response::ok("Pickup", pickup))
}

pub async fn cancel_pickup(
    db: web::Data<MongoDB>,
    dispatcher: web::Data<NotificationDispatcher>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("🚫 POST /pickups/{}/cancel - {}", id, claims.email);
    let pickup = pickup_service::cancel_pickup(&db, &dispatcher, &claims, id).await?;
    Ok(response::ok("Pickup cancelled", pickup))
}

pub async fn update_pickup(
    db: web::Data<MongoDB>,
    dispatcher: web::Data<NotificationDispatcher>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<StaffUpdatePickupRequest>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("🛠️ PUT /admin/pickups/{} - by {}", id, claims.email);
    let pickup = pickup_service::staff_update(&db, &dispatcher, &claims, id, &request).await?;
    Ok(response::ok("Pickup updated", pickup))
}
