use actix_web::{web, HttpResponse};
use mongodb::bson::oid::ObjectId;

use crate::api::response;
use crate::database::MongoDB;
use crate::middleware::auth::Claims;
use crate::models::{
    AddTrackRequest, CreateOrderRequest, OrderListQuery, Pricing, QuoteRequest, UpdateOrderStatusRequest,
};
use crate::services::notification_service::NotificationDispatcher;
use crate::services::order_service;
use crate::utils::AppError;

/// Price a shipment without creating it
#[utoipa::path(
    post,
    path = "/api/v1/quote",
    tag = "Orders",
    request_body = QuoteRequest,
    responses(
        (status = 200, description = "Price breakdown", body = Pricing),
        (status = 404, description = "Unknown or inactive country"),
        (status = 422, description = "Invalid weight or offer")
    )
)]
pub async fn quote(db: web::Data<MongoDB>, request: web::Json<QuoteRequest>) -> Result<HttpResponse, AppError> {
    log::info!(
        "💲 POST /quote - {} → {} {}kg",
        request.origin_country,
        request.destination_country,
        request.weight_kg
    );
    let pricing = order_service::quote(&db, &request).await?;
    Ok(response::ok("Quote", pricing))
}

pub async fn create_order(
    db: web::Data<MongoDB>,
    dispatcher: web::Data<NotificationDispatcher>,
    claims: web::ReqData<Claims>,
    request: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("📦 POST /orders - {}", claims.email);
    let order = order_service::create_order(&db, &dispatcher, &claims, &request).await?;
    log::info!("✅ Order {} created", order.tracking_number);
    Ok(response::created("Order created", order))
}

pub async fn list_orders(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    query: web::Query<OrderListQuery>,
) -> Result<HttpResponse, AppError> {
    log::info!("📋 GET /orders - {}", claims.email);
    let (orders, meta) = order_service::list_orders(&db, &claims, &query).await?;
    Ok(response::paginated("Orders", orders, meta))
}

pub async fn get_order(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("📦 GET /orders/{} - {}", id, claims.email);
    let order = order_service::get_order(&db, &claims, id).await?;
    Ok(response::ok("Order", order))
}

pub async fn orders_by_phone(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    log::info!("📱 GET /orders/by-phone - {}", claims.email);
    let orders = order_service::orders_by_phone(&db, &claims, &path).await?;
    Ok(response::ok("Orders", orders))
}

pub async fn cancel_order(
    db: web::Data<MongoDB>,
    dispatcher: web::Data<NotificationDispatcher>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("🚫 POST /orders/{}/cancel - {}", id, claims.email);
    let order = order_service::cancel_order(&db, &dispatcher, &claims, id).await?;
    Ok(response::ok("Order cancelled", order))
}

pub async fn update_status(
    db: web::Data<MongoDB>,
    dispatcher: web::Data<NotificationDispatcher>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<UpdateOrderStatusRequest>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("🚚 PUT /admin/orders/{}/status → {} - by {}", id, request.status, claims.email);
    let order = order_service::update_status(&db, &dispatcher, &claims, id, &request).await?;
    Ok(response::ok("Order status updated", order))
}

pub async fn delete_order(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::warn!("🗑️ DELETE /admin/orders/{} - by {}", id, claims.email);
    order_service::delete_order(&db, &claims, id).await?;
    Ok(response::message("Order deleted"))
}

// ==================== TRACKING ====================

#[utoipa::path(
    get,
    path = "/api/v1/track/{tracking_number}",
    tag = "Tracking",
    params(("tracking_number" = String, Path, description = "e.g. CR2410159K3ZQ8WX")),
    responses(
        (status = 200, description = "Shipment status and events, oldest first"),
        (status = 404, description = "Unknown tracking number")
    )
)]
pub async fn track(db: web::Data<MongoDB>, path: web::Path<String>) -> Result<HttpResponse, AppError> {
    log::info!("🔎 GET /track/{}", path.as_str());
    let info = order_service::tracking_info(&db, &path).await?;
    Ok(response::ok("Tracking information", info))
}

pub async fn add_track(
    db: web::Data<MongoDB>,
    dispatcher: web::Data<NotificationDispatcher>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<AddTrackRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("📍 POST /admin/track/{}/events → {} - by {}", path.as_str(), request.status, claims.email);
    let order = order_service::add_track(&db, &dispatcher, &claims, &path, &request).await?;
    Ok(response::created("Tracking event added", order))
}
