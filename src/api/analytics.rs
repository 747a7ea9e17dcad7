use actix_web::{web, HttpResponse};

use crate::api::response;
use crate::database::MongoDB;
use crate::middleware::auth::Claims;
use crate::services::analytics_service::{self, AnalyticsQuery};
use crate::utils::AppError;

pub async fn overview(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    query: web::Query<AnalyticsQuery>,
) -> Result<HttpResponse, AppError> {
    log::info!("📊 GET /admin/analytics/overview - by {}", claims.email);
    let data = analytics_service::overview(&db, &claims, &query).await?;
    Ok(response::ok("Overview", data))
}

pub async fn revenue(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    query: web::Query<AnalyticsQuery>,
) -> Result<HttpResponse, AppError> {
    log::info!("📊 GET /admin/analytics/revenue ({:?}) - by {}", query.granularity(), claims.email);
    let data = analytics_service::revenue(&db, &claims, &query).await?;
    Ok(response::ok("Revenue", data))
}

pub async fn orders(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    query: web::Query<AnalyticsQuery>,
) -> Result<HttpResponse, AppError> {
    log::info!("📊 GET /admin/analytics/orders - by {}", claims.email);
    let data = analytics_service::orders(&db, &claims, &query).await?;
    Ok(response::ok("Order analytics", data))
}

pub async fn countries(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    query: web::Query<AnalyticsQuery>,
) -> Result<HttpResponse, AppError> {
    log::info!("📊 GET /admin/analytics/countries - by {}", claims.email);
    let data = analytics_service::countries(&db, &claims, &query).await?;
    Ok(response::ok("Top destinations", data))
}

pub async fn offers(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    query: web::Query<AnalyticsQuery>,
) -> Result<HttpResponse, AppError> {
    log::info!("📊 GET /admin/analytics/offers - by {}", claims.email);
    let data = analytics_service::offers(&db, &claims, &query).await?;
    Ok(response::ok("Offer performance", data))
}

pub async fn users(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    query: web::Query<AnalyticsQuery>,
) -> Result<HttpResponse, AppError> {
    log::info!("📊 GET /admin/analytics/users - by {}", claims.email);
    let data = analytics_service::users(&db, &claims, &query).await?;
    Ok(response::ok("User analytics", data))
}
