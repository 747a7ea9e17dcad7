use actix_web::{web, HttpResponse};

use crate::api::response;
use crate::database::MongoDB;
use crate::middleware::auth::Claims;
use crate::models::{Action, CountryRequest, Resource, UpdateCountryRequest};
use crate::services::{country_service, permission_service};
use crate::utils::AppError;

#[utoipa::path(
    get,
    path = "/api/v1/countries",
    tag = "Countries",
    responses((status = 200, description = "Active shipping destinations"))
)]
pub async fn list_countries(db: web::Data<MongoDB>) -> Result<HttpResponse, AppError> {
    log::info!("🌍 GET /countries");
    let countries = country_service::list_countries(&db, false).await?;
    Ok(response::ok("Countries", countries))
}

pub async fn list_all(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> Result<HttpResponse, AppError> {
    permission_service::authorize(&db, &claims, Resource::Countries, Action::Read).await?;
    log::info!("🌍 GET /admin/countries - by {}", claims.email);
    let countries = country_service::list_countries(&db, true).await?;
    Ok(response::ok("Countries", countries))
}

pub async fn create_country(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<CountryRequest>,
) -> Result<HttpResponse, AppError> {
    permission_service::authorize(&db, &claims, Resource::Countries, Action::Write).await?;
    log::info!("🌍 POST /admin/countries - {} by {}", request.code, claims.email);
    let country = country_service::create_country(&db, &request).await?;
    Ok(response::created("Country created", country))
}

pub async fn update_country(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<UpdateCountryRequest>,
) -> Result<HttpResponse, AppError> {
    permission_service::authorize(&db, &claims, Resource::Countries, Action::Write).await?;
    log::info!("🌍 PUT /admin/countries/{} - by {}", path.as_str(), claims.email);
    let country = country_service::update_country(&db, &path, &request).await?;
    Ok(response::ok("Country updated", country))
}

pub async fn delete_country(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    permission_service::authorize(&db, &claims, Resource::Countries, Action::Delete).await?;
    log::warn!("🗑️ DELETE /admin/countries/{} - by {}", path.as_str(), claims.email);
    country_service::delete_country(&db, &path).await?;
    Ok(response::message("Country deleted"))
}
