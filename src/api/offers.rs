use actix_web::{web, HttpResponse};
use mongodb::bson::oid::ObjectId;

use crate::api::response;
use crate::database::MongoDB;
use crate::middleware::auth::Claims;
use crate::models::{now_millis, Action, CreateOfferRequest, Resource, UpdateOfferRequest, ValidateOfferQuery};
use crate::services::{offer_service, permission_service};
use crate::utils::AppError;

/// Offers currently redeemable (public)
#[utoipa::path(
    get,
    path = "/api/v1/offers",
    tag = "Offers",
    responses((status = 200, description = "Active offers with usage left"))
)]
pub async fn list_current(db: web::Data<MongoDB>) -> Result<HttpResponse, AppError> {
    log::info!("🏷️ GET /offers");
    let offers = offer_service::list_current(&db).await?;
    Ok(response::ok("Offers", offers))
}

/// Checks a code against an amount and optional destination without redeeming it
pub async fn validate_offer(
    db: web::Data<MongoDB>,
    path: web::Path<String>,
    query: web::Query<ValidateOfferQuery>,
) -> Result<HttpResponse, AppError> {
    log::info!("🏷️ GET /offers/{}/validate - amount {}", path.as_str(), query.amount);
    let amount = offer_service::check_amount(query.amount)?;
    let offer = offer_service::find_by_code(&db, &path).await?;
    let quote = offer_service::quote_offer(&offer, amount, query.destination.as_deref(), now_millis())?;
    Ok(response::ok("Offer is valid", quote))
}

// ==================== ADMIN ====================

pub async fn list_all(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> Result<HttpResponse, AppError> {
    permission_service::authorize(&db, &claims, Resource::Offers, Action::Read).await?;
    log::info!("🏷️ GET /admin/offers - by {}", claims.email);
    let offers = offer_service::list_all(&db).await?;
    Ok(response::ok("Offers", offers))
}

pub async fn create_offer(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<CreateOfferRequest>,
) -> Result<HttpResponse, AppError> {
    permission_service::authorize(&db, &claims, Resource::Offers, Action::Write).await?;
    log::info!("🏷️ POST /admin/offers - {} by {}", request.code, claims.email);
    let offer = offer_service::create_offer(&db, &request).await?;
    Ok(response::created("Offer created", offer))
}

pub async fn update_offer(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<UpdateOfferRequest>,
) -> Result<HttpResponse, AppError> {
    permission_service::authorize(&db, &claims, Resource::Offers, Action::Write).await?;
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("🏷️ PUT /admin/offers/{} - by {}", id, claims.email);
    let offer = offer_service::update_offer(&db, id, &request).await?;
    Ok(response::ok("Offer updated", offer))
}

pub async fn delete_offer(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    permission_service::authorize(&db, &claims, Resource::Offers, Action::Delete).await?;
    let id = ObjectId::parse_str(path.as_str())?;
    log::warn!("🗑️ DELETE /admin/offers/{} - by {}", id, claims.email);
    offer_service::delete_offer(&db, id).await?;
    Ok(response::message("Offer deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::{call_service, init_service, read_body_json, TestRequest};
    use actix_web::App;

    #[actix_rt::test]
    async fn validate_rejects_non_finite_amounts_before_lookup() {
        let db = MongoDB::unconnected("mongodb://127.0.0.1:1/courier_test").await;
        let app = init_service(
            App::new()
                .app_data(web::Data::new(db))
                .route("/offers/{code}/validate", web::get().to(validate_offer)),
        )
        .await;

        for amount in ["NaN", "inf", "-10"] {
            let req = TestRequest::get()
                .uri(&format!("/offers/WELCOME10/validate?amount={}", amount))
                .to_request();
            let res = call_service(&app, req).await;
            assert_eq!(res.status(), 422, "amount {}", amount);

            let body: serde_json::Value = read_body_json(res).await;
            assert_eq!(body["status"], "error");
            assert_eq!(body["data"]["errors"][0]["field"], "amount");
        }
    }
}
