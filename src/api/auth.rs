use actix_web::{web, HttpRequest, HttpResponse};

use crate::api::response;
use crate::config::AppConfig;
use crate::database::MongoDB;
use crate::middleware::auth::Claims;
use crate::models::UserInfo;
use crate::services::auth_service::{
    self, AuthResponse, ChangePasswordRequest, ClientInfo, LoginRequest, RefreshTokenRequest, RegisterRequest,
};
use crate::services::notification_service::NotificationDispatcher;
use crate::services::user_service;
use crate::utils::AppError;

fn client_info(req: &HttpRequest) -> ClientInfo {
    ClientInfo {
        ip: req.connection_info().realip_remote_addr().map(String::from),
        user_agent: req
            .headers()
            .get(actix_web::http::header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(String::from),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account is inactive"),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn login(
    req: HttpRequest,
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    request: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("🔐 POST /auth/login - identifier: {}", request.identifier);

    match auth_service::login(&db, &config.jwt, &client_info(&req), &request).await {
        Ok(response) => {
            log::info!("✅ Login successful: {}", response.user.email);
            Ok(response::ok("Login successful", response))
        }
        Err(e) => {
            log::warn!("❌ Login failed: {} - {}", request.identifier, e);
            Err(e)
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration successful", body = AuthResponse),
        (status = 409, description = "Email or phone already registered"),
        (status = 422, description = "Invalid fields")
    )
)]
pub async fn register(
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    dispatcher: web::Data<NotificationDispatcher>,
    request: web::Json<RegisterRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("📝 POST /auth/register - email: {}", request.email);

    let response = auth_service::register(&db, &config.jwt, config.bcrypt_cost, &dispatcher, &request)
        .await
        .map_err(|e| {
            log::warn!("❌ Registration failed: {} - {}", request.email, e);
            e
        })?;
    Ok(response::created("Registration successful", response))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "Auth",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "New token pair", body = AuthResponse),
        (status = 401, description = "Invalid refresh token")
    )
)]
pub async fn refresh_token(
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    request: web::Json<RefreshTokenRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("🔄 POST /auth/refresh");
    let response = auth_service::refresh_token(&db, &config.jwt, &request).await?;
    Ok(response::ok("Token refreshed", response))
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/verify",
    tag = "Auth",
    responses(
        (status = 200, description = "Token is valid"),
        (status = 401, description = "Invalid or expired token")
    ),
    security(("bearer_auth" = []))
)]
pub async fn verify_token(claims: web::ReqData<Claims>) -> Result<HttpResponse, AppError> {
    log::info!("✓ GET /auth/verify - {}", claims.sub);
    Ok(response::ok(
        "Token is valid",
        serde_json::json!({
            "valid": true,
            "user_id": claims.sub,
            "email": claims.email,
            "role": claims.role,
            "exp": claims.exp,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Current user", body = UserInfo),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_me(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> Result<HttpResponse, AppError> {
    log::info!("👤 GET /auth/me - {}", claims.email);
    let user = user_service::get_user(&db, claims.user_id()?).await?;
    Ok(response::ok("Current user", UserInfo::from(user)))
}

pub async fn change_password(
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    claims: web::ReqData<Claims>,
    request: web::Json<ChangePasswordRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("🔑 PUT /auth/change-password - {}", claims.email);
    auth_service::change_password(&db, config.bcrypt_cost, claims.user_id()?, &request).await?;
    Ok(response::message("Password changed"))
}
