use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::Method,
    web, Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;

use crate::config::AppConfig;
use crate::database::MongoDB;
use crate::services::api_config_service;
use crate::services::auth_service::{self, TokenType};
use crate::utils::AppError;

pub use crate::services::auth_service::Claims;

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Credenciais extraídas do request
#[derive(Debug, PartialEq)]
enum Credentials {
    Bearer(String),
    ApiKey(String),
}

fn credentials(req: &ServiceRequest) -> Result<Credentials, AppError> {
    if let Some(header) = req.headers().get(actix_web::http::header::AUTHORIZATION) {
        let value = header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid authorization header".to_string()))?;
        return match value.strip_prefix("Bearer ") {
            Some(token) if !token.trim().is_empty() => Ok(Credentials::Bearer(token.trim().to_string())),
            _ => Err(AppError::Unauthorized("Invalid token format".to_string())),
        };
    }

    if let Some(header) = req.headers().get(API_KEY_HEADER) {
        let key = header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid API key".to_string()))?;
        return Ok(Credentials::ApiKey(key.trim().to_string()));
    }

    Err(AppError::Unauthorized("Missing authorization token".to_string()))
}

/// Accepts a Bearer access token or an `X-API-Key`, and puts the caller's
/// `Claims` into the request extensions.
pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            // Preflight do CORS passa direto
            if req.method() == Method::OPTIONS {
                return service.call(req).await;
            }

            let config = req
                .app_data::<web::Data<AppConfig>>()
                .cloned()
                .ok_or_else(|| AppError::Internal("AppConfig not registered".to_string()))?;

            let claims = match credentials(&req)? {
                Credentials::Bearer(token) => auth_service::verify_access_token(&token, &config.jwt)?,
                Credentials::ApiKey(key) => {
                    let db = req
                        .app_data::<web::Data<MongoDB>>()
                        .cloned()
                        .ok_or_else(|| AppError::Internal("MongoDB not registered".to_string()))?;
                    let user = api_config_service::authenticate_key(&db, &key).await?;
                    log::debug!("🔑 API key request from {}", user.email);
                    auth_service::build_claims(&user, TokenType::Access, &config.jwt)
                }
            };

            req.extensions_mut().insert(claims);
            service.call(req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::models::{Role, User};
    use actix_web::test::{call_service, init_service, read_body, try_call_service, TestRequest};
    use actix_web::{App, HttpResponse};
    use mongodb::bson::oid::ObjectId;

    fn test_config() -> AppConfig {
        AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            database_url: "mongodb://localhost:27017/courier_test".into(),
            cors_origins: vec![],
            bcrypt_cost: 4,
            jwt: JwtConfig::default(),
            rate_limit: Default::default(),
            notifications: Default::default(),
            seed_admin: None,
        }
    }

    fn token(token_type: TokenType) -> String {
        let mut user = User::new("Ada", "ada@example.com", "+15550100200", "correct horse", Role::User, 4).unwrap();
        user.id = Some(ObjectId::new());
        auth_service::generate_token(&user, token_type, &JwtConfig::default()).unwrap()
    }

    async fn whoami(claims: web::ReqData<Claims>) -> HttpResponse {
        HttpResponse::Ok().body(claims.email.clone())
    }

    #[actix_rt::test]
    async fn bearer_token_reaches_handler() {
        let app = init_service(
            App::new()
                .app_data(web::Data::new(test_config()))
                .service(web::scope("/p").wrap(AuthMiddleware).route("/me", web::get().to(whoami))),
        )
        .await;

        let req = TestRequest::get()
            .uri("/p/me")
            .insert_header(("Authorization", format!("Bearer {}", token(TokenType::Access))))
            .to_request();
        let res = call_service(&app, req).await;
        assert_eq!(res.status(), 200);
        assert_eq!(read_body(res).await, "ada@example.com");
    }

    #[actix_rt::test]
    async fn missing_or_bad_credentials_are_401() {
        let app = init_service(
            App::new()
                .app_data(web::Data::new(test_config()))
                .service(web::scope("/p").wrap(AuthMiddleware).route("/me", web::get().to(whoami))),
        )
        .await;

        let cases = vec![
            None,
            Some("Basic dXNlcjpwYXNz".to_string()),
            Some("Bearer not-a-jwt".to_string()),
            Some(format!("Bearer {}", token(TokenType::Refresh))),
        ];
        for header in cases {
            let mut req = TestRequest::get().uri("/p/me");
            if let Some(value) = &header {
                req = req.insert_header(("Authorization", value.clone()));
            }
            let res = try_call_service(&app, req.to_request()).await;
            let status = match res {
                Ok(res) => res.status(),
                Err(e) => e.as_response_error().status_code(),
            };
            assert_eq!(status, 401, "header {:?}", header);
        }
    }

    #[test]
    fn bearer_wins_over_api_key() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer abc"))
            .insert_header((API_KEY_HEADER, "ck_xyz"))
            .to_srv_request();
        assert_eq!(credentials(&req).unwrap(), Credentials::Bearer("abc".into()));

        let req = TestRequest::default()
            .insert_header((API_KEY_HEADER, " ck_xyz "))
            .to_srv_request();
        assert_eq!(credentials(&req).unwrap(), Credentials::ApiKey("ck_xyz".into()));
    }
}
