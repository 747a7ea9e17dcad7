use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};

use crate::models::Role;
use crate::services::auth_service::Claims;
use crate::utils::AppError;

/// Rejects callers ranked below `min`. Must sit inside `AuthMiddleware`.
pub struct RequireRole(pub Role);

impl<S, B> Transform<S, ServiceRequest> for RequireRole
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequireRoleMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequireRoleMiddleware { service, min: self.0 }))
    }
}

pub struct RequireRoleMiddleware<S> {
    service: S,
    min: Role,
}

impl<S, B> Service<ServiceRequest> for RequireRoleMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let checked = req
            .extensions()
            .get::<Claims>()
            .map(|claims| (claims.role, claims.require_role(self.min)));

        match checked {
            Some((_, Ok(()))) => {
                let fut = self.service.call(req);
                Box::pin(async move { fut.await })
            }
            Some((role, Err(e))) => {
                log::warn!("🚫 {} blocked from {} (needs {})", role, req.path(), self.min);
                Box::pin(async move { Err(e.into()) })
            }
            None => Box::pin(async move {
                Err(AppError::Unauthorized("Missing authorization token".to_string()).into())
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::services::auth_service::{build_claims, TokenType};
    use crate::models::User;
    use actix_web::test::{init_service, try_call_service, TestRequest};
    use actix_web::{web, App, HttpResponse};

    fn claims(role: Role) -> Claims {
        let user = User::new("Ada", "ada@example.com", "+15550100200", "correct horse", role, 4).unwrap();
        build_claims(&user, TokenType::Access, &JwtConfig::default())
    }

    async fn status_for(caller: Option<Role>) -> u16 {
        let app = init_service(
            App::new().service(
                web::scope("/admin")
                    .wrap(RequireRole(Role::Admin))
                    .route("", web::get().to(|| async { HttpResponse::Ok().finish() })),
            ),
        )
        .await;

        let req = TestRequest::get().uri("/admin").to_request();
        if let Some(role) = caller {
            req.extensions_mut().insert(claims(role));
        }
        match try_call_service(&app, req).await {
            Ok(res) => res.status().as_u16(),
            Err(e) => e.as_response_error().status_code().as_u16(),
        }
    }

    #[actix_rt::test]
    async fn ranking_is_enforced() {
        assert_eq!(status_for(Some(Role::Admin)).await, 200);
        assert_eq!(status_for(Some(Role::Moderator)).await, 403);
        assert_eq!(status_for(Some(Role::User)).await, 403);
        assert_eq!(status_for(None).await, 401);
    }
}
