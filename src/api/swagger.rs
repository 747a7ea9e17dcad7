use utoipa::OpenApi;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Courier Service API",
        version = "1.0.0",
        description = "REST API for the courier backend.\n\n**Authentication:** Most endpoints require a JWT Bearer token; integrations may send an `X-API-Key` instead.\n\n**Features:**\n- Orders with pricing, offers and tracking numbers\n- Public shipment tracking\n- Pickup scheduling\n- In-app, email and SMS notifications\n- Role-based access for staff\n- Analytics for administrators",
        contact(
            name = "Courier Service Team",
            email = "support@courier-service.com"
        )
    ),
    paths(
        // Auth
        crate::api::auth::login,
        crate::api::auth::register,
        crate::api::auth::refresh_token,
        crate::api::auth::verify_token,
        crate::api::auth::get_me,

        // Health & Metrics
        crate::api::health::health_check,
        crate::api::metrics::get_metrics,

        // Public
        crate::api::orders::quote,
        crate::api::orders::track,
        crate::api::countries::list_countries,
        crate::api::offers::list_current,
    ),
    components(
        schemas(
            // Auth
            crate::services::auth_service::LoginRequest,
            crate::services::auth_service::RegisterRequest,
            crate::services::auth_service::RefreshTokenRequest,
            crate::services::auth_service::AuthResponse,
            crate::models::UserInfo,
            crate::models::Role,

            // Orders
            crate::models::QuoteRequest,
            crate::models::Pricing,
            crate::models::ServiceType,

            // Health & Metrics
            crate::api::health::HealthResponse,
            crate::api::metrics::MetricsResponse,
        )
    ),
    tags(
        (name = "Auth", description = "Registration, login, token refresh and the current user."),
        (name = "Health", description = "Health check and Prometheus counters."),
        (name = "Orders", description = "Shipping quotes and orders."),
        (name = "Tracking", description = "Public shipment tracking by tracking number."),
        (name = "Countries", description = "Shipping destinations and their rates."),
        (name = "Offers", description = "Discount codes."),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Enter your JWT token"))
                        .build()
                ),
            );
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(crate::middleware::auth::API_KEY_HEADER))),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_public_routes_and_security() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/auth/login"));
        assert!(doc.paths.paths.contains_key("/api/v1/track/{tracking_number}"));
        assert!(doc.paths.paths.contains_key("/health"));

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(components.security_schemes.contains_key("api_key"));
    }
}
