mod api;
mod config;
mod database;
mod jobs;
mod middleware;
mod models;
mod seeds;
mod services;
mod utils;

use std::io;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::http::header::{self, HeaderName};
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::middleware::{AuthMiddleware, RateLimit, RateLimiter, RequestMetrics, RequireRole, SecurityHeaders};
use crate::models::Role;
use crate::services::notification_service::{self, NotificationDispatcher};
use crate::utils::AppError;

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("❌ Invalid configuration: {}", e);
            return Err(io::Error::new(io::ErrorKind::InvalidInput, e));
        }
    };

    log::info!("🚀 Starting Courier Service...");
    log::info!("📊 Database: {}", config.database_url);

    // Initialize MongoDB connection
    let db = database::MongoDB::new(&config.database_url).await.map_err(|e| {
        log::error!("❌ Failed to connect to MongoDB: {}", e);
        io::Error::new(io::ErrorKind::Other, e.to_string())
    })?;
    log::info!("✅ MongoDB connected successfully");

    // 🌱 Seeds
    seeds::run_all(&db, &config).await;

    let dispatcher = NotificationDispatcher::new(
        db.clone(),
        notification_service::channels_from_config(&config.notifications),
    );

    let trust_proxy = config.rate_limit.trust_proxy;
    let auth_limiter = Arc::new(
        RateLimiter::per_minute("auth", config.rate_limit.auth_per_minute).with_trusted_proxy(trust_proxy),
    );
    let api_limiter = Arc::new(
        RateLimiter::per_minute("api", config.rate_limit.api_per_minute).with_trusted_proxy(trust_proxy),
    );

    // 🧹 Background jobs
    jobs::housekeeping::start(db.clone(), vec![auth_limiter.clone(), api_limiter.clone()]);

    let host = config.host.clone();
    let port = config.port;
    log::info!("🌐 Server starting on {}:{}", host, port);
    log::info!("📚 Swagger UI available at: http://{}:{}/swagger-ui/", host, port);
    log::info!("📄 OpenAPI spec at: http://{}:{}/api-docs/openapi.json", host, port);

    let db_data = web::Data::new(db);
    let config_data = web::Data::new(config);
    let dispatcher_data = web::Data::new(dispatcher);

    // Start HTTP server
    HttpServer::new(move || {
        let mut cors = Cors::default();
        for origin in &config_data.cors_origins {
            cors = cors.allowed_origin(origin);
        }
        let cors = cors
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                header::ACCEPT,
                HeaderName::from_static("x-api-key"),
            ])
            .expose_headers(vec![
                header::CONTENT_TYPE,
                header::RETRY_AFTER,
                HeaderName::from_static("x-ratelimit-limit"),
                HeaderName::from_static("x-ratelimit-remaining"),
            ])
            .supports_credentials()
            .max_age(3600);

        // Generate OpenAPI specification
        let openapi = api::swagger::ApiDoc::openapi();

        App::new()
            .app_data(db_data.clone())
            .app_data(config_data.clone())
            .app_data(dispatcher_data.clone())
            // erros de extração também saem no envelope
            .app_data(web::JsonConfig::default().error_handler(|err, _| AppError::BadRequest(err.to_string()).into()))
            .app_data(web::QueryConfig::default().error_handler(|err, _| AppError::BadRequest(err.to_string()).into()))
            .wrap(cors)
            .wrap(SecurityHeaders)
            .wrap(RequestMetrics)
            .wrap(Logger::default())
            // Swagger UI
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
            // Health check
            .route("/health", web::get().to(api::health::health_check))
            // Metrics
            .route("/metrics", web::get().to(api::metrics::get_metrics))

            // ==================== AUTH ====================
            .service(
                web::scope("/api/v1/auth")
                    .wrap(RateLimit::new(auth_limiter.clone()))
                    .route("/register", web::post().to(api::auth::register))
                    .route("/login", web::post().to(api::auth::login))
                    .route("/refresh", web::post().to(api::auth::refresh_token))
                    .service(
                        web::resource("/verify")
                            .wrap(AuthMiddleware)
                            .route(web::get().to(api::auth::verify_token))
                    )
                    .service(
                        web::resource("/me")
                            .wrap(AuthMiddleware)
                            .route(web::get().to(api::auth::get_me))
                    )
                    .service(
                        web::resource("/change-password")
                            .wrap(AuthMiddleware)
                            .route(web::put().to(api::auth::change_password))
                    )
            )

            // ==================== PUBLIC ====================
            .service(
                web::scope("/api/v1/track")
                    .wrap(RateLimit::new(api_limiter.clone()))
                    .route("/{tracking_number}", web::get().to(api::orders::track))
            )
            .service(
                web::scope("/api/v1/quote")
                    .wrap(RateLimit::new(api_limiter.clone()))
                    .route("", web::post().to(api::orders::quote))
            )
            .service(
                web::scope("/api/v1/countries")
                    .wrap(RateLimit::new(api_limiter.clone()))
                    .route("", web::get().to(api::countries::list_countries))
            )
            .service(
                web::scope("/api/v1/offers")
                    .wrap(RateLimit::new(api_limiter.clone()))
                    .route("", web::get().to(api::offers::list_current))
                    .route("/{code}/validate", web::get().to(api::offers::validate_offer))
            )

            // ==================== AUTHENTICATED (JWT or API key) ====================
            .service(
                web::scope("/api/v1/users/me")
                    .wrap(AuthMiddleware)
                    .wrap(RateLimit::new(api_limiter.clone()))
                    .route("", web::get().to(api::users::get_profile))
                    .route("", web::put().to(api::users::update_profile))
                    .route("", web::delete().to(api::users::delete_account))
                    .route("/login-history", web::get().to(api::users::login_history))
            )
            .service(
                web::scope("/api/v1/addresses")
                    .wrap(AuthMiddleware)
                    .wrap(RateLimit::new(api_limiter.clone()))
                    .route("", web::get().to(api::addresses::list_addresses))
                    .route("", web::post().to(api::addresses::create_address))
                    .route("/{id}", web::get().to(api::addresses::get_address))
                    .route("/{id}", web::put().to(api::addresses::update_address))
                    .route("/{id}", web::delete().to(api::addresses::delete_address))
                    .route("/{id}/default", web::put().to(api::addresses::set_default))
            )
            .service(
                web::scope("/api/v1/orders")
                    .wrap(AuthMiddleware)
                    .wrap(RateLimit::new(api_limiter.clone()))
                    .route("", web::get().to(api::orders::list_orders))
                    .route("", web::post().to(api::orders::create_order))
                    .route("/by-phone/{phone}", web::get().to(api::orders::orders_by_phone))
                    .route("/{id}", web::get().to(api::orders::get_order))
                    .route("/{id}/cancel", web::post().to(api::orders::cancel_order))
            )
            .service(
                web::scope("/api/v1/pickups")
                    .wrap(AuthMiddleware)
                    .wrap(RateLimit::new(api_limiter.clone()))
                    .route("", web::get().to(api::pickups::list_pickups))
                    .route("", web::post().to(api::pickups::create_pickup))
                    .route("/{id}", web::get().to(api::pickups::get_pickup))
                    .route("/{id}/cancel", web::post().to(api::pickups::cancel_pickup))
            )
            .service(
                web::scope("/api/v1/notifications")
                    .wrap(AuthMiddleware)
                    .wrap(RateLimit::new(api_limiter.clone()))
                    .route("", web::get().to(api::notifications::list_notifications))
                    .route("/unread-count", web::get().to(api::notifications::unread_count))
                    .route("/read-all", web::put().to(api::notifications::mark_all_read))
                    .route("/{id}/read", web::put().to(api::notifications::mark_read))
                    .route("/{id}", web::delete().to(api::notifications::delete_notification))
            )
            .service(
                web::scope("/api/v1/api-config")
                    .wrap(AuthMiddleware)
                    .wrap(RateLimit::new(api_limiter.clone()))
                    .route("", web::get().to(api::api_config::get_config))
                    .route("", web::post().to(api::api_config::generate_key))
                    .route("", web::put().to(api::api_config::update_config))
                    .route("", web::delete().to(api::api_config::delete_config))
            )

            // ==================== STAFF (moderator+, grants checked per route) ====================
            .service(
                web::scope("/api/v1/admin")
                    .wrap(RequireRole(Role::Moderator))
                    .wrap(AuthMiddleware)
                    .wrap(RateLimit::new(api_limiter.clone()))
                    // Users
                    .route("/users", web::get().to(api::users::list_users))
                    .route("/users/{id}", web::get().to(api::users::get_user))
                    .route("/users/{id}", web::put().to(api::users::update_user))
                    .route("/users/{id}", web::delete().to(api::users::delete_user))
                    .route("/users/{id}/login-history", web::get().to(api::users::user_login_history))
                    // Orders & tracking
                    .route("/orders/{id}/status", web::put().to(api::orders::update_status))
                    .route("/orders/{id}", web::delete().to(api::orders::delete_order))
                    .route("/track/{tracking_number}/events", web::post().to(api::orders::add_track))
                    // Pickups
                    .route("/pickups/{id}", web::put().to(api::pickups::update_pickup))
                    // Countries
                    .route("/countries", web::get().to(api::countries::list_all))
                    .route("/countries", web::post().to(api::countries::create_country))
                    .route("/countries/{code}", web::put().to(api::countries::update_country))
                    .route("/countries/{code}", web::delete().to(api::countries::delete_country))
                    // Offers
                    .route("/offers", web::get().to(api::offers::list_all))
                    .route("/offers", web::post().to(api::offers::create_offer))
                    .route("/offers/{id}", web::put().to(api::offers::update_offer))
                    .route("/offers/{id}", web::delete().to(api::offers::delete_offer))
                    // Notifications
                    .route("/notifications/broadcast", web::post().to(api::notifications::broadcast))
                    // Analytics
                    .route("/analytics/overview", web::get().to(api::analytics::overview))
                    .route("/analytics/revenue", web::get().to(api::analytics::revenue))
                    .route("/analytics/orders", web::get().to(api::analytics::orders))
                    .route("/analytics/countries", web::get().to(api::analytics::countries))
                    .route("/analytics/offers", web::get().to(api::analytics::offers))
                    .route("/analytics/users", web::get().to(api::analytics::users))
                    // Permissions: admin only
                    .service(
                        web::scope("/permissions")
                            .wrap(RequireRole(Role::Admin))
                            .route("", web::get().to(api::permissions::list_permissions))
                            .route("", web::put().to(api::permissions::upsert_permission))
                            .route("/{id}", web::delete().to(api::permissions::delete_permission))
                    )
            )
    })
    .bind((host, port))?
    .run()
    .await
}
