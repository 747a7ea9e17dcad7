pub mod address_service;
pub mod analytics_service;
pub mod api_config_service;
pub mod auth_service;
pub mod country_service;
pub mod notification_service;
pub mod offer_service;
pub mod order_service;
pub mod permission_service;
pub mod pickup_service;
pub mod user_service;
