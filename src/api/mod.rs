pub mod addresses;
pub mod analytics;
pub mod api_config;
pub mod auth;
pub mod countries;
pub mod health;
pub mod metrics;
pub mod notifications;
pub mod offers;
pub mod orders;
pub mod permissions;
pub mod pickups;
pub mod response;
pub mod swagger;
pub mod users;
