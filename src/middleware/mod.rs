pub mod auth;
pub mod rate_limit;
pub mod request_metrics;
pub mod require_role;
pub mod security_headers;

pub use auth::AuthMiddleware;
pub use rate_limit::{RateLimit, RateLimiter};
pub use request_metrics::RequestMetrics;
pub use require_role::RequireRole;
pub use security_headers::SecurityHeaders;
