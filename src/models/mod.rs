pub mod address;
pub mod api_config;
pub mod country;
pub mod login_history;
pub mod notification;
pub mod offer;
pub mod order;
pub mod permission;
pub mod pickup;
pub mod track;
pub mod user;

pub use address::*;
pub use api_config::*;
pub use country::*;
pub use login_history::*;
pub use notification::*;
pub use offer::*;
pub use order::*;
pub use permission::*;
pub use pickup::*;
pub use track::*;
pub use user::*;

/// Timestamps are stored as epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
