pub mod admin_seed;
pub mod countries_seed;
pub mod permissions_seed;

use crate::config::AppConfig;
use crate::database::MongoDB;

/// Runs every startup seed. Each one only inserts what is missing.
pub async fn run_all(db: &MongoDB, config: &AppConfig) {
    countries_seed::seed_default_countries(db).await;
    permissions_seed::seed_moderator_grants(db).await;
    if let Some(admin) = &config.seed_admin {
        admin_seed::seed_admin(db, admin, config.bcrypt_cost).await;
    }
}
