use mongodb::bson::{doc, Document};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use std::error::Error;

pub const USERS: &str = "users";
pub const ADDRESSES: &str = "addresses";
pub const ORDERS: &str = "orders";
pub const TRACKS: &str = "tracks";
pub const PICKUPS: &str = "pickups";
pub const NOTIFICATIONS: &str = "notifications";
pub const OFFERS: &str = "offers";
pub const PERMISSIONS: &str = "permissions";
pub const COUNTRIES: &str = "countries";
pub const LOGIN_HISTORY: &str = "login_history";
pub const API_CONFIGS: &str = "api_configs";

#[derive(Clone)]
pub struct MongoDB {
    db: Database,
}

impl MongoDB {
    pub async fn new(uri: &str) -> Result<Self, Box<dyn Error>> {
        let mut client_options = mongodb::options::ClientOptions::parse(uri).await?;

        // Connection pool
        client_options.max_pool_size = Some(20);
        client_options.min_pool_size = Some(5);
        client_options.max_idle_time = Some(std::time::Duration::from_secs(300));

        client_options.connect_timeout = Some(std::time::Duration::from_secs(5));
        client_options.server_selection_timeout = Some(std::time::Duration::from_secs(5));

        let client = Client::with_options(client_options)?;

        let db_name = database_name_from_uri(uri);
        let db = client.database(db_name);

        // Test connection
        db.list_collection_names().await?;

        let mongodb = Self { db };

        mongodb.ensure_indexes().await?;

        Ok(mongodb)
    }

    /// Handle that never talks to the server until a query runs.
    #[cfg(test)]
    pub(crate) async fn unconnected(uri: &str) -> Self {
        let client = Client::with_uri_str(uri).await.expect("valid test uri");
        Self {
            db: client.database(database_name_from_uri(uri)),
        }
    }

    /// Creates the uniqueness constraints and lookup indexes.
    async fn ensure_indexes(&self) -> Result<(), Box<dyn Error>> {
        log::info!("🔧 Creating database indexes...");

        for (collection, keys, unique) in index_specs() {
            let options = IndexOptions::builder().unique(unique).build();
            let index = IndexModel::builder().keys(keys.clone()).options(options).build();

            match self.collection::<Document>(collection).create_index(index).await {
                Ok(_) => log::info!("   ✅ Index ready: {}({})", collection, keys),
                Err(e) => log::warn!("   ⚠️  Index {}({}) not created: {}", collection, keys, e),
            }
        }

        log::info!("✅ Database indexes ready");

        Ok(())
    }

    pub async fn ping(&self) -> bool {
        self.db.run_command(doc! { "ping": 1 }).await.is_ok()
    }

    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }
}

/// (collection, keys, unique)
fn index_specs() -> Vec<(&'static str, Document, bool)> {
    vec![
        (USERS, doc! { "email": 1 }, true),
        (USERS, doc! { "phone": 1 }, true),
        (USERS, doc! { "role": 1, "created_at": -1 }, false),
        (ADDRESSES, doc! { "user_id": 1, "is_default": -1 }, false),
        (ORDERS, doc! { "tracking_number": 1 }, true),
        (ORDERS, doc! { "user_id": 1, "created_at": -1 }, false),
        (ORDERS, doc! { "status": 1, "created_at": -1 }, false),
        (ORDERS, doc! { "sender.phone": 1 }, false),
        (ORDERS, doc! { "receiver.phone": 1 }, false),
        (TRACKS, doc! { "order_id": 1, "created_at": 1 }, false),
        (TRACKS, doc! { "tracking_number": 1 }, false),
        (PICKUPS, doc! { "user_id": 1, "created_at": -1 }, false),
        (PICKUPS, doc! { "status": 1, "scheduled_date": 1 }, false),
        (NOTIFICATIONS, doc! { "user_id": 1, "is_read": 1, "created_at": -1 }, false),
        (OFFERS, doc! { "code": 1 }, true),
        (PERMISSIONS, doc! { "role": 1, "resource": 1 }, true),
        (COUNTRIES, doc! { "code": 1 }, true),
        (LOGIN_HISTORY, doc! { "user_id": 1, "created_at": -1 }, false),
        (API_CONFIGS, doc! { "user_id": 1 }, true),
        (API_CONFIGS, doc! { "api_key": 1 }, true),
    ]
}

fn database_name_from_uri(uri: &str) -> &str {
    uri.rsplit('/')
        .next()
        .and_then(|s| s.split('?').next())
        .filter(|name| !name.is_empty() && !name.contains(':') && !name.contains('@'))
        .unwrap_or("courier")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_name_extraction() {
        assert_eq!(database_name_from_uri("mongodb://localhost:27017/courier_prod"), "courier_prod");
        assert_eq!(
            database_name_from_uri("mongodb+srv://u:p@cluster.example.net/shipments?retryWrites=true"),
            "shipments"
        );
        assert_eq!(database_name_from_uri("mongodb://localhost:27017"), "courier");
        assert_eq!(database_name_from_uri("mongodb://localhost:27017/"), "courier");
    }

    #[test]
    fn every_unique_constraint_has_an_index() {
        let unique: Vec<_> = index_specs()
            .into_iter()
            .filter(|(_, _, unique)| *unique)
            .map(|(collection, keys, _)| format!("{}:{}", collection, keys))
            .collect();

        assert!(unique.contains(&format!("{}:{}", USERS, doc! { "email": 1 })));
        assert!(unique.contains(&format!("{}:{}", ORDERS, doc! { "tracking_number": 1 })));
        assert!(unique.contains(&format!("{}:{}", API_CONFIGS, doc! { "api_key": 1 })));
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn test_mongodb_connection() {
        dotenv::dotenv().ok();
        let uri = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "mongodb://localhost:27017/courier_test".to_string());
        let db = MongoDB::new(&uri).await;
        assert!(db.is_ok());
        assert!(db.unwrap().ping().await);
    }
}
