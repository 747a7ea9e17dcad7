use mongodb::bson::{doc, oid::ObjectId};

use crate::database::{self, MongoDB};
use crate::models::{now_millis, ApiConfig, ApiConfigRequest, UpdateApiConfigRequest, User, API_KEY_PREFIX};
use crate::utils::AppError;

fn validate_webhook(url: &str) -> Result<(), AppError> {
    let url = url.trim();
    if url.starts_with("https://") || url.starts_with("http://") {
        Ok(())
    } else {
        Err(AppError::validation("webhook_url", "must be an http(s) URL"))
    }
}

/// Cria ou regenera a chave; a chave completa só é devolvida aqui
pub async fn create_or_regenerate(
    db: &MongoDB,
    user_id: ObjectId,
    request: &ApiConfigRequest,
) -> Result<ApiConfig, AppError> {
    if let Some(url) = &request.webhook_url {
        validate_webhook(url)?;
    }

    let collection = db.collection::<ApiConfig>(database::API_CONFIGS);
    let fresh = ApiConfig::new(user_id, request.webhook_url.clone());

    let config = collection
        .find_one_and_update(
            doc! { "user_id": user_id },
            doc! {
                "$set": {
                    "api_key": &fresh.api_key,
                    "is_active": true,
                    "webhook_url": fresh.webhook_url.as_deref(),
                    "updated_at": fresh.updated_at,
                },
                "$setOnInsert": { "created_at": fresh.created_at, "last_used_at": null },
            },
        )
        .upsert(true)
        .return_document(mongodb::options::ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::Internal("Upsert returned no document".to_string()))?;

    log::info!("🔑 API key issued for user {}", user_id);
    Ok(config)
}

pub async fn get_config(db: &MongoDB, user_id: ObjectId) -> Result<ApiConfig, AppError> {
    db.collection::<ApiConfig>(database::API_CONFIGS)
        .find_one(doc! { "user_id": user_id })
        .await?
        .ok_or_else(|| AppError::NotFound("API config".to_string()))
}

pub async fn update_config(
    db: &MongoDB,
    user_id: ObjectId,
    request: &UpdateApiConfigRequest,
) -> Result<ApiConfig, AppError> {
    let mut set = doc! { "updated_at": now_millis() };
    if let Some(is_active) = request.is_active {
        set.insert("is_active", is_active);
    }
    if let Some(url) = &request.webhook_url {
        // string vazia remove o webhook
        if url.trim().is_empty() {
            set.insert("webhook_url", mongodb::bson::Bson::Null);
        } else {
            validate_webhook(url)?;
            set.insert("webhook_url", url.trim());
        }
    }

    db.collection::<ApiConfig>(database::API_CONFIGS)
        .find_one_and_update(doc! { "user_id": user_id }, doc! { "$set": set })
        .return_document(mongodb::options::ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::NotFound("API config".to_string()))
}

pub async fn delete_config(db: &MongoDB, user_id: ObjectId) -> Result<(), AppError> {
    let result = db
        .collection::<ApiConfig>(database::API_CONFIGS)
        .delete_one(doc! { "user_id": user_id })
        .await?;
    if result.deleted_count == 0 {
        return Err(AppError::NotFound("API config".to_string()));
    }
    Ok(())
}

/// Resolves an API key to its active owner and stamps `last_used_at`.
pub async fn authenticate_key(db: &MongoDB, api_key: &str) -> Result<User, AppError> {
    let api_key = api_key.trim();
    if !api_key.starts_with(API_KEY_PREFIX) {
        return Err(AppError::Unauthorized("Invalid API key".to_string()));
    }

    let config = db
        .collection::<ApiConfig>(database::API_CONFIGS)
        .find_one_and_update(
            doc! { "api_key": api_key, "is_active": true },
            doc! { "$set": { "last_used_at": now_millis() } },
        )
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid API key".to_string()))?;

    let user = db
        .collection::<User>(database::USERS)
        .find_one(doc! { "_id": config.user_id, "is_active": true })
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid API key".to_string()))?;

    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_urls() {
        assert!(validate_webhook("https://hooks.example.com/courier").is_ok());
        assert!(validate_webhook(" http://localhost:9000/hook ").is_ok());
        assert!(validate_webhook("ftp://example.com").is_err());
        assert!(validate_webhook("example.com").is_err());
    }

    #[actix_rt::test]
    #[ignore = "requires a running MongoDB (DATABASE_URL)"]
    async fn key_lifecycle() {
        dotenv::dotenv().ok();
        let uri = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "mongodb://localhost:27017/courier_test".to_string());
        let db = MongoDB::new(&uri).await.unwrap();
        let user_id = ObjectId::new();

        let config = create_or_regenerate(&db, user_id, &ApiConfigRequest::default()).await.unwrap();
        assert!(config.api_key.starts_with(API_KEY_PREFIX));

        let again = create_or_regenerate(&db, user_id, &ApiConfigRequest::default()).await.unwrap();
        assert_ne!(config.api_key, again.api_key);

        // usuário inexistente: a chave não autentica
        assert!(authenticate_key(&db, &again.api_key).await.is_err());
        delete_config(&db, user_id).await.unwrap();
    }
}
