use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};

use crate::database::{self, MongoDB};
use crate::models::{now_millis, Address, AddressRequest};
use crate::services::country_service;
use crate::utils::validation::{normalize_country_code, normalize_phone, Validator};
use crate::utils::AppError;

fn validate(request: &AddressRequest) -> Result<(), AppError> {
    Validator::new()
        .required(&request.label, "label")
        .required(&request.contact_name, "contact_name")
        .phone(&request.phone, "phone")
        .required(&request.line1, "line1")
        .required(&request.city, "city")
        .country_code(&normalize_country_code(&request.country_code), "country_code")
        .finish()
}

pub async fn list_addresses(db: &MongoDB, user_id: ObjectId) -> Result<Vec<Address>, AppError> {
    Ok(db
        .collection::<Address>(database::ADDRESSES)
        .find(doc! { "user_id": user_id })
        .sort(doc! { "is_default": -1, "created_at": -1 })
        .await?
        .try_collect()
        .await?)
}

/// Another user's address is reported as missing, never as forbidden.
pub async fn find_owned(db: &MongoDB, user_id: ObjectId, id: ObjectId) -> Result<Address, AppError> {
    db.collection::<Address>(database::ADDRESSES)
        .find_one(doc! { "_id": id, "user_id": user_id })
        .await?
        .ok_or_else(|| AppError::NotFound("Address".to_string()))
}

pub async fn create_address(db: &MongoDB, user_id: ObjectId, request: &AddressRequest) -> Result<Address, AppError> {
    validate(request)?;
    let country = country_service::find_active(db, &request.country_code).await?;

    let collection = db.collection::<Address>(database::ADDRESSES);
    let has_any = collection.count_documents(doc! { "user_id": user_id }).await? > 0;

    let now = now_millis();
    let mut address = Address {
        id: None,
        user_id,
        label: request.label.trim().to_string(),
        contact_name: request.contact_name.trim().to_string(),
        phone: normalize_phone(&request.phone)?,
        line1: request.line1.trim().to_string(),
        line2: request.line2.clone(),
        city: request.city.trim().to_string(),
        state: request.state.clone(),
        postal_code: request.postal_code.clone(),
        country_code: country.code,
        is_default: !has_any,
        created_at: now,
        updated_at: now,
    };

    let result = collection.insert_one(&address).await?;
    address.id = result.inserted_id.as_object_id();

    log::info!("📍 Address {} added for user {}", address.label, user_id);
    Ok(address)
}

pub async fn update_address(
    db: &MongoDB,
    user_id: ObjectId,
    id: ObjectId,
    request: &AddressRequest,
) -> Result<Address, AppError> {
    validate(request)?;
    let country = country_service::find_active(db, &request.country_code).await?;

    db.collection::<Address>(database::ADDRESSES)
        .find_one_and_update(
            doc! { "_id": id, "user_id": user_id },
            doc! { "$set": {
                "label": request.label.trim(),
                "contact_name": request.contact_name.trim(),
                "phone": normalize_phone(&request.phone)?,
                "line1": request.line1.trim(),
                "line2": request.line2.as_deref(),
                "city": request.city.trim(),
                "state": request.state.as_deref(),
                "postal_code": request.postal_code.as_deref(),
                "country_code": country.code,
                "updated_at": now_millis(),
            }},
        )
        .return_document(mongodb::options::ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::NotFound("Address".to_string()))
}

pub async fn set_default(db: &MongoDB, user_id: ObjectId, id: ObjectId) -> Result<Address, AppError> {
    let collection = db.collection::<Address>(database::ADDRESSES);
    // confirma a posse antes de mexer no default atual
    find_owned(db, user_id, id).await?;

    let now = now_millis();
    collection
        .update_many(
            doc! { "user_id": user_id, "is_default": true, "_id": { "$ne": id } },
            doc! { "$set": { "is_default": false, "updated_at": now } },
        )
        .await?;

    collection
        .find_one_and_update(
            doc! { "_id": id, "user_id": user_id },
            doc! { "$set": { "is_default": true, "updated_at": now } },
        )
        .return_document(mongodb::options::ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::NotFound("Address".to_string()))
}

pub async fn delete_address(db: &MongoDB, user_id: ObjectId, id: ObjectId) -> Result<(), AppError> {
    let collection = db.collection::<Address>(database::ADDRESSES);
    let removed = collection
        .find_one_and_delete(doc! { "_id": id, "user_id": user_id })
        .await?
        .ok_or_else(|| AppError::NotFound("Address".to_string()))?;

    if removed.is_default {
        let newest = collection
            .find_one(doc! { "user_id": user_id })
            .sort(doc! { "created_at": -1 })
            .await?;
        if let Some(next) = newest {
            collection
                .update_one(
                    doc! { "_id": next.id },
                    doc! { "$set": { "is_default": true, "updated_at": now_millis() } },
                )
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AddressRequest {
        AddressRequest {
            label: "Home".into(),
            contact_name: "Ada Lovelace".into(),
            phone: "+44 20 7946 0000".into(),
            line1: "12 St James's Square".into(),
            line2: None,
            city: "London".into(),
            state: None,
            postal_code: Some("SW1Y 4JH".into()),
            country_code: "gb".into(),
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(validate(&request()).is_ok());
    }

    #[test]
    fn missing_fields_are_reported_together() {
        let bad = AddressRequest {
            label: " ".into(),
            phone: "call me".into(),
            country_code: "GBR".into(),
            ..request()
        };
        match validate(&bad) {
            Err(AppError::Validation(errors)) => {
                let fields: Vec<_> = errors.iter().map(|(f, _)| f.as_str()).collect();
                assert_eq!(fields, vec!["label", "phone", "country_code"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
