use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};
use serde::Serialize;

use crate::database::{self, MongoDB};
use crate::models::{now_millis, CreateOfferRequest, DiscountType, Offer, UpdateOfferRequest};
use crate::services::country_service::round_cents;
use crate::utils::validation::{normalize_country_code, Validator};
use crate::utils::AppError;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OfferQuote {
    pub code: String,
    pub title: String,
    pub amount: f64,
    pub discount: f64,
    pub total: f64,
}

/// Why an offer cannot be applied, or Ok when it can.
pub fn check_applicable(offer: &Offer, amount: f64, destination: Option<&str>, now: i64) -> Result<(), String> {
    if !offer.is_active {
        return Err("Offer is not active".to_string());
    }
    if now < offer.valid_from {
        return Err("Offer has not started yet".to_string());
    }
    if now > offer.valid_until {
        return Err("Offer has expired".to_string());
    }
    if let Some(limit) = offer.usage_limit {
        if offer.used_count >= limit {
            return Err("Offer usage limit reached".to_string());
        }
    }
    if amount < offer.min_order_value {
        return Err(format!("Minimum order value is {:.2}", offer.min_order_value));
    }
    if let Some(destination) = destination {
        let destination = normalize_country_code(destination);
        if !offer.countries.is_empty() && !offer.countries.contains(&destination) {
            return Err(format!("Offer is not valid for {}", destination));
        }
    }
    Ok(())
}

/// Amounts come from query strings too, so NaN and infinities reach here.
pub fn check_amount(amount: f64) -> Result<f64, AppError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(AppError::validation("amount", "must be a finite number, zero or more"));
    }
    Ok(amount)
}

/// Desconto nunca maior que o subtotal
pub fn discount_for(offer: &Offer, amount: f64) -> f64 {
    let raw = match offer.discount_type {
        DiscountType::Percentage => {
            let pct = amount * offer.discount_value / 100.0;
            match offer.max_discount {
                Some(cap) => pct.min(cap),
                None => pct,
            }
        }
        DiscountType::Flat => offer.discount_value,
    };
    round_cents(raw.max(0.0).min(amount))
}

pub fn quote_offer(offer: &Offer, amount: f64, destination: Option<&str>, now: i64) -> Result<OfferQuote, AppError> {
    let amount = check_amount(amount)?;
    check_applicable(offer, amount, destination, now).map_err(|reason| AppError::validation("offer_code", reason))?;
    let discount = discount_for(offer, amount);
    Ok(OfferQuote {
        code: offer.code.clone(),
        title: offer.title.clone(),
        amount,
        discount,
        total: round_cents(amount - discount),
    })
}

pub async fn find_by_code(db: &MongoDB, code: &str) -> Result<Offer, AppError> {
    let code = code.trim().to_uppercase();
    db.collection::<Offer>(database::OFFERS)
        .find_one(doc! { "code": &code })
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Offer {}", code)))
}

pub async fn list_current(db: &MongoDB) -> Result<Vec<Offer>, AppError> {
    let now = now_millis();
    let offers: Vec<Offer> = db
        .collection::<Offer>(database::OFFERS)
        .find(doc! {
            "is_active": true,
            "valid_from": { "$lte": now },
            "valid_until": { "$gte": now },
        })
        .sort(doc! { "valid_until": 1 })
        .await?
        .try_collect()
        .await?;

    // limite de uso é checado em memória
    Ok(offers
        .into_iter()
        .filter(|offer| offer.usage_limit.map_or(true, |limit| offer.used_count < limit))
        .collect())
}

pub async fn list_all(db: &MongoDB) -> Result<Vec<Offer>, AppError> {
    Ok(db
        .collection::<Offer>(database::OFFERS)
        .find(doc! {})
        .sort(doc! { "created_at": -1 })
        .await?
        .try_collect()
        .await?)
}

fn validate_terms(
    discount_type: DiscountType,
    discount_value: f64,
    valid_from: i64,
    valid_until: i64,
    usage_limit: Option<i64>,
) -> Result<(), AppError> {
    Validator::new()
        .check(discount_value > 0.0, "discount_value", "must be positive")
        .check(
            discount_type != DiscountType::Percentage || discount_value <= 100.0,
            "discount_value",
            "a percentage cannot exceed 100",
        )
        .check(valid_until > valid_from, "valid_until", "must be after valid_from")
        .check(usage_limit.map_or(true, |limit| limit > 0), "usage_limit", "must be positive")
        .finish()
}

pub async fn create_offer(db: &MongoDB, request: &CreateOfferRequest) -> Result<Offer, AppError> {
    let code = request.code.trim().to_uppercase();
    Validator::new()
        .required(&code, "code")
        .required(&request.title, "title")
        .check(
            code.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
            "code",
            "may only contain letters, digits, '-' and '_'",
        )
        .finish()?;
    validate_terms(
        request.discount_type,
        request.discount_value,
        request.valid_from,
        request.valid_until,
        request.usage_limit,
    )?;

    let now = now_millis();
    let mut offer = Offer {
        id: None,
        code,
        title: request.title.trim().to_string(),
        description: request.description.clone(),
        discount_type: request.discount_type,
        discount_value: request.discount_value,
        min_order_value: request.min_order_value.unwrap_or(0.0),
        max_discount: request.max_discount,
        valid_from: request.valid_from,
        valid_until: request.valid_until,
        usage_limit: request.usage_limit,
        used_count: 0,
        is_active: request.is_active.unwrap_or(true),
        countries: request
            .countries
            .clone()
            .unwrap_or_default()
            .iter()
            .map(|code| normalize_country_code(code))
            .collect(),
        created_at: now,
        updated_at: now,
    };

    let result = db
        .collection::<Offer>(database::OFFERS)
        .insert_one(&offer)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict(format!("Offer code {} already exists", offer.code)),
            other => other,
        })?;
    offer.id = result.inserted_id.as_object_id();

    log::info!("🏷️  Offer created: {}", offer.code);
    Ok(offer)
}

pub fn offer_update_doc(request: &UpdateOfferRequest) -> Document {
    let mut set = doc! { "updated_at": now_millis() };
    if let Some(title) = &request.title {
        set.insert("title", title.trim());
    }
    if let Some(description) = &request.description {
        set.insert("description", description);
    }
    if let Some(discount_type) = request.discount_type {
        set.insert(
            "discount_type",
            match discount_type {
                DiscountType::Percentage => "percentage",
                DiscountType::Flat => "flat",
            },
        );
    }
    if let Some(value) = request.discount_value {
        set.insert("discount_value", value);
    }
    if let Some(value) = request.min_order_value {
        set.insert("min_order_value", value);
    }
    if let Some(value) = request.max_discount {
        set.insert("max_discount", value);
    }
    if let Some(value) = request.valid_from {
        set.insert("valid_from", value);
    }
    if let Some(value) = request.valid_until {
        set.insert("valid_until", value);
    }
    if let Some(value) = request.usage_limit {
        set.insert("usage_limit", value);
    }
    if let Some(value) = request.is_active {
        set.insert("is_active", value);
    }
    if let Some(countries) = &request.countries {
        let codes: Vec<String> = countries.iter().map(|code| normalize_country_code(code)).collect();
        set.insert("countries", codes);
    }
    set
}

pub async fn update_offer(db: &MongoDB, id: ObjectId, request: &UpdateOfferRequest) -> Result<Offer, AppError> {
    let collection = db.collection::<Offer>(database::OFFERS);
    let current = collection
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::NotFound("Offer".to_string()))?;

    // valida o estado resultante, não só os campos enviados
    validate_terms(
        request.discount_type.unwrap_or(current.discount_type),
        request.discount_value.unwrap_or(current.discount_value),
        request.valid_from.unwrap_or(current.valid_from),
        request.valid_until.unwrap_or(current.valid_until),
        request.usage_limit.or(current.usage_limit),
    )?;

    collection
        .find_one_and_update(doc! { "_id": id }, doc! { "$set": offer_update_doc(request) })
        .return_document(mongodb::options::ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::NotFound("Offer".to_string()))
}

pub async fn delete_offer(db: &MongoDB, id: ObjectId) -> Result<(), AppError> {
    let result = db
        .collection::<Offer>(database::OFFERS)
        .delete_one(doc! { "_id": id })
        .await?;
    if result.deleted_count == 0 {
        return Err(AppError::NotFound("Offer".to_string()));
    }
    Ok(())
}

/// Filter that only matches while the offer still has uses left.
pub fn redeem_filter(id: ObjectId) -> Document {
    doc! {
        "_id": id,
        "is_active": true,
        "$or": [
            { "usage_limit": null },
            { "$expr": { "$lt": ["$used_count", "$usage_limit"] } },
        ],
    }
}

/// Atomically consumes one use; losing the race to the last use is a 409.
pub async fn redeem(db: &MongoDB, offer: &Offer) -> Result<(), AppError> {
    let id = offer
        .id
        .ok_or_else(|| AppError::Internal("Offer without id".to_string()))?;

    let result = db
        .collection::<Offer>(database::OFFERS)
        .update_one(
            redeem_filter(id),
            doc! { "$inc": { "used_count": 1 }, "$set": { "updated_at": now_millis() } },
        )
        .await?;

    if result.modified_count == 0 {
        return Err(AppError::Conflict(format!("Offer {} is no longer available", offer.code)));
    }
    Ok(())
}

/// Gives the use back when the order insert fails after redemption.
pub async fn release(db: &MongoDB, offer: &Offer) {
    let Some(id) = offer.id else { return };
    if let Err(e) = db
        .collection::<Offer>(database::OFFERS)
        .update_one(
            doc! { "_id": id, "used_count": { "$gt": 0 } },
            doc! { "$inc": { "used_count": -1 } },
        )
        .await
    {
        log::error!("❌ Failed to release offer {}: {}", offer.code, e);
    }
}

/// Disables offers past their end date, returns how many.
pub async fn deactivate_expired(db: &MongoDB) -> Result<u64, AppError> {
    let now = now_millis();
    let result = db
        .collection::<Offer>(database::OFFERS)
        .update_many(
            doc! { "is_active": true, "valid_until": { "$lt": now } },
            doc! { "$set": { "is_active": false, "updated_at": now } },
        )
        .await?;
    Ok(result.modified_count)
}

#[cfg(test)]
pub(crate) fn sample_offer(discount_type: DiscountType, value: f64) -> Offer {
    Offer {
        id: Some(ObjectId::new()),
        code: "WELCOME10".to_string(),
        title: "Welcome".to_string(),
        description: None,
        discount_type,
        discount_value: value,
        min_order_value: 0.0,
        max_discount: None,
        valid_from: 1_000,
        valid_until: 10_000,
        usage_limit: None,
        used_count: 0,
        is_active: true,
        countries: vec![],
        created_at: 0,
        updated_at: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_discount_with_cap() {
        let mut offer = sample_offer(DiscountType::Percentage, 10.0);
        assert_eq!(discount_for(&offer, 80.0), 8.0);

        offer.max_discount = Some(5.0);
        assert_eq!(discount_for(&offer, 80.0), 5.0);
    }

    #[test]
    fn flat_discount_never_exceeds_amount() {
        let offer = sample_offer(DiscountType::Flat, 15.0);
        assert_eq!(discount_for(&offer, 40.0), 15.0);
        assert_eq!(discount_for(&offer, 12.5), 12.5);
    }

    #[test]
    fn validity_window_and_limits() {
        let mut offer = sample_offer(DiscountType::Flat, 5.0);
        assert!(check_applicable(&offer, 20.0, None, 5_000).is_ok());
        assert_eq!(check_applicable(&offer, 20.0, None, 500).unwrap_err(), "Offer has not started yet");
        assert_eq!(check_applicable(&offer, 20.0, None, 20_000).unwrap_err(), "Offer has expired");

        offer.usage_limit = Some(3);
        offer.used_count = 3;
        assert!(check_applicable(&offer, 20.0, None, 5_000).is_err());

        offer.usage_limit = None;
        offer.min_order_value = 25.0;
        assert!(check_applicable(&offer, 20.0, None, 5_000).is_err());

        offer.min_order_value = 0.0;
        offer.is_active = false;
        assert_eq!(check_applicable(&offer, 20.0, None, 5_000).unwrap_err(), "Offer is not active");
    }

    #[test]
    fn country_restriction() {
        let mut offer = sample_offer(DiscountType::Flat, 5.0);
        offer.countries = vec!["GB".to_string()];

        assert!(check_applicable(&offer, 20.0, Some("gb"), 5_000).is_ok());
        assert!(check_applicable(&offer, 20.0, Some("US"), 5_000).is_err());
        // sem destino informado não há o que restringir
        assert!(check_applicable(&offer, 20.0, None, 5_000).is_ok());
    }

    #[test]
    fn quote_totals() {
        let offer = sample_offer(DiscountType::Percentage, 25.0);
        let quote = quote_offer(&offer, 30.0, None, 5_000).unwrap();
        assert_eq!(quote.discount, 7.5);
        assert_eq!(quote.total, 22.5);

        assert!(matches!(
            quote_offer(&offer, 30.0, None, 50_000),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn non_finite_or_negative_amounts_are_rejected() {
        let offer = sample_offer(DiscountType::Percentage, 10.0);
        for amount in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -5.0] {
            assert!(
                matches!(quote_offer(&offer, amount, None, 5_000), Err(AppError::Validation(_))),
                "amount {}",
                amount
            );
        }
        assert_eq!(quote_offer(&offer, 0.0, None, 5_000).unwrap().total, 0.0);
    }

    #[test]
    fn nan_from_the_query_string_does_not_panic() {
        let query =
            actix_web::web::Query::<crate::models::ValidateOfferQuery>::from_query("amount=NaN").unwrap();
        assert!(query.amount.is_nan());
        assert!(check_amount(query.amount).is_err());
        // min/max ignoram NaN, ao contrário de clamp
        assert_eq!(discount_for(&sample_offer(DiscountType::Percentage, 10.0), f64::NAN), 0.0);
        assert_eq!(discount_for(&sample_offer(DiscountType::Flat, 5.0), f64::NAN), 5.0);
    }

    #[test]
    fn terms_validation() {
        assert!(validate_terms(DiscountType::Percentage, 10.0, 0, 10, None).is_ok());
        assert!(validate_terms(DiscountType::Percentage, 150.0, 0, 10, None).is_err());
        assert!(validate_terms(DiscountType::Flat, 150.0, 0, 10, None).is_ok());
        assert!(validate_terms(DiscountType::Flat, 5.0, 10, 10, None).is_err());
        assert!(validate_terms(DiscountType::Flat, 5.0, 0, 10, Some(0)).is_err());
    }

    #[test]
    fn redeem_filter_guards_usage_limit() {
        let id = ObjectId::new();
        let filter = redeem_filter(id);
        assert_eq!(filter.get_object_id("_id").unwrap(), id);
        assert_eq!(filter.get_array("$or").unwrap().len(), 2);
    }
}
