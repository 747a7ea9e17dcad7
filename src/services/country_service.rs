use futures::stream::TryStreamExt;
use mongodb::bson::{doc, Document};

use crate::database::{self, MongoDB};
use crate::models::{now_millis, Country, CountryRequest, ServiceType, UpdateCountryRequest};
use crate::utils::validation::{normalize_country_code, Validator};
use crate::utils::AppError;

pub const MAX_WEIGHT_KG: f64 = 1000.0;

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Components of a shipping price before any offer is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct BasePrice {
    pub base: f64,
    pub weight_charge: f64,
    pub express_surcharge: f64,
    pub subtotal: f64,
    pub currency: String,
}

/// Preço = base + peso × tarifa/kg do destino, × multiplicador se expresso
pub fn base_price(destination: &Country, weight_kg: f64, service: ServiceType) -> Result<BasePrice, AppError> {
    if !(weight_kg > 0.0 && weight_kg <= MAX_WEIGHT_KG) {
        return Err(AppError::validation("weight_kg", "must be greater than 0 and at most 1000"));
    }

    let base = round_cents(destination.base_rate);
    let weight_charge = round_cents(weight_kg * destination.per_kg_rate);
    let standard = base + weight_charge;
    let express_surcharge = match service {
        ServiceType::Standard => 0.0,
        ServiceType::Express => round_cents(standard * (destination.express_multiplier - 1.0).max(0.0)),
    };

    Ok(BasePrice {
        base,
        weight_charge,
        express_surcharge,
        subtotal: round_cents(standard + express_surcharge),
        currency: destination.currency.clone(),
    })
}

pub async fn list_countries(db: &MongoDB, include_inactive: bool) -> Result<Vec<Country>, AppError> {
    let filter = if include_inactive { doc! {} } else { doc! { "is_active": true } };
    Ok(db
        .collection::<Country>(database::COUNTRIES)
        .find(filter)
        .sort(doc! { "name": 1 })
        .await?
        .try_collect()
        .await?)
}

pub async fn find_active(db: &MongoDB, code: &str) -> Result<Country, AppError> {
    let code = normalize_country_code(code);
    db.collection::<Country>(database::COUNTRIES)
        .find_one(doc! { "code": &code, "is_active": true })
        .await?
        .ok_or_else(|| AppError::validation("country_code", format!("{} is not a served country", code)))
}

fn validate_rates(base_rate: f64, per_kg_rate: f64, express_multiplier: f64) -> Result<(), AppError> {
    Validator::new()
        .check(base_rate >= 0.0, "base_rate", "must not be negative")
        .check(per_kg_rate >= 0.0, "per_kg_rate", "must not be negative")
        .check(express_multiplier >= 1.0, "express_multiplier", "must be at least 1")
        .finish()
}

pub async fn create_country(db: &MongoDB, request: &CountryRequest) -> Result<Country, AppError> {
    let code = normalize_country_code(&request.code);
    let express_multiplier = request.express_multiplier.unwrap_or(1.5);

    Validator::new()
        .country_code(&code, "code")
        .required(&request.name, "name")
        .required(&request.currency, "currency")
        .finish()?;
    validate_rates(request.base_rate, request.per_kg_rate, express_multiplier)?;

    let now = now_millis();
    let mut country = Country {
        id: None,
        code,
        name: request.name.trim().to_string(),
        dial_code: request.dial_code.trim().to_string(),
        currency: request.currency.trim().to_uppercase(),
        base_rate: request.base_rate,
        per_kg_rate: request.per_kg_rate,
        express_multiplier,
        is_active: request.is_active.unwrap_or(true),
        created_at: now,
        updated_at: now,
    };

    let result = db
        .collection::<Country>(database::COUNTRIES)
        .insert_one(&country)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict(format!("Country {} already exists", country.code)),
            other => other,
        })?;
    country.id = result.inserted_id.as_object_id();
    Ok(country)
}

pub fn country_update_doc(request: &UpdateCountryRequest) -> Document {
    let mut set = doc! { "updated_at": now_millis() };
    if let Some(name) = &request.name {
        set.insert("name", name.trim());
    }
    if let Some(dial_code) = &request.dial_code {
        set.insert("dial_code", dial_code.trim());
    }
    if let Some(currency) = &request.currency {
        set.insert("currency", currency.trim().to_uppercase());
    }
    if let Some(base_rate) = request.base_rate {
        set.insert("base_rate", base_rate);
    }
    if let Some(per_kg_rate) = request.per_kg_rate {
        set.insert("per_kg_rate", per_kg_rate);
    }
    if let Some(multiplier) = request.express_multiplier {
        set.insert("express_multiplier", multiplier);
    }
    if let Some(is_active) = request.is_active {
        set.insert("is_active", is_active);
    }
    set
}

pub async fn update_country(
    db: &MongoDB,
    code: &str,
    request: &UpdateCountryRequest,
) -> Result<Country, AppError> {
    validate_rates(
        request.base_rate.unwrap_or(0.0),
        request.per_kg_rate.unwrap_or(0.0),
        request.express_multiplier.unwrap_or(1.0),
    )?;

    let code = normalize_country_code(code);
    db.collection::<Country>(database::COUNTRIES)
        .find_one_and_update(doc! { "code": &code }, doc! { "$set": country_update_doc(request) })
        .return_document(mongodb::options::ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Country {}", code)))
}

pub async fn delete_country(db: &MongoDB, code: &str) -> Result<(), AppError> {
    let code = normalize_country_code(code);
    let result = db
        .collection::<Country>(database::COUNTRIES)
        .delete_one(doc! { "code": &code })
        .await?;

    if result.deleted_count == 0 {
        return Err(AppError::NotFound(format!("Country {}", code)));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn sample_country(code: &str, base_rate: f64, per_kg_rate: f64) -> Country {
    Country {
        id: None,
        code: code.to_string(),
        name: code.to_string(),
        dial_code: "+1".to_string(),
        currency: "USD".to_string(),
        base_rate,
        per_kg_rate,
        express_multiplier: 1.5,
        is_active: true,
        created_at: 0,
        updated_at: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_price() {
        let price = base_price(&sample_country("US", 10.0, 2.5), 4.0, ServiceType::Standard).unwrap();
        assert_eq!(price.base, 10.0);
        assert_eq!(price.weight_charge, 10.0);
        assert_eq!(price.express_surcharge, 0.0);
        assert_eq!(price.subtotal, 20.0);
        assert_eq!(price.currency, "USD");
    }

    #[test]
    fn express_applies_multiplier() {
        let price = base_price(&sample_country("US", 10.0, 2.5), 4.0, ServiceType::Express).unwrap();
        assert_eq!(price.express_surcharge, 10.0);
        assert_eq!(price.subtotal, 30.0);
    }

    #[test]
    fn prices_round_to_cents() {
        let price = base_price(&sample_country("GB", 3.333, 1.111), 1.5, ServiceType::Standard).unwrap();
        assert_eq!(price.base, 3.33);
        assert_eq!(price.weight_charge, 1.67);
        assert_eq!(price.subtotal, 5.0);
    }

    #[test]
    fn weight_bounds() {
        let country = sample_country("US", 10.0, 2.5);
        assert!(base_price(&country, 0.0, ServiceType::Standard).is_err());
        assert!(base_price(&country, -1.0, ServiceType::Standard).is_err());
        assert!(base_price(&country, f64::NAN, ServiceType::Standard).is_err());
        assert!(base_price(&country, 1000.0, ServiceType::Standard).is_ok());
        assert!(base_price(&country, 1000.01, ServiceType::Standard).is_err());
    }

    #[test]
    fn update_doc_only_sets_given_fields() {
        let set = country_update_doc(&UpdateCountryRequest {
            currency: Some(" eur ".into()),
            is_active: Some(false),
            ..Default::default()
        });
        assert_eq!(set.get_str("currency").unwrap(), "EUR");
        assert_eq!(set.get_bool("is_active").unwrap(), false);
        assert!(set.get("base_rate").is_none());
        assert!(set.contains_key("updated_at"));
    }

    #[test]
    fn rates_are_validated() {
        assert!(validate_rates(1.0, 1.0, 1.0).is_ok());
        assert!(validate_rates(-1.0, 1.0, 1.5).is_err());
        assert!(validate_rates(1.0, 1.0, 0.5).is_err());
    }
}
