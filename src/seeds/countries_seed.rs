use crate::database::{self, MongoDB};
use crate::models::{Country, CountryRequest};
use crate::services::country_service;
use mongodb::bson::doc;

/// Seed dos destinos padrão. Não altera países já cadastrados (nem os desativados).
pub async fn seed_default_countries(db: &MongoDB) {
    let collection = db.collection::<Country>(database::COUNTRIES);
    let mut inserted = 0;

    for request in default_countries() {
        let exists = collection
            .count_documents(doc! { "code": &request.code })
            .await
            .unwrap_or(0)
            > 0;
        if exists {
            continue;
        }

        match country_service::create_country(db, &request).await {
            Ok(_) => inserted += 1,
            Err(e) => log::error!("   ❌ Failed to seed country {}: {}", request.code, e),
        }
    }

    if inserted > 0 {
        log::info!("🌍 Countries: seeded {} default destinations", inserted);
    } else {
        log::info!("🌍 Countries: defaults already in DB, skipping seed");
    }
}

fn country(code: &str, name: &str, dial_code: &str, currency: &str, base_rate: f64, per_kg_rate: f64) -> CountryRequest {
    CountryRequest {
        code: code.into(),
        name: name.into(),
        dial_code: dial_code.into(),
        currency: currency.into(),
        base_rate,
        per_kg_rate,
        express_multiplier: Some(1.5),
        is_active: Some(true),
    }
}

fn default_countries() -> Vec<CountryRequest> {
    vec![
        country("US", "United States", "+1", "USD", 12.0, 4.5),
        country("CA", "Canada", "+1", "CAD", 14.0, 5.0),
        country("GB", "United Kingdom", "+44", "GBP", 15.0, 5.5),
        country("DE", "Germany", "+49", "EUR", 15.0, 5.0),
        country("FR", "France", "+33", "EUR", 15.0, 5.0),
        country("IN", "India", "+91", "INR", 10.0, 3.5),
        country("BR", "Brazil", "+55", "BRL", 18.0, 6.0),
        country("AE", "United Arab Emirates", "+971", "AED", 16.0, 5.5),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_unique_codes_and_sane_rates() {
        let countries = default_countries();
        let mut codes: Vec<&str> = countries.iter().map(|c| c.code.as_str()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), countries.len());
        assert!(countries.iter().all(|c| c.base_rate > 0.0 && c.per_kg_rate > 0.0));
    }
}
