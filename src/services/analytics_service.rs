//! Aggregation pipelines behind the staff analytics endpoints.
//!
//! Builders are pure functions returning `Vec<Document>` so their shape can be
//! tested without a database; `run_pipeline` executes one and converts the
//! result to relaxed extended JSON for the envelope.

use futures::stream::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::database::{self, MongoDB};
use crate::models::{Action, OrderStatus, PickupStatus, Resource};
use crate::services::auth_service::Claims;
use crate::services::permission_service;
use crate::utils::date_range::{start_of_today, DateRange};
use crate::utils::AppError;

pub const DEFAULT_TOP_LIMIT: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Day,
    Week,
    Month,
}

impl Granularity {
    /// `$dateToString` format of a bucket key.
    pub fn date_format(&self) -> &'static str {
        match self {
            Granularity::Day => "%Y-%m-%d",
            Granularity::Week => "%G-W%V",
            Granularity::Month => "%Y-%m",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyticsQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub granularity: Option<Granularity>,
    pub limit: Option<i64>,
}

impl AnalyticsQuery {
    pub fn range(&self) -> Result<DateRange, AppError> {
        DateRange::parse(self.from.as_deref(), self.to.as_deref())
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity.unwrap_or_default()
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_TOP_LIMIT).clamp(1, 100)
    }
}

fn not_cancelled() -> Document {
    doc! { "$ne": ["$status", OrderStatus::Cancelled.as_str()] }
}

/// Valor que entra na receita: zero para pedidos cancelados
fn billable(field: &str) -> Document {
    doc! { "$cond": [not_cancelled(), field, 0] }
}

fn date_bucket(granularity: Granularity) -> Document {
    doc! {
        "$dateToString": {
            "format": granularity.date_format(),
            "date": { "$toDate": "$created_at" },
            "timezone": "UTC",
        }
    }
}

fn round2(expr: impl Into<Bson>) -> Document {
    doc! { "$round": [expr.into(), 2] }
}

fn match_stage(mut filter: Document, range: &DateRange) -> Document {
    filter.extend(range.filter("created_at"));
    doc! { "$match": filter }
}

pub fn overview_pipeline(range: &DateRange, today_start: i64) -> Vec<Document> {
    // o intervalo vale para totals/by_status; today ignora o `to` informado
    let totals_in_range = match_stage(Document::new(), range);
    let status_in_range = match_stage(Document::new(), range);
    vec![
        doc! {
            "$facet": {
                "totals": [
                    totals_in_range,
                    { "$group": {
                        "_id": null,
                        "orders": { "$sum": 1 },
                        "billable_orders": { "$sum": { "$cond": [not_cancelled(), 1, 0] } },
                        "revenue": { "$sum": billable("$pricing.total") },
                        "discounts": { "$sum": billable("$pricing.discount") },
                        "weight_kg": { "$sum": "$weight_kg" },
                    }},
                    { "$project": {
                        "_id": 0,
                        "orders": 1,
                        "revenue": round2("$revenue"),
                        "discounts": round2("$discounts"),
                        "weight_kg": round2("$weight_kg"),
                        "average_order_value": round2(doc! {
                            "$cond": [
                                { "$gt": ["$billable_orders", 0] },
                                { "$divide": ["$revenue", "$billable_orders"] },
                                0
                            ]
                        }),
                    }},
                ],
                "by_status": [
                    status_in_range,
                    { "$group": { "_id": "$status", "count": { "$sum": 1 } } },
                    { "$project": { "_id": 0, "status": "$_id", "count": 1 } },
                    { "$sort": { "count": -1 } },
                ],
                "today": [
                    { "$match": { "created_at": { "$gte": today_start } } },
                    { "$group": {
                        "_id": null,
                        "orders": { "$sum": 1 },
                        "revenue": { "$sum": billable("$pricing.total") },
                    }},
                    { "$project": { "_id": 0, "orders": 1, "revenue": round2("$revenue") } },
                ],
            }
        },
        doc! {
            "$project": {
                "totals": { "$ifNull": [{ "$arrayElemAt": ["$totals", 0] }, {
                    "orders": 0, "revenue": 0, "discounts": 0, "weight_kg": 0, "average_order_value": 0,
                }]},
                "by_status": 1,
                "today": { "$ifNull": [{ "$arrayElemAt": ["$today", 0] }, { "orders": 0, "revenue": 0 }] },
            }
        },
    ]
}

/// Receita por período; pedidos cancelados ficam de fora
pub fn revenue_pipeline(range: &DateRange, granularity: Granularity) -> Vec<Document> {
    vec![
        match_stage(doc! { "status": { "$ne": OrderStatus::Cancelled.as_str() } }, range),
        doc! {
            "$group": {
                "_id": date_bucket(granularity),
                "orders": { "$sum": 1 },
                "revenue": { "$sum": "$pricing.total" },
                "subtotal": { "$sum": "$pricing.subtotal" },
                "discounts": { "$sum": "$pricing.discount" },
            }
        },
        doc! {
            "$project": {
                "_id": 0,
                "period": "$_id",
                "orders": 1,
                "revenue": round2("$revenue"),
                "subtotal": round2("$subtotal"),
                "discounts": round2("$discounts"),
            }
        },
        doc! { "$sort": { "period": 1 } },
    ]
}

pub fn orders_pipeline(range: &DateRange, granularity: Granularity) -> Vec<Document> {
    vec![
        match_stage(Document::new(), range),
        doc! {
            "$facet": {
                "by_status": [
                    { "$group": { "_id": "$status", "count": { "$sum": 1 } } },
                    { "$project": { "_id": 0, "status": "$_id", "count": 1 } },
                    { "$sort": { "count": -1 } },
                ],
                "by_service": [
                    { "$group": {
                        "_id": "$service_type",
                        "count": { "$sum": 1 },
                        "revenue": { "$sum": billable("$pricing.total") },
                        "avg_weight_kg": { "$avg": "$weight_kg" },
                    }},
                    { "$project": {
                        "_id": 0,
                        "service_type": "$_id",
                        "count": 1,
                        "revenue": round2("$revenue"),
                        "avg_weight_kg": round2("$avg_weight_kg"),
                    }},
                    { "$sort": { "count": -1 } },
                ],
                "timeline": [
                    { "$group": {
                        "_id": date_bucket(granularity),
                        "orders": { "$sum": 1 },
                        "delivered": { "$sum": { "$cond": [
                            { "$eq": ["$status", OrderStatus::Delivered.as_str()] }, 1, 0
                        ]}},
                        "cancelled": { "$sum": { "$cond": [not_cancelled(), 0, 1] } },
                    }},
                    { "$project": { "_id": 0, "period": "$_id", "orders": 1, "delivered": 1, "cancelled": 1 } },
                    { "$sort": { "period": 1 } },
                ],
            }
        },
    ]
}

pub fn countries_pipeline(range: &DateRange, limit: i64) -> Vec<Document> {
    vec![
        match_stage(Document::new(), range),
        doc! {
            "$group": {
                "_id": "$destination_country",
                "orders": { "$sum": 1 },
                "revenue": { "$sum": billable("$pricing.total") },
                "avg_weight_kg": { "$avg": "$weight_kg" },
            }
        },
        doc! {
            "$lookup": {
                "from": database::COUNTRIES,
                "localField": "_id",
                "foreignField": "code",
                "as": "country",
            }
        },
        doc! {
            "$project": {
                "_id": 0,
                "code": "$_id",
                "name": { "$ifNull": [{ "$arrayElemAt": ["$country.name", 0] }, "$_id"] },
                "currency": { "$arrayElemAt": ["$country.currency", 0] },
                "orders": 1,
                "revenue": round2("$revenue"),
                "avg_weight_kg": round2("$avg_weight_kg"),
            }
        },
        doc! { "$sort": { "orders": -1, "revenue": -1 } },
        doc! { "$limit": limit },
    ]
}

pub fn offers_pipeline(range: &DateRange, limit: i64) -> Vec<Document> {
    vec![
        match_stage(
            doc! {
                "offer_code": { "$ne": null },
                "status": { "$ne": OrderStatus::Cancelled.as_str() },
            },
            range,
        ),
        doc! {
            "$group": {
                "_id": "$offer_code",
                "redemptions": { "$sum": 1 },
                "discount_given": { "$sum": "$pricing.discount" },
                "revenue": { "$sum": "$pricing.total" },
            }
        },
        doc! {
            "$lookup": {
                "from": database::OFFERS,
                "localField": "_id",
                "foreignField": "code",
                "as": "offer",
            }
        },
        doc! { "$unwind": { "path": "$offer", "preserveNullAndEmptyArrays": true } },
        doc! {
            "$project": {
                "_id": 0,
                "code": "$_id",
                "title": "$offer.title",
                "discount_type": "$offer.discount_type",
                "discount_value": "$offer.discount_value",
                "is_active": "$offer.is_active",
                "usage_limit": "$offer.usage_limit",
                "redemptions": 1,
                "discount_given": round2("$discount_given"),
                "revenue": round2("$revenue"),
            }
        },
        doc! { "$sort": { "redemptions": -1 } },
        doc! { "$limit": limit },
    ]
}

pub fn users_pipeline(range: &DateRange, granularity: Granularity) -> Vec<Document> {
    vec![
        match_stage(Document::new(), range),
        doc! {
            "$facet": {
                "total": [{ "$count": "count" }],
                "signups": [
                    { "$group": { "_id": date_bucket(granularity), "count": { "$sum": 1 } } },
                    { "$project": { "_id": 0, "period": "$_id", "count": 1 } },
                    { "$sort": { "period": 1 } },
                ],
                "by_role": [
                    { "$group": { "_id": "$role", "count": { "$sum": 1 } } },
                    { "$project": { "_id": 0, "role": "$_id", "count": 1 } },
                    { "$sort": { "count": -1 } },
                ],
                "active": [
                    { "$group": { "_id": "$is_active", "count": { "$sum": 1 } } },
                    { "$project": { "_id": 0, "is_active": "$_id", "count": 1 } },
                ],
            }
        },
        doc! {
            "$project": {
                "total": { "$ifNull": [{ "$arrayElemAt": ["$total.count", 0] }, 0] },
                "signups": 1,
                "by_role": 1,
                "active": 1,
            }
        },
    ]
}

/// Executes a pipeline and returns its documents as JSON.
pub async fn run_pipeline(db: &MongoDB, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Value>, AppError> {
    let documents: Vec<Document> = db
        .collection::<Document>(collection)
        .aggregate(pipeline)
        .await?
        .try_collect()
        .await?;

    Ok(documents
        .into_iter()
        .map(|document| Bson::Document(document).into_relaxed_extjson())
        .collect())
}

/// `$facet` pipelines always yield exactly one document.
async fn run_single(db: &MongoDB, collection: &str, pipeline: Vec<Document>) -> Result<Value, AppError> {
    Ok(run_pipeline(db, collection, pipeline)
        .await?
        .into_iter()
        .next()
        .unwrap_or_else(|| json!({})))
}

async fn authorize(db: &MongoDB, claims: &Claims) -> Result<(), AppError> {
    permission_service::authorize(db, claims, Resource::Analytics, Action::Read).await
}

pub async fn overview(db: &MongoDB, claims: &Claims, query: &AnalyticsQuery) -> Result<Value, AppError> {
    authorize(db, claims).await?;
    let range = query.range()?;

    let orders = run_single(db, database::ORDERS, overview_pipeline(&range, start_of_today())).await?;

    let users = db.collection::<Document>(database::USERS);
    let total_users = users.count_documents(range.filter("created_at")).await?;
    let active_users = users.count_documents(doc! { "is_active": true }).await?;
    let open_pickups = db
        .collection::<Document>(database::PICKUPS)
        .count_documents(doc! {
            "status": { "$in": [PickupStatus::Requested.as_str(), PickupStatus::Scheduled.as_str()] }
        })
        .await?;

    Ok(json!({
        "range": { "from": range.from, "to": range.to },
        "orders": orders,
        "users": { "total": total_users, "active": active_users },
        "pickups": { "open": open_pickups },
    }))
}

pub async fn revenue(db: &MongoDB, claims: &Claims, query: &AnalyticsQuery) -> Result<Value, AppError> {
    authorize(db, claims).await?;
    let range = query.range()?;
    let granularity = query.granularity();

    let series = run_pipeline(db, database::ORDERS, revenue_pipeline(&range, granularity)).await?;
    let total: f64 = series.iter().filter_map(|point| point["revenue"].as_f64()).sum();

    Ok(json!({
        "granularity": granularity,
        "total_revenue": (total * 100.0).round() / 100.0,
        "series": series,
    }))
}

pub async fn orders(db: &MongoDB, claims: &Claims, query: &AnalyticsQuery) -> Result<Value, AppError> {
    authorize(db, claims).await?;
    let range = query.range()?;
    run_single(db, database::ORDERS, orders_pipeline(&range, query.granularity())).await
}

pub async fn countries(db: &MongoDB, claims: &Claims, query: &AnalyticsQuery) -> Result<Vec<Value>, AppError> {
    authorize(db, claims).await?;
    let range = query.range()?;
    run_pipeline(db, database::ORDERS, countries_pipeline(&range, query.limit())).await
}

pub async fn offers(db: &MongoDB, claims: &Claims, query: &AnalyticsQuery) -> Result<Vec<Value>, AppError> {
    authorize(db, claims).await?;
    let range = query.range()?;
    run_pipeline(db, database::ORDERS, offers_pipeline(&range, query.limit())).await
}

pub async fn users(db: &MongoDB, claims: &Claims, query: &AnalyticsQuery) -> Result<Value, AppError> {
    authorize(db, claims).await?;
    let range = query.range()?;
    run_single(db, database::USERS, users_pipeline(&range, query.granularity())).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage_names(pipeline: &[Document]) -> Vec<String> {
        pipeline
            .iter()
            .map(|stage| stage.keys().next().cloned().unwrap_or_default())
            .collect()
    }

    fn bounded() -> DateRange {
        DateRange { from: Some(1_000), to: Some(2_000) }
    }

    #[test]
    fn granularity_formats() {
        assert_eq!(Granularity::Day.date_format(), "%Y-%m-%d");
        assert_eq!(Granularity::Week.date_format(), "%G-W%V");
        assert_eq!(Granularity::Month.date_format(), "%Y-%m");

        let query: AnalyticsQuery = serde_json::from_value(json!({ "granularity": "month" })).unwrap();
        assert_eq!(query.granularity(), Granularity::Month);
        assert_eq!(AnalyticsQuery::default().granularity(), Granularity::Day);
    }

    #[test]
    fn match_stage_applies_range() {
        let pipeline = revenue_pipeline(&bounded(), Granularity::Day);
        let filter = pipeline[0].get_document("$match").unwrap();
        let created = filter.get_document("created_at").unwrap();
        assert_eq!(created.get_i64("$gte").unwrap(), 1_000);
        assert_eq!(created.get_i64("$lte").unwrap(), 2_000);
    }

    #[test]
    fn revenue_excludes_cancelled_orders() {
        let pipeline = revenue_pipeline(&DateRange::default(), Granularity::Week);
        assert_eq!(stage_names(&pipeline), vec!["$match", "$group", "$project", "$sort"]);

        let filter = pipeline[0].get_document("$match").unwrap();
        assert_eq!(filter.get_document("status").unwrap().get_str("$ne").unwrap(), "cancelled");
        assert!(filter.get("created_at").is_none());

        let bucket = pipeline[1].get_document("$group").unwrap().get_document("_id").unwrap();
        let format = bucket.get_document("$dateToString").unwrap().get_str("format").unwrap();
        assert_eq!(format, "%G-W%V");
    }

    #[test]
    fn overview_facets() {
        let pipeline = overview_pipeline(&DateRange::default(), 42);
        assert_eq!(stage_names(&pipeline), vec!["$facet", "$project"]);

        let facet = pipeline[0].get_document("$facet").unwrap();
        for key in ["totals", "by_status", "today"] {
            assert!(facet.contains_key(key), "missing facet {}", key);
        }
        let today = facet.get_array("today").unwrap();
        let since = today[0].as_document().unwrap().get_document("$match").unwrap();
        assert_eq!(since.get_document("created_at").unwrap().get_i64("$gte").unwrap(), 42);
    }

    #[test]
    fn overview_today_ignores_the_requested_range() {
        // `to` bem antes de hoje não pode zerar o "today"
        let pipeline = overview_pipeline(&bounded(), 5_000);
        let facet = pipeline[0].get_document("$facet").unwrap();

        for key in ["totals", "by_status"] {
            let first = facet.get_array(key).unwrap()[0].as_document().unwrap();
            let created = first.get_document("$match").unwrap().get_document("created_at").unwrap();
            assert_eq!(created.get_i64("$lte").unwrap(), 2_000, "{}", key);
        }

        let today = facet.get_array("today").unwrap()[0].as_document().unwrap();
        let created = today.get_document("$match").unwrap().get_document("created_at").unwrap();
        assert_eq!(created.get_i64("$gte").unwrap(), 5_000);
        assert!(created.get("$lte").is_none());
    }

    #[test]
    fn orders_facets() {
        let pipeline = orders_pipeline(&bounded(), Granularity::Month);
        let facet = pipeline[1].get_document("$facet").unwrap();
        let keys: Vec<_> = facet.keys().cloned().collect();
        assert_eq!(keys, vec!["by_status", "by_service", "timeline"]);
    }

    #[test]
    fn countries_join_and_sort() {
        let pipeline = countries_pipeline(&DateRange::default(), 5);
        assert_eq!(
            stage_names(&pipeline),
            vec!["$match", "$group", "$lookup", "$project", "$sort", "$limit"]
        );

        let lookup = pipeline[2].get_document("$lookup").unwrap();
        assert_eq!(lookup.get_str("from").unwrap(), "countries");
        assert_eq!(lookup.get_str("foreignField").unwrap(), "code");

        let sort = pipeline[4].get_document("$sort").unwrap();
        assert_eq!(sort.keys().next().unwrap(), "orders");
        assert_eq!(sort.get_i32("orders").unwrap(), -1);
        assert_eq!(pipeline[5].get_i64("$limit").unwrap(), 5);
    }

    #[test]
    fn offers_only_count_redeemed_orders() {
        let pipeline = offers_pipeline(&DateRange::default(), DEFAULT_TOP_LIMIT);
        let filter = pipeline[0].get_document("$match").unwrap();
        assert_eq!(filter.get_document("offer_code").unwrap().get("$ne"), Some(&Bson::Null));
        assert_eq!(pipeline[1].get_document("$group").unwrap().get_str("_id").unwrap(), "$offer_code");
        assert_eq!(pipeline[2].get_document("$lookup").unwrap().get_str("from").unwrap(), "offers");
    }

    #[test]
    fn users_facets() {
        let pipeline = users_pipeline(&DateRange::default(), Granularity::Day);
        let facet = pipeline[1].get_document("$facet").unwrap();
        for key in ["total", "signups", "by_role", "active"] {
            assert!(facet.contains_key(key), "missing facet {}", key);
        }
    }

    #[test]
    fn limits_are_clamped() {
        let query = AnalyticsQuery { limit: Some(10_000), ..Default::default() };
        assert_eq!(query.limit(), 100);
        assert_eq!(AnalyticsQuery::default().limit(), DEFAULT_TOP_LIMIT);
    }

    #[test]
    fn extjson_conversion_keeps_plain_numbers() {
        let value = Bson::Document(doc! { "orders": 3_i64, "revenue": 12.5 }).into_relaxed_extjson();
        assert_eq!(value, json!({ "orders": 3, "revenue": 12.5 }));
    }
}
