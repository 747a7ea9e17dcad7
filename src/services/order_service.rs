use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};
use uuid::Uuid;

use crate::database::{self, MongoDB};
use crate::models::{
    now_millis, Action, AddTrackRequest, AddressSnapshot, CreateOrderRequest, NotificationKind, Order,
    OrderListQuery, OrderStatus, Party, PartyRequest, Pricing, QuoteRequest, Resource, Track, TrackEvent,
    TrackingInfo, UpdateOrderStatusRequest,
};
use crate::services::auth_service::Claims;
use crate::services::country_service::{self, round_cents};
use crate::services::notification_service::NotificationDispatcher;
use crate::services::{address_service, offer_service, permission_service};
use crate::utils::date_range::DateRange;
use crate::utils::pagination::{PageMeta, PaginationQuery};
use crate::utils::validation::{is_valid_email, normalize_country_code, normalize_phone, Validator};
use crate::utils::AppError;

pub const TRACKING_PREFIX: &str = "CR";
const TRACKING_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const TRACKING_SUFFIX_LEN: usize = 8;
const TRACKING_ATTEMPTS: usize = 3;

/// CR + yyMMdd + 8 caracteres alfanuméricos maiúsculos
pub fn generate_tracking_number(at: DateTime<Utc>) -> String {
    let suffix: String = Uuid::new_v4()
        .as_bytes()
        .iter()
        .take(TRACKING_SUFFIX_LEN)
        .map(|b| TRACKING_ALPHABET[*b as usize % TRACKING_ALPHABET.len()] as char)
        .collect();
    format!("{}{}{}", TRACKING_PREFIX, at.format("%y%m%d"), suffix)
}

pub fn is_tracking_number(candidate: &str) -> bool {
    candidate.len() == TRACKING_PREFIX.len() + 6 + TRACKING_SUFFIX_LEN
        && candidate.starts_with(TRACKING_PREFIX)
        && candidate[2..8].chars().all(|c| c.is_ascii_digit())
        && candidate[8..].bytes().all(|b| TRACKING_ALPHABET.contains(&b))
}

/// Full price of a shipment, offer included when one is given.
pub async fn quote(db: &MongoDB, request: &QuoteRequest) -> Result<Pricing, AppError> {
    country_service::find_active(db, &request.origin_country).await?;
    let destination = country_service::find_active(db, &request.destination_country).await?;
    let base = country_service::base_price(&destination, request.weight_kg, request.service_type)?;

    let discount = match request.offer_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) => {
            let offer = offer_service::find_by_code(db, code).await?;
            offer_service::quote_offer(&offer, base.subtotal, Some(&destination.code), now_millis())?.discount
        }
        None => 0.0,
    };

    Ok(Pricing {
        base: base.base,
        weight_charge: base.weight_charge,
        express_surcharge: base.express_surcharge,
        subtotal: base.subtotal,
        discount,
        total: round_cents(base.subtotal - discount),
        currency: base.currency,
    })
}

fn validate_party(party: &PartyRequest, prefix: &str) -> Validator {
    let mut validator = Validator::new();
    validator
        .required(&party.name, &format!("{}.name", prefix))
        .phone(&party.phone, &format!("{}.phone", prefix))
        .check(
            party.email.as_deref().map_or(true, is_valid_email),
            &format!("{}.email", prefix),
            "must be a valid email address",
        )
        .check(
            party.address_id.is_some() || party.address.is_some(),
            &format!("{}.address", prefix),
            "an address or address_id is required",
        );
    validator
}

/// Saved addresses must be the caller's own.
async fn resolve_party(db: &MongoDB, owner: ObjectId, party: &PartyRequest) -> Result<Party, AppError> {
    let address = match (&party.address_id, &party.address) {
        (Some(id), _) => {
            let saved = address_service::find_owned(db, owner, ObjectId::parse_str(id)?).await?;
            AddressSnapshot::from(&saved)
        }
        (None, Some(address)) => AddressSnapshot {
            country_code: normalize_country_code(&address.country_code),
            ..address.clone()
        },
        (None, None) => return Err(AppError::validation("address", "an address or address_id is required")),
    };

    if address.line1.trim().is_empty() || address.city.trim().is_empty() {
        return Err(AppError::validation("address", "line1 and city are required"));
    }

    Ok(Party {
        name: party.name.trim().to_string(),
        phone: normalize_phone(&party.phone)?,
        email: party.email.as_deref().map(|e| e.trim().to_lowercase()),
        address,
    })
}

pub async fn create_order(
    db: &MongoDB,
    dispatcher: &NotificationDispatcher,
    claims: &Claims,
    request: &CreateOrderRequest,
) -> Result<Order, AppError> {
    validate_party(&request.sender, "sender").finish()?;
    validate_party(&request.receiver, "receiver").finish()?;
    let parcel_count = request.parcel_count.unwrap_or(1);
    Validator::new()
        .check(parcel_count >= 1, "parcel_count", "must be at least 1")
        .check(
            request.declared_value.map_or(true, |v| v >= 0.0),
            "declared_value",
            "must not be negative",
        )
        .finish()?;

    claims.ensure_phone_owner(&request.sender.phone)?;
    let user_id = claims.user_id()?;

    let sender = resolve_party(db, user_id, &request.sender).await?;
    let receiver = resolve_party(db, user_id, &request.receiver).await?;

    let pricing = quote(
        db,
        &QuoteRequest {
            origin_country: sender.address.country_code.clone(),
            destination_country: receiver.address.country_code.clone(),
            weight_kg: request.weight_kg,
            service_type: request.service_type,
            offer_code: request.offer_code.clone(),
        },
    )
    .await?;

    let offer = match request.offer_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) => {
            let offer = offer_service::find_by_code(db, code).await?;
            offer_service::redeem(db, &offer).await?;
            Some(offer)
        }
        None => None,
    };

    let now = now_millis();
    let mut order = Order {
        id: None,
        user_id,
        tracking_number: String::new(),
        origin_country: sender.address.country_code.clone(),
        destination_country: receiver.address.country_code.clone(),
        sender,
        receiver,
        service_type: request.service_type,
        weight_kg: request.weight_kg,
        parcel_count,
        description: request.description.clone(),
        declared_value: request.declared_value,
        pricing,
        offer_code: offer.as_ref().map(|o| o.code.clone()),
        status: OrderStatus::Pending,
        pickup_id: None,
        delivered_at: None,
        created_at: now,
        updated_at: now,
    };

    if let Err(e) = insert_with_tracking_number(db, &mut order).await {
        if let Some(offer) = &offer {
            offer_service::release(db, offer).await;
        }
        return Err(e);
    }

    let order_id = order
        .id
        .ok_or_else(|| AppError::Internal("Inserted order has no id".to_string()))?;
    record_track(db, &order, order_id, OrderStatus::Pending, None, Some("Order created".into()), Some(user_id)).await?;

    log::info!("📦 Order {} created by {}", order.tracking_number, claims.email);
    dispatcher.notify(
        user_id,
        NotificationKind::Order,
        "Order created",
        &format!(
            "Your shipment {} to {} was created. Total {:.2} {}.",
            order.tracking_number, order.destination_country, order.pricing.total, order.pricing.currency
        ),
    );

    Ok(order)
}

/// Tracking numbers are random; a duplicate key just means try another.
async fn insert_with_tracking_number(db: &MongoDB, order: &mut Order) -> Result<(), AppError> {
    let collection = db.collection::<Order>(database::ORDERS);
    let mut last_error = None;

    for _ in 0..TRACKING_ATTEMPTS {
        order.tracking_number = generate_tracking_number(Utc::now());
        match collection.insert_one(&*order).await.map_err(AppError::from) {
            Ok(result) => {
                order.id = result.inserted_id.as_object_id();
                return Ok(());
            }
            Err(AppError::Conflict(_)) => {
                log::warn!("⚠️  Tracking number collision: {}", order.tracking_number);
                last_error = Some(AppError::Internal("Could not allocate a tracking number".to_string()));
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| AppError::Internal("Could not allocate a tracking number".to_string())))
}

async fn record_track(
    db: &MongoDB,
    order: &Order,
    order_id: ObjectId,
    status: OrderStatus,
    location: Option<String>,
    note: Option<String>,
    updated_by: Option<ObjectId>,
) -> Result<Track, AppError> {
    let mut track = Track {
        id: None,
        order_id,
        tracking_number: order.tracking_number.clone(),
        status,
        location,
        note,
        updated_by,
        created_at: now_millis(),
    };
    let result = db.collection::<Track>(database::TRACKS).insert_one(&track).await?;
    track.id = result.inserted_id.as_object_id();
    Ok(track)
}

/// Users only ever see their own orders; staff filters are honoured.
pub fn list_filter(claims: &Claims, query: &OrderListQuery) -> Result<Document, AppError> {
    let mut filter = if claims.is_staff() {
        match &query.user_id {
            Some(user_id) => doc! { "user_id": ObjectId::parse_str(user_id)? },
            None => doc! {},
        }
    } else {
        doc! { "user_id": claims.user_id()? }
    };

    if let Some(status) = query.status {
        filter.insert("status", status.as_str());
    }
    let range = DateRange::parse(query.from.as_deref(), query.to.as_deref())?;
    filter.extend(range.filter("created_at"));
    Ok(filter)
}

pub async fn list_orders(
    db: &MongoDB,
    claims: &Claims,
    query: &OrderListQuery,
) -> Result<(Vec<Order>, PageMeta), AppError> {
    if claims.is_staff() {
        permission_service::authorize(db, claims, Resource::Orders, Action::Read).await?;
    }

    let filter = list_filter(claims, query)?;
    let page = PaginationQuery { page: query.page, limit: query.limit };
    let collection = db.collection::<Order>(database::ORDERS);

    let total = collection.count_documents(filter.clone()).await?;
    let orders: Vec<Order> = collection
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .skip(page.skip())
        .limit(page.limit() as i64)
        .await?
        .try_collect()
        .await?;

    Ok((orders, page.meta(total)))
}

async fn find_order(db: &MongoDB, id: ObjectId) -> Result<Order, AppError> {
    db.collection::<Order>(database::ORDERS)
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))
}

/// Owner or staff with orders:read. Others get a 404, not a 403.
pub async fn get_order(db: &MongoDB, claims: &Claims, id: ObjectId) -> Result<Order, AppError> {
    let order = find_order(db, id).await?;
    if order.user_id == claims.user_id()? {
        return Ok(order);
    }
    if claims.is_staff() {
        permission_service::authorize(db, claims, Resource::Orders, Action::Read).await?;
        return Ok(order);
    }
    Err(AppError::NotFound("Order".to_string()))
}

/// Normalized phone, and whether reading it needs the staff orders grant.
fn phone_lookup(claims: &Claims, phone: &str) -> Result<(String, bool), AppError> {
    let phone = claims.ensure_phone_owner(phone)?;
    let needs_grant = claims.is_staff() && phone != claims.phone;
    Ok((phone, needs_grant))
}

pub async fn orders_by_phone(db: &MongoDB, claims: &Claims, phone: &str) -> Result<Vec<Order>, AppError> {
    let (phone, needs_grant) = phone_lookup(claims, phone)?;
    if needs_grant {
        permission_service::authorize(db, claims, Resource::Orders, Action::Read).await?;
    }
    Ok(db
        .collection::<Order>(database::ORDERS)
        .find(doc! { "$or": [ { "sender.phone": &phone }, { "receiver.phone": &phone } ] })
        .sort(doc! { "created_at": -1 })
        .limit(100)
        .await?
        .try_collect()
        .await?)
}

fn transition_error(from: OrderStatus, to: OrderStatus) -> AppError {
    if from.is_terminal() {
        return AppError::validation("status", format!("order is already {}", from));
    }
    AppError::validation("status", format!("cannot move an order from {} to {}", from, to))
}

/// Applies a legal transition, appends the track event and notifies the owner.
async fn apply_status(
    db: &MongoDB,
    dispatcher: &NotificationDispatcher,
    order: Order,
    next: OrderStatus,
    location: Option<String>,
    note: Option<String>,
    updated_by: ObjectId,
) -> Result<Order, AppError> {
    if !order.status.can_transition_to(next) {
        return Err(transition_error(order.status, next));
    }
    let order_id = order
        .id
        .ok_or_else(|| AppError::Internal("Order without id".to_string()))?;

    let now = now_millis();
    let mut set = doc! { "status": next.as_str(), "updated_at": now };
    if next == OrderStatus::Delivered {
        set.insert("delivered_at", now);
    }

    // o filtro inclui o status atual: duas atualizações concorrentes não passam as duas
    let updated = db
        .collection::<Order>(database::ORDERS)
        .find_one_and_update(
            doc! { "_id": order_id, "status": order.status.as_str() },
            doc! { "$set": set },
        )
        .return_document(mongodb::options::ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::Conflict("Order status changed concurrently, reload and retry".to_string()))?;

    record_track(db, &updated, order_id, next, location, note, Some(updated_by)).await?;

    log::info!("🚚 Order {}: {} -> {}", updated.tracking_number, order.status, next);
    dispatcher.notify(
        updated.user_id,
        NotificationKind::Order,
        "Shipment update",
        &format!("Shipment {} is now {}.", updated.tracking_number, next.as_str().replace('_', " ")),
    );

    Ok(updated)
}

pub async fn update_status(
    db: &MongoDB,
    dispatcher: &NotificationDispatcher,
    claims: &Claims,
    id: ObjectId,
    request: &UpdateOrderStatusRequest,
) -> Result<Order, AppError> {
    permission_service::authorize(db, claims, Resource::Orders, Action::Write).await?;
    let order = find_order(db, id).await?;
    apply_status(
        db,
        dispatcher,
        order,
        request.status,
        request.location.clone(),
        request.note.clone(),
        claims.user_id()?,
    )
    .await
}

/// Someone else's order is a 404; a collected parcel is a 409.
fn ensure_owner_can_cancel(owner: ObjectId, status: OrderStatus, caller: ObjectId) -> Result<(), AppError> {
    if owner != caller {
        return Err(AppError::NotFound("Order".to_string()));
    }
    if !status.is_cancellable_by_owner() {
        return Err(AppError::Conflict(format!("An order that is {} can no longer be cancelled", status)));
    }
    Ok(())
}

pub async fn cancel_order(
    db: &MongoDB,
    dispatcher: &NotificationDispatcher,
    claims: &Claims,
    id: ObjectId,
) -> Result<Order, AppError> {
    let user_id = claims.user_id()?;
    let order = find_order(db, id).await?;
    ensure_owner_can_cancel(order.user_id, order.status, user_id)?;
    apply_status(
        db,
        dispatcher,
        order,
        OrderStatus::Cancelled,
        None,
        Some("Cancelled by customer".into()),
        user_id,
    )
    .await
}

pub async fn delete_order(db: &MongoDB, claims: &Claims, id: ObjectId) -> Result<(), AppError> {
    permission_service::authorize(db, claims, Resource::Orders, Action::Delete).await?;

    let order = db
        .collection::<Order>(database::ORDERS)
        .find_one_and_delete(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

    let tracks = db
        .collection::<Track>(database::TRACKS)
        .delete_many(doc! { "order_id": id })
        .await?;

    log::info!(
        "🗑️  Order {} deleted by {} ({} track events)",
        order.tracking_number,
        claims.email,
        tracks.deleted_count
    );
    Ok(())
}

async fn find_by_tracking_number(db: &MongoDB, tracking_number: &str) -> Result<Order, AppError> {
    let tracking_number = tracking_number.trim().to_uppercase();
    if !is_tracking_number(&tracking_number) {
        return Err(AppError::NotFound(format!("Shipment {}", tracking_number)));
    }
    db.collection::<Order>(database::ORDERS)
        .find_one(doc! { "tracking_number": &tracking_number })
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Shipment {}", tracking_number)))
}

/// Public view: status and events, no names, phones or addresses.
pub async fn tracking_info(db: &MongoDB, tracking_number: &str) -> Result<TrackingInfo, AppError> {
    let order = find_by_tracking_number(db, tracking_number).await?;

    let events: Vec<Track> = db
        .collection::<Track>(database::TRACKS)
        .find(doc! { "order_id": order.id })
        .sort(doc! { "created_at": 1 })
        .await?
        .try_collect()
        .await?;

    Ok(TrackingInfo {
        tracking_number: order.tracking_number,
        status: order.status,
        origin_country: order.origin_country,
        destination_country: order.destination_country,
        service_type: order.service_type,
        parcel_count: order.parcel_count,
        created_at: order.created_at,
        delivered_at: order.delivered_at,
        events: events.into_iter().map(TrackEvent::from).collect(),
    })
}

pub async fn add_track(
    db: &MongoDB,
    dispatcher: &NotificationDispatcher,
    claims: &Claims,
    tracking_number: &str,
    request: &AddTrackRequest,
) -> Result<Order, AppError> {
    permission_service::authorize(db, claims, Resource::Tracks, Action::Write).await?;
    let order = find_by_tracking_number(db, tracking_number).await?;
    apply_status(
        db,
        dispatcher,
        order,
        request.status,
        request.location.clone(),
        request.note.clone(),
        claims.user_id()?,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::services::auth_service::TokenType;
    use chrono::TimeZone;

    fn claims(role: Role) -> Claims {
        Claims {
            sub: ObjectId::new().to_hex(),
            email: "ada@example.com".into(),
            name: "Ada".into(),
            role,
            phone: "+15550100200".into(),
            token_type: TokenType::Access,
            iat: 0,
            exp: 0,
            jti: "test".into(),
            aud: "courier-api".into(),
            iss: "courier-service".into(),
        }
    }

    fn party(address_id: Option<&str>) -> PartyRequest {
        PartyRequest {
            name: "Ada".into(),
            phone: "+1 555 010 0200".into(),
            email: None,
            address_id: address_id.map(String::from),
            address: None,
        }
    }

    #[test]
    fn tracking_number_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap();
        let number = generate_tracking_number(at);
        assert_eq!(number.len(), 16);
        assert!(number.starts_with("CR240309"));
        assert!(is_tracking_number(&number), "{}", number);
        assert_ne!(number, generate_tracking_number(at));
    }

    #[test]
    fn tracking_number_recognition() {
        assert!(is_tracking_number("CR240309AB12CD34"));
        assert!(!is_tracking_number("CR240309ab12cd34"));
        assert!(!is_tracking_number("XX240309AB12CD34"));
        assert!(!is_tracking_number("CR24AB09AB12CD34"));
        assert!(!is_tracking_number("CR240309AB12"));
    }

    #[test]
    fn party_needs_an_address() {
        assert!(validate_party(&party(None), "sender").finish().is_err());
        assert!(validate_party(&party(Some("65f000000000000000000000")), "sender").finish().is_ok());
    }

    #[test]
    fn users_are_scoped_to_their_orders() {
        let user = claims(Role::User);
        let query = OrderListQuery {
            user_id: Some(ObjectId::new().to_hex()),
            status: Some(OrderStatus::Pending),
            ..Default::default()
        };
        let filter = list_filter(&user, &query).unwrap();
        assert_eq!(filter.get_object_id("user_id").unwrap(), user.user_id().unwrap());
        assert_eq!(filter.get_str("status").unwrap(), "pending");
    }

    #[test]
    fn staff_filters_are_honoured() {
        let staff = claims(Role::Moderator);
        let other = ObjectId::new();
        let query = OrderListQuery {
            user_id: Some(other.to_hex()),
            from: Some("2024-01-01".into()),
            ..Default::default()
        };
        let filter = list_filter(&staff, &query).unwrap();
        assert_eq!(filter.get_object_id("user_id").unwrap(), other);
        assert!(filter.get_document("created_at").unwrap().contains_key("$gte"));

        let everything = list_filter(&staff, &OrderListQuery::default()).unwrap();
        assert!(everything.is_empty());
    }

    #[test]
    fn owners_cancel_only_before_collection() {
        let owner = ObjectId::new();
        assert!(ensure_owner_can_cancel(owner, OrderStatus::Pending, owner).is_ok());
        assert!(ensure_owner_can_cancel(owner, OrderStatus::Confirmed, owner).is_ok());

        for status in [OrderStatus::PickedUp, OrderStatus::InTransit, OrderStatus::Delivered, OrderStatus::Cancelled] {
            assert!(
                matches!(ensure_owner_can_cancel(owner, status, owner), Err(AppError::Conflict(_))),
                "{}",
                status
            );
        }

        // pedido de outro usuário nem aparece
        assert!(matches!(
            ensure_owner_can_cancel(owner, OrderStatus::Pending, ObjectId::new()),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn phone_lookup_by_staff_needs_the_orders_grant() {
        let user = claims(Role::User);
        assert_eq!(phone_lookup(&user, "+1 (555) 010-0200").unwrap(), ("+15550100200".to_string(), false));
        assert!(matches!(phone_lookup(&user, "+15550199999"), Err(AppError::Forbidden(_))));

        let moderator = claims(Role::Moderator);
        assert_eq!(phone_lookup(&moderator, "+15550199999").unwrap(), ("+15550199999".to_string(), true));
        // o próprio telefone dispensa o grant
        assert!(!phone_lookup(&moderator, "+15550100200").unwrap().1);

        // moderador sem grant de orders:read é barrado por authorize
        assert!(!permission_service::is_allowed(Role::Moderator, &[], Resource::Orders, Action::Read));
    }

    #[test]
    fn invalid_transitions_are_validation_errors() {
        assert!(matches!(
            transition_error(OrderStatus::Pending, OrderStatus::Delivered),
            AppError::Validation(_)
        ));
    }
}
