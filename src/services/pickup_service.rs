use chrono::{NaiveDate, Utc};
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};

use crate::database::{self, MongoDB};
use crate::models::{
    now_millis, Action, AddressSnapshot, CreatePickupRequest, NotificationKind, Order, Pickup, PickupListQuery,
    PickupStatus, Resource, StaffUpdatePickupRequest, User,
};
use crate::services::auth_service::Claims;
use crate::services::notification_service::NotificationDispatcher;
use crate::services::{address_service, permission_service};
use crate::utils::pagination::{PageMeta, PaginationQuery};
use crate::utils::AppError;

/// Valida a data agendada: formato YYYY-MM-DD e não no passado
pub fn parse_pickup_date(raw: &str, today: NaiveDate) -> Result<NaiveDate, AppError> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::validation("scheduled_date", "must be YYYY-MM-DD"))?;
    if date < today {
        return Err(AppError::validation("scheduled_date", "must not be in the past"));
    }
    Ok(date)
}

fn parse_ids(raw: &[String]) -> Result<Vec<ObjectId>, AppError> {
    let mut ids = Vec::with_capacity(raw.len());
    for id in raw {
        let id = ObjectId::parse_str(id)?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

pub async fn create_pickup(
    db: &MongoDB,
    dispatcher: &NotificationDispatcher,
    claims: &Claims,
    request: &CreatePickupRequest,
) -> Result<Pickup, AppError> {
    let user_id = claims.user_id()?;
    let phone = claims.ensure_phone_owner(&request.phone)?;
    let date = parse_pickup_date(&request.scheduled_date, Utc::now().date_naive())?;
    if request.parcel_count < 1 {
        return Err(AppError::validation("parcel_count", "must be at least 1"));
    }

    let address_id = ObjectId::parse_str(&request.address_id)?;
    let address = address_service::find_owned(db, user_id, address_id).await?;

    let order_ids = parse_ids(request.order_ids.as_deref().unwrap_or_default())?;
    if !order_ids.is_empty() {
        let owned = db
            .collection::<Order>(database::ORDERS)
            .count_documents(doc! { "_id": { "$in": order_ids.clone() }, "user_id": user_id })
            .await?;
        if owned != order_ids.len() as u64 {
            return Err(AppError::validation("order_ids", "every order must belong to you"));
        }
    }

    let now = now_millis();
    let mut pickup = Pickup {
        id: None,
        user_id,
        address_id,
        address: AddressSnapshot::from(&address),
        phone,
        scheduled_date: date.format("%Y-%m-%d").to_string(),
        time_slot: request.time_slot.clone(),
        parcel_count: request.parcel_count,
        status: PickupStatus::Requested,
        assigned_to: None,
        notes: request.notes.clone(),
        order_ids,
        created_at: now,
        updated_at: now,
    };

    let result = db
        .collection::<Pickup>(database::PICKUPS)
        .insert_one(&pickup)
        .await?;
    pickup.id = result.inserted_id.as_object_id();

    if !pickup.order_ids.is_empty() {
        db.collection::<Order>(database::ORDERS)
            .update_many(
                doc! { "_id": { "$in": pickup.order_ids.clone() } },
                doc! { "$set": { "pickup_id": pickup.id, "updated_at": now } },
            )
            .await?;
    }

    log::info!("🛻 Pickup requested by {} for {}", claims.email, pickup.scheduled_date);
    dispatcher.notify(
        user_id,
        NotificationKind::Pickup,
        "Pickup requested",
        &format!(
            "We received your pickup request for {} ({} parcel(s)).",
            pickup.scheduled_date, pickup.parcel_count
        ),
    );

    Ok(pickup)
}

pub fn list_filter(user_id: Option<ObjectId>, query: &PickupListQuery) -> Document {
    let mut filter = match user_id {
        Some(user_id) => doc! { "user_id": user_id },
        None => doc! {},
    };
    if let Some(status) = query.status {
        filter.insert("status", status.as_str());
    }
    if let Some(date) = query.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        filter.insert("scheduled_date", date);
    }
    filter
}

/// Staff with pickups:read see every pickup; everyone else their own.
pub async fn list_pickups(
    db: &MongoDB,
    claims: &Claims,
    query: &PickupListQuery,
) -> Result<(Vec<Pickup>, PageMeta), AppError> {
    let owner = if claims.is_staff() {
        permission_service::authorize(db, claims, Resource::Pickups, Action::Read).await?;
        None
    } else {
        Some(claims.user_id()?)
    };

    let filter = list_filter(owner, query);
    let page = PaginationQuery { page: query.page, limit: query.limit };
    let collection = db.collection::<Pickup>(database::PICKUPS);

    let total = collection.count_documents(filter.clone()).await?;
    let pickups: Vec<Pickup> = collection
        .find(filter)
        .sort(doc! { "scheduled_date": -1, "created_at": -1 })
        .skip(page.skip())
        .limit(page.limit() as i64)
        .await?
        .try_collect()
        .await?;

    Ok((pickups, page.meta(total)))
}

async fn find_pickup(db: &MongoDB, id: ObjectId) -> Result<Pickup, AppError> {
    db.collection::<Pickup>(database::PICKUPS)
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::NotFound("Pickup".to_string()))
}

pub async fn get_pickup(db: &MongoDB, claims: &Claims, id: ObjectId) -> Result<Pickup, AppError> {
    let pickup = find_pickup(db, id).await?;
    if pickup.user_id == claims.user_id()? {
        return Ok(pickup);
    }
    if claims.is_staff() {
        permission_service::authorize(db, claims, Resource::Pickups, Action::Read).await?;
        return Ok(pickup);
    }
    Err(AppError::NotFound("Pickup".to_string()))
}

fn check_transition(from: PickupStatus, next: PickupStatus) -> Result<(), AppError> {
    if !from.can_transition_to(next) {
        return Err(AppError::validation(
            "status",
            format!("cannot move a pickup from {} to {}", from.as_str(), next.as_str()),
        ));
    }
    Ok(())
}

/// Moves a pickup to `next` only if nobody changed its status in between.
async fn transition(
    db: &MongoDB,
    pickup: &Pickup,
    next: PickupStatus,
    mut set: Document,
) -> Result<Pickup, AppError> {
    check_transition(pickup.status, next)?;
    set.insert("status", next.as_str());
    set.insert("updated_at", now_millis());

    db.collection::<Pickup>(database::PICKUPS)
        .find_one_and_update(
            doc! { "_id": pickup.id, "status": pickup.status.as_str() },
            doc! { "$set": set },
        )
        .return_document(mongodb::options::ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::Conflict("Pickup changed concurrently, reload and retry".to_string()))
}

pub async fn cancel_pickup(
    db: &MongoDB,
    dispatcher: &NotificationDispatcher,
    claims: &Claims,
    id: ObjectId,
) -> Result<Pickup, AppError> {
    let user_id = claims.user_id()?;
    let pickup = find_pickup(db, id).await?;
    if pickup.user_id != user_id {
        return Err(AppError::NotFound("Pickup".to_string()));
    }
    if !pickup.status.is_open() {
        return Err(AppError::Conflict(format!(
            "A pickup that is {} can no longer be cancelled",
            pickup.status.as_str()
        )));
    }

    let cancelled = transition(db, &pickup, PickupStatus::Cancelled, Document::new()).await?;
    dispatcher.notify(
        user_id,
        NotificationKind::Pickup,
        "Pickup cancelled",
        &format!("Your pickup for {} was cancelled.", cancelled.scheduled_date),
    );
    Ok(cancelled)
}

/// Campos de agenda/responsável enviados pela equipe
fn schedule_doc(request: &StaffUpdatePickupRequest, today: NaiveDate) -> Result<Document, AppError> {
    let mut set = Document::new();
    if let Some(date) = &request.scheduled_date {
        set.insert("scheduled_date", parse_pickup_date(date, today)?.format("%Y-%m-%d").to_string());
    }
    if let Some(slot) = &request.time_slot {
        set.insert("time_slot", slot.trim());
    }
    if let Some(assignee) = &request.assigned_to {
        set.insert("assigned_to", ObjectId::parse_str(assignee)?);
    }
    Ok(set)
}

pub async fn staff_update(
    db: &MongoDB,
    dispatcher: &NotificationDispatcher,
    claims: &Claims,
    id: ObjectId,
    request: &StaffUpdatePickupRequest,
) -> Result<Pickup, AppError> {
    permission_service::authorize(db, claims, Resource::Pickups, Action::Write).await?;
    let pickup = find_pickup(db, id).await?;
    let set = schedule_doc(request, Utc::now().date_naive())?;

    if let Ok(assignee) = set.get_object_id("assigned_to") {
        let staff = db
            .collection::<User>(database::USERS)
            .find_one(doc! { "_id": assignee, "is_active": true })
            .await?;
        if !staff.map_or(false, |user| user.role.is_staff()) {
            return Err(AppError::validation("assigned_to", "must be an active staff member"));
        }
    }

    let updated = match request.status {
        Some(next) if next != pickup.status => transition(db, &pickup, next, set).await?,
        _ => {
            if !pickup.status.is_open() {
                return Err(AppError::Conflict("Closed pickups cannot be rescheduled".to_string()));
            }
            let mut set = set;
            set.insert("updated_at", now_millis());
            db.collection::<Pickup>(database::PICKUPS)
                .find_one_and_update(doc! { "_id": id }, doc! { "$set": set })
                .return_document(mongodb::options::ReturnDocument::After)
                .await?
                .ok_or_else(|| AppError::NotFound("Pickup".to_string()))?
        }
    };

    log::info!(
        "🛻 Pickup {} updated by {}: {}",
        id,
        claims.email,
        updated.status.as_str()
    );
    if updated.status != pickup.status || updated.scheduled_date != pickup.scheduled_date {
        dispatcher.notify(
            updated.user_id,
            NotificationKind::Pickup,
            "Pickup update",
            &format!(
                "Your pickup is {} for {}.",
                updated.status.as_str(),
                updated.scheduled_date
            ),
        );
    }

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn staff_transitions_follow_the_table() {
        use PickupStatus::*;
        let all = [Requested, Scheduled, Completed, Cancelled];
        let legal = [(Requested, Scheduled), (Requested, Cancelled), (Scheduled, Completed), (Scheduled, Cancelled)];

        for from in all {
            for next in all {
                let result = check_transition(from, next);
                if legal.contains(&(from, next)) {
                    assert!(result.is_ok(), "{:?} -> {:?}", from, next);
                } else {
                    assert!(matches!(result, Err(AppError::Validation(_))), "{:?} -> {:?}", from, next);
                }
            }
        }
    }

    #[test]
    fn pickup_dates() {
        let today = day("2024-05-10");
        assert_eq!(parse_pickup_date("2024-05-10", today).unwrap(), today);
        assert_eq!(parse_pickup_date(" 2024-05-11 ", today).unwrap(), day("2024-05-11"));
        assert!(parse_pickup_date("2024-05-09", today).is_err());
        assert!(parse_pickup_date("10/05/2024", today).is_err());
    }

    #[test]
    fn duplicate_order_ids_collapse() {
        let id = ObjectId::new();
        let ids = parse_ids(&[id.to_hex(), id.to_hex()]).unwrap();
        assert_eq!(ids, vec![id]);
        assert!(matches!(parse_ids(&["nope".to_string()]), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn list_filter_scoping() {
        let user = ObjectId::new();
        let query = PickupListQuery {
            status: Some(PickupStatus::Scheduled),
            date: Some("2024-05-10".into()),
            ..Default::default()
        };
        let filter = list_filter(Some(user), &query);
        assert_eq!(filter.get_object_id("user_id").unwrap(), user);
        assert_eq!(filter.get_str("status").unwrap(), "scheduled");
        assert_eq!(filter.get_str("scheduled_date").unwrap(), "2024-05-10");

        assert!(list_filter(None, &PickupListQuery::default()).is_empty());
    }

    #[test]
    fn schedule_doc_validates_fields() {
        let today = day("2024-05-10");
        let request = StaffUpdatePickupRequest {
            scheduled_date: Some("2024-05-12".into()),
            time_slot: Some(" 09:00-12:00 ".into()),
            ..Default::default()
        };
        let set = schedule_doc(&request, today).unwrap();
        assert_eq!(set.get_str("scheduled_date").unwrap(), "2024-05-12");
        assert_eq!(set.get_str("time_slot").unwrap(), "09:00-12:00");

        let past = StaffUpdatePickupRequest {
            scheduled_date: Some("2024-05-01".into()),
            ..Default::default()
        };
        assert!(schedule_doc(&past, today).is_err());
    }
}
