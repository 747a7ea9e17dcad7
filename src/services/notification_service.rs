use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};

use crate::config::NotificationConfig;
use crate::database::{self, MongoDB};
use crate::models::{
    now_millis, BroadcastRequest, Notification, NotificationKind, NotificationListQuery, User,
};
use crate::utils::pagination::{PageMeta, PaginationQuery};
use crate::utils::AppError;

/// Destinatário de uma notificação externa
#[derive(Debug, Clone)]
pub struct Recipient {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl From<&User> for Recipient {
    fn from(user: &User) -> Self {
        Recipient {
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
        }
    }
}

/// An outbound channel (email, SMS...).
#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> &'static str;

    async fn send(&self, recipient: &Recipient, title: &str, message: &str) -> Result<(), String>;
}

pub struct EmailNotifier {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    from: String,
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn channel(&self) -> &'static str {
        "email"
    }

    async fn send(&self, recipient: &Recipient, title: &str, message: &str) -> Result<(), String> {
        let mut request = self.client.post(&self.url).json(&serde_json::json!({
            "from": self.from,
            "to": recipient.email,
            "subject": title,
            "text": format!("Hi {},\n\n{}", recipient.name, message),
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| format!("Email request failed: {}", e))?;
        if !response.status().is_success() {
            return Err(format!("Email provider returned {}", response.status()));
        }
        Ok(())
    }
}

pub struct SmsNotifier {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    sender: String,
}

#[async_trait]
impl Notifier for SmsNotifier {
    fn channel(&self) -> &'static str {
        "sms"
    }

    async fn send(&self, recipient: &Recipient, title: &str, message: &str) -> Result<(), String> {
        let body = format!("{}: {}", title, message);
        let mut request = self.client.post(&self.url).form(&[
            ("to", recipient.phone.as_str()),
            ("from", self.sender.as_str()),
            ("message", body.as_str()),
        ]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| format!("SMS request failed: {}", e))?;
        if !response.status().is_success() {
            return Err(format!("SMS provider returned {}", response.status()));
        }
        Ok(())
    }
}

/// Used when a provider is not configured.
pub struct LogNotifier {
    channel: &'static str,
}

#[async_trait]
impl Notifier for LogNotifier {
    fn channel(&self) -> &'static str {
        self.channel
    }

    async fn send(&self, recipient: &Recipient, title: &str, _message: &str) -> Result<(), String> {
        log::debug!(
            "📭 {} provider not configured, skipping '{}' for {}",
            self.channel,
            title,
            recipient.name
        );
        Ok(())
    }
}

pub fn channels_from_config(config: &NotificationConfig) -> Vec<Arc<dyn Notifier>> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .unwrap_or_default();

    let email: Arc<dyn Notifier> = match &config.email_api_url {
        Some(url) => Arc::new(EmailNotifier {
            client: client.clone(),
            url: url.clone(),
            api_key: config.email_api_key.clone(),
            from: config.email_from.clone(),
        }),
        None => Arc::new(LogNotifier { channel: "email" }),
    };

    let sms: Arc<dyn Notifier> = match &config.sms_api_url {
        Some(url) => Arc::new(SmsNotifier {
            client,
            url: url.clone(),
            api_key: config.sms_api_key.clone(),
            sender: config.sms_sender.clone(),
        }),
        None => Arc::new(LogNotifier { channel: "sms" }),
    };

    vec![email, sms]
}

/// Sends through every channel, logging failures. Returns how many succeeded.
pub async fn fan_out(
    channels: &[Arc<dyn Notifier>],
    recipient: &Recipient,
    title: &str,
    message: &str,
) -> usize {
    let sends = channels.iter().map(|channel| async move {
        match channel.send(recipient, title, message).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("⚠️  {} notification to {} failed: {}", channel.channel(), recipient.name, e);
                false
            }
        }
    });

    futures::future::join_all(sends)
        .await
        .into_iter()
        .filter(|delivered| *delivered)
        .count()
}

/// Fire-and-forget dispatcher shared by the handlers.
#[derive(Clone)]
pub struct NotificationDispatcher {
    db: MongoDB,
    channels: Arc<Vec<Arc<dyn Notifier>>>,
}

impl NotificationDispatcher {
    pub fn new(db: MongoDB, channels: Vec<Arc<dyn Notifier>>) -> Self {
        Self {
            db,
            channels: Arc::new(channels),
        }
    }

    /// Never awaited by callers; errors end up in the log only.
    pub fn notify(&self, user_id: ObjectId, kind: NotificationKind, title: &str, message: &str) {
        let dispatcher = self.clone();
        let title = title.to_string();
        let message = message.to_string();

        tokio::spawn(async move {
            if let Err(e) = dispatcher.deliver(user_id, kind, &title, &message).await {
                log::warn!("⚠️  Notification '{}' for {} failed: {}", title, user_id, e);
            }
        });
    }

    async fn deliver(
        &self,
        user_id: ObjectId,
        kind: NotificationKind,
        title: &str,
        message: &str,
    ) -> Result<(), AppError> {
        let notification = Notification {
            id: None,
            user_id,
            kind,
            title: title.to_string(),
            message: message.to_string(),
            is_read: false,
            created_at: now_millis(),
        };
        self.db
            .collection::<Notification>(database::NOTIFICATIONS)
            .insert_one(&notification)
            .await?;

        let user = self
            .db
            .collection::<User>(database::USERS)
            .find_one(doc! { "_id": user_id, "is_active": true })
            .await?;

        if let Some(user) = user {
            let delivered = fan_out(&self.channels, &Recipient::from(&user), title, message).await;
            log::debug!("📨 '{}' delivered on {}/{} channels", title, delivered, self.channels.len());
        }

        Ok(())
    }
}

pub fn list_filter(user_id: ObjectId, query: &NotificationListQuery) -> Document {
    let mut filter = doc! { "user_id": user_id };
    if query.unread == Some(true) {
        filter.insert("is_read", false);
    }
    filter
}

pub async fn list_notifications(
    db: &MongoDB,
    user_id: ObjectId,
    query: &NotificationListQuery,
) -> Result<(Vec<Notification>, PageMeta), AppError> {
    let collection = db.collection::<Notification>(database::NOTIFICATIONS);
    let page = PaginationQuery { page: query.page, limit: query.limit };
    let filter = list_filter(user_id, query);

    let total = collection.count_documents(filter.clone()).await?;
    let notifications: Vec<Notification> = collection
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .skip(page.skip())
        .limit(page.limit() as i64)
        .await?
        .try_collect()
        .await?;

    Ok((notifications, page.meta(total)))
}

pub async fn unread_count(db: &MongoDB, user_id: ObjectId) -> Result<u64, AppError> {
    Ok(db
        .collection::<Notification>(database::NOTIFICATIONS)
        .count_documents(doc! { "user_id": user_id, "is_read": false })
        .await?)
}

pub async fn mark_read(db: &MongoDB, user_id: ObjectId, id: ObjectId) -> Result<(), AppError> {
    let result = db
        .collection::<Notification>(database::NOTIFICATIONS)
        .update_one(
            doc! { "_id": id, "user_id": user_id },
            doc! { "$set": { "is_read": true } },
        )
        .await?;

    if result.matched_count == 0 {
        return Err(AppError::NotFound("Notification".to_string()));
    }
    Ok(())
}

pub async fn mark_all_read(db: &MongoDB, user_id: ObjectId) -> Result<u64, AppError> {
    let result = db
        .collection::<Notification>(database::NOTIFICATIONS)
        .update_many(
            doc! { "user_id": user_id, "is_read": false },
            doc! { "$set": { "is_read": true } },
        )
        .await?;
    Ok(result.modified_count)
}

pub async fn delete_notification(db: &MongoDB, user_id: ObjectId, id: ObjectId) -> Result<(), AppError> {
    let result = db
        .collection::<Notification>(database::NOTIFICATIONS)
        .delete_one(doc! { "_id": id, "user_id": user_id })
        .await?;

    if result.deleted_count == 0 {
        return Err(AppError::NotFound("Notification".to_string()));
    }
    Ok(())
}

/// In-app only; a broadcast does not go out by email or SMS.
pub async fn broadcast(db: &MongoDB, request: &BroadcastRequest) -> Result<usize, AppError> {
    if request.title.trim().is_empty() || request.message.trim().is_empty() {
        return Err(AppError::validation("message", "title and message are required"));
    }

    let mut filter = doc! { "is_active": true };
    if let Some(role) = request.role {
        filter.insert("role", role.as_str());
    }

    let users: Vec<User> = db
        .collection::<User>(database::USERS)
        .find(filter)
        .await?
        .try_collect()
        .await?;

    let now = now_millis();
    let kind = request.kind.unwrap_or(NotificationKind::System);
    let notifications: Vec<Notification> = users
        .iter()
        .filter_map(|user| user.id)
        .map(|user_id| Notification {
            id: None,
            user_id,
            kind,
            title: request.title.clone(),
            message: request.message.clone(),
            is_read: false,
            created_at: now,
        })
        .collect();

    if notifications.is_empty() {
        return Ok(0);
    }

    let count = notifications.len();
    db.collection::<Notification>(database::NOTIFICATIONS)
        .insert_many(notifications)
        .await?;

    log::info!("📢 Broadcast '{}' to {} users", request.title, count);
    Ok(count)
}
