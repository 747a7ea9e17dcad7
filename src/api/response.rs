use actix_web::HttpResponse;
use serde::Serialize;
use serde_json::Value;

use crate::utils::pagination::PageMeta;

/// Envelope padrão de todas as respostas da API
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub status: &'static str,
    pub message: String,
    pub data: Option<T>,
    pub meta: Option<Value>,
    pub timestamp: String,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: "success",
            message: message.into(),
            data: Some(data),
            meta: None,
            timestamp: now_rfc3339(),
        }
    }

    pub fn error(message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            status: "error",
            message: message.into(),
            data,
            meta: None,
            timestamp: now_rfc3339(),
        }
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn ok<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Ok().json(Envelope::success(message, data))
}

pub fn created<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Created().json(Envelope::success(message, data))
}

pub fn paginated<T: Serialize>(message: &str, data: Vec<T>, meta: PageMeta) -> HttpResponse {
    let meta = serde_json::to_value(meta).unwrap_or(Value::Null);
    HttpResponse::Ok().json(Envelope::success(message, data).with_meta(meta))
}

pub fn message(message: &str) -> HttpResponse {
    HttpResponse::Ok().json(Envelope::<Value>::success(message, Value::Null))
}
