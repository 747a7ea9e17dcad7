use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use mongodb::bson::{doc, Document};

use crate::utils::error::AppError;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Intervalo opcional em epoch millis, limites inclusivos
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DateRange {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

impl DateRange {
    /// Accepts RFC 3339 or `YYYY-MM-DD`. A bare `to` date covers that whole day.
    pub fn parse(from: Option<&str>, to: Option<&str>) -> Result<Self, AppError> {
        let from = from
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| parse_bound(raw, "from", false))
            .transpose()?;
        let to = to
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| parse_bound(raw, "to", true))
            .transpose()?;

        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(AppError::validation("from", "must not be after 'to'"));
            }
        }
        Ok(Self { from, to })
    }

    pub fn is_empty(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// `{ field: { $gte, $lte } }`, or an empty document when unbounded.
    pub fn filter(&self, field: &str) -> Document {
        let mut bounds = Document::new();
        if let Some(from) = self.from {
            bounds.insert("$gte", from);
        }
        if let Some(to) = self.to {
            bounds.insert("$lte", to);
        }
        if bounds.is_empty() {
            Document::new()
        } else {
            doc! { field: bounds }
        }
    }
}

fn parse_bound(raw: &str, field: &str, end_of_day: bool) -> Result<i64, AppError> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.timestamp_millis());
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::validation(field, "must be RFC 3339 or YYYY-MM-DD"))?;
    let start = date.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
    Ok(if end_of_day { start + DAY_MS - 1 } else { start })
}

/// Start of the current UTC day, in millis.
pub fn start_of_today() -> i64 {
    Utc::now()
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc()
        .timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_dates_cover_whole_days() {
        let range = DateRange::parse(Some("2024-03-01"), Some("2024-03-01")).unwrap();
        assert_eq!(range.from, Some(1_709_251_200_000));
        assert_eq!(range.to, Some(1_709_251_200_000 + DAY_MS - 1));
    }

    #[test]
    fn rfc3339_is_exact() {
        let range = DateRange::parse(Some("2024-03-01T12:00:00Z"), None).unwrap();
        assert_eq!(range.from, Some(1_709_294_400_000));
        assert_eq!(range.to, None);
    }

    #[test]
    fn bad_or_inverted_ranges_are_rejected() {
        assert!(matches!(
            DateRange::parse(Some("yesterday"), None),
            Err(AppError::Validation(_))
        ));
        assert!(DateRange::parse(Some("2024-03-02"), Some("2024-03-01")).is_err());
    }

    #[test]
    fn filter_shapes() {
        assert!(DateRange::default().filter("created_at").is_empty());

        let range = DateRange { from: Some(1), to: None };
        assert_eq!(range.filter("created_at"), doc! { "created_at": { "$gte": 1_i64 } });
    }
}
