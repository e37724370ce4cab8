use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::*;

use super::error::ApiError;

/// Accepts RFC 3339 instants. Offset-less `YYYY-MM-DDTHH:MM[:SS]` values, as
/// sent by HTML datetime-local inputs, are read as UTC.
pub(super) fn parse_instant(field: &str, value: &str) -> Result<Ms, ApiError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.timestamp_millis());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc().timestamp_millis())
        .ok_or_else(|| ApiError::BadRequest(format!("{field} is not a valid ISO-8601 instant")))
}

pub(super) fn instant(ms: Ms) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub(super) fn day_start(date: NaiveDate) -> Ms {
    date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp_millis()
}

// ── Requests ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub starttime: String,
    #[serde(default)]
    pub endtime: String,
    #[serde(default)]
    pub resource_id: String,
    #[serde(default)]
    pub owner_id: Option<String>,
}

impl CreateBookingRequest {
    /// The authenticated actor wins over a body-supplied owner.
    pub(super) fn into_draft(self, actor: Option<String>) -> Result<BookingDraft, ApiError> {
        // Title is reported before anything about the times.
        if self.title.trim().is_empty() {
            return Err(EngineError::InvalidInput("title required").into());
        }
        let start = parse_instant("starttime", &self.starttime)?;
        let end = parse_instant("endtime", &self.endtime)?;
        Ok(BookingDraft {
            resource_id: self.resource_id,
            start,
            end,
            title: self.title,
            details: non_blank(self.details),
            owner_id: actor.or(self.owner_id).unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookingRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub starttime: String,
    #[serde(default)]
    pub endtime: String,
}

impl UpdateBookingRequest {
    pub(super) fn into_amendment(self) -> Result<BookingAmendment, ApiError> {
        if self.title.trim().is_empty() {
            return Err(EngineError::InvalidInput("title required").into());
        }
        Ok(BookingAmendment {
            start: parse_instant("starttime", &self.starttime)?,
            end: parse_instant("endtime", &self.endtime)?,
            title: self.title,
            details: non_blank(self.details),
        })
    }
}

fn non_blank(details: Option<String>) -> Option<String> {
    details.filter(|d| !d.trim().is_empty())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ListQuery {
    pub resource_id: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl ListQuery {
    pub(super) fn scope(&self) -> ResourceScope {
        match &self.resource_id {
            Some(id) => ResourceScope::Resource(id.clone()),
            None => ResourceScope::All,
        }
    }

    pub(super) fn window(&self) -> Result<Option<Span>, ApiError> {
        match (&self.start, &self.end) {
            (None, None) => Ok(None),
            (Some(start), Some(end)) => window(start, end).map(Some),
            _ => Err(ApiError::BadRequest(
                "start and end must be given together".into(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct OccupantQuery {
    pub at: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct WindowQuery {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DayQuery {
    pub date: NaiveDate,
    pub slot_minutes: Option<u32>,
}

pub(super) fn window(start: &str, end: &str) -> Result<Span, ApiError> {
    let start = parse_instant("start", start)?;
    let end = parse_instant("end", end)?;
    Ok(Span::try_new(start, end)?)
}

// ── Responses ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    pub id: Ulid,
    pub resource_id: ResourceId,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub details: Option<String>,
    pub starttime: DateTime<Utc>,
    pub endtime: DateTime<Utc>,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<Booking> for BookingView {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id,
            resource_id: b.resource_id,
            title: b.title,
            details: b.details,
            starttime: instant(b.span.start),
            endtime: instant(b.span.end),
            owner_id: b.owner_id,
            created_at: instant(b.created_at),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpanView {
    pub starttime: DateTime<Utc>,
    pub endtime: DateTime<Utc>,
}

impl From<Span> for SpanView {
    fn from(span: Span) -> Self {
        Self {
            starttime: instant(span.start),
            endtime: instant(span.end),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    pub starttime: DateTime<Utc>,
    pub endtime: DateTime<Utc>,
    /// `booked`, `past` or `available`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub booking_id: Option<Ulid>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title: Option<String>,
}

impl From<Slot> for SlotView {
    fn from(slot: Slot) -> Self {
        let (status, booking_id, title) = match slot.status {
            SlotStatus::Booked { booking_id, title } => ("booked", Some(booking_id), Some(title)),
            SlotStatus::Past => ("past", None, None),
            SlotStatus::Available => ("available", None, None),
        };
        Self {
            starttime: instant(slot.span.start),
            endtime: instant(slot.span.end),
            status: status.into(),
            booking_id,
            title,
        }
    }
}

/// Payload of the per-resource event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventView {
    Created {
        booking: BookingView,
    },
    Amended {
        booking: BookingView,
    },
    Retracted {
        id: Ulid,
        #[serde(rename = "resourceId")]
        resource_id: ResourceId,
    },
}

impl EventView {
    pub fn kind(&self) -> &'static str {
        match self {
            EventView::Created { .. } => "created",
            EventView::Amended { .. } => "amended",
            EventView::Retracted { .. } => "retracted",
        }
    }
}

impl From<Event> for EventView {
    fn from(event: Event) -> Self {
        match event {
            Event::BookingCreated { booking } => EventView::Created {
                booking: booking.into(),
            },
            Event::BookingAmended { booking } => EventView::Amended {
                booking: booking.into(),
            },
            Event::BookingRetracted { id, resource_id } => EventView::Retracted { id, resource_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2024-05-01T10:00:00Z
    const TEN_AM: Ms = 1_714_557_600_000;

    #[test]
    fn parses_rfc3339_with_offset() {
        assert_eq!(parse_instant("t", "2024-05-01T10:00:00Z").unwrap(), TEN_AM);
        assert_eq!(
            parse_instant("t", "2024-05-01T12:00:00+02:00").unwrap(),
            TEN_AM
        );
        assert_eq!(
            parse_instant("t", "2024-05-01T10:00:00.250Z").unwrap(),
            TEN_AM + 250
        );
    }

    #[test]
    fn parses_datetime_local_as_utc() {
        assert_eq!(parse_instant("t", "2024-05-01T10:00").unwrap(), TEN_AM);
        assert_eq!(parse_instant("t", "2024-05-01T10:00:00").unwrap(), TEN_AM);
    }

    #[test]
    fn rejects_garbage_instants() {
        let err = parse_instant("starttime", "tomorrow").unwrap_err();
        assert!(err.to_string().contains("starttime"));
        assert!(parse_instant("starttime", "").is_err());
    }

    #[test]
    fn day_start_is_utc_midnight() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(day_start(date), TEN_AM - 10 * 3_600_000);
    }

    #[test]
    fn actor_overrides_body_owner() {
        let req = CreateBookingRequest {
            title: "Pattern work".into(),
            starttime: "2024-05-01T10:00:00Z".into(),
            endtime: "2024-05-01T11:00:00Z".into(),
            resource_id: "aircraft1".into(),
            owner_id: Some("someone-else".into()),
            ..Default::default()
        };
        let draft = req.clone().into_draft(Some("pilot".into())).unwrap();
        assert_eq!(draft.owner_id, "pilot");
        assert_eq!(draft.start, TEN_AM);

        let draft = req.into_draft(None).unwrap();
        assert_eq!(draft.owner_id, "someone-else");
    }

    #[test]
    fn blank_title_wins_over_bad_times() {
        let req = CreateBookingRequest {
            starttime: "nonsense".into(),
            ..Default::default()
        };
        assert!(matches!(
            req.into_draft(None),
            Err(ApiError::Engine(EngineError::InvalidInput("title required")))
        ));
    }

    #[test]
    fn blank_details_are_dropped() {
        let req = UpdateBookingRequest {
            title: "Pattern work".into(),
            details: Some("  ".into()),
            starttime: "2024-05-01T10:00:00Z".into(),
            endtime: "2024-05-01T11:00:00Z".into(),
        };
        assert_eq!(req.into_amendment().unwrap().details, None);
    }

    #[test]
    fn booking_view_uses_camel_case_and_iso_times() {
        let view = BookingView::from(Booking {
            id: Ulid::from_parts(1, 1),
            resource_id: "aircraft1".into(),
            span: Span::new(TEN_AM, TEN_AM + 3_600_000),
            title: "Pattern work".into(),
            details: None,
            owner_id: "pilot".into(),
            created_at: TEN_AM - 86_400_000,
        });
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["resourceId"], "aircraft1");
        assert_eq!(json["ownerId"], "pilot");
        assert_eq!(json["starttime"], "2024-05-01T10:00:00Z");
        assert_eq!(json["endtime"], "2024-05-01T11:00:00Z");
        assert_eq!(json["createdAt"], "2024-04-30T10:00:00Z");
        assert!(json.get("details").is_none());
    }

    #[test]
    fn event_view_is_tagged() {
        let id = Ulid::from_parts(1, 1);
        let view = EventView::from(Event::BookingRetracted {
            id,
            resource_id: "aircraft1".into(),
        });
        assert_eq!(view.kind(), "retracted");
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["type"], "retracted");
        assert_eq!(json["resourceId"], "aircraft1");
        assert_eq!(json["id"], id.to_string());
    }
}
