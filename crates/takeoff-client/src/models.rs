//! Request bodies and response envelopes of the take-off HTTP API.
//!
//! Response types only name the fields the harness asserts on. Everything
//! else the service sends is kept in a flattened `extra` map so nothing is
//! silently dropped.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Webhook registered by [`crate::ApiClient::subscribe_to_flight`].
pub const DEFAULT_WEBHOOK_URI: &str = "http://localhost:8080/webhooks";

/// Seat counts per category. Missing categories count as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Seats {
    pub window: u32,
    pub aisle: u32,
    pub between_seats: u32,
}

impl Seats {
    pub fn new(window: u32, aisle: u32, between_seats: u32) -> Self {
        Self {
            window,
            aisle,
            between_seats,
        }
    }

    /// Only window seats.
    pub fn window(count: u32) -> Self {
        Self::new(count, 0, 0)
    }

    pub fn total(&self) -> u32 {
        self.window + self.aisle + self.between_seats
    }
}

/// Body of `POST /flights`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFlight {
    #[serde(rename = "type")]
    pub aircraft: String,
    pub seats: Seats,
    pub datetime: DateTime<Utc>,
    pub origin: String,
    pub destination: String,
    pub offer_duration: u32,
}

impl Default for NewFlight {
    fn default() -> Self {
        Self {
            aircraft: "Boeing 737".to_string(),
            seats: Seats::new(25, 25, 25),
            datetime: Utc
                .with_ymd_and_hms(2025, 6, 24, 0, 0, 0)
                .single()
                .unwrap_or_default(),
            origin: "Buenos Aires".to_string(),
            destination: "Madrid".to_string(),
            offer_duration: 1,
        }
    }
}

impl NewFlight {
    /// Default flight with the given capacity.
    pub fn with_seats(seats: Seats) -> Self {
        Self {
            seats,
            ..Self::default()
        }
    }
}

/// A flight as reported by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flight {
    pub id: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Flight {
    pub fn is_closed(&self) -> bool {
        self.status.as_deref() == Some("closed")
    }
}

/// Body of `POST /flights/{id}/subscriptions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubscription {
    pub user: String,
    pub webhook_uri: String,
}

impl NewSubscription {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            webhook_uri: DEFAULT_WEBHOOK_URI.to_string(),
        }
    }
}

/// A flight subscription as reported by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub user: String,
    #[serde(default)]
    pub webhook_uri: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of `POST /reservations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBooking {
    pub user: String,
    pub flight_id: String,
    pub seats: Seats,
}

impl NewBooking {
    pub fn new(user: impl Into<String>, flight_id: impl Into<String>, seats: Seats) -> Self {
        Self {
            user: user.into(),
            flight_id: flight_id.into(),
            seats,
        }
    }
}

/// A booking as reported by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub user: String,
    #[serde(default)]
    pub flight_id: Option<String>,
    #[serde(default)]
    pub seats: Option<Seats>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Domain decision carried in the `status` of a booking response.
///
/// These are successful answers, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookingOutcome {
    Accepted,
    Denied,
    FlightClosed,
    /// Any status string the harness does not know.
    Other,
}

impl BookingOutcome {
    pub fn from_status(status: &str) -> Self {
        match status {
            "booking_accepted" => Self::Accepted,
            "booking_denied" => Self::Denied,
            "flight_closed" => Self::FlightClosed,
            _ => Self::Other,
        }
    }

    /// Denied or closed: the request was refused for lack of capacity.
    pub fn is_refusal(self) -> bool {
        matches!(self, Self::Denied | Self::FlightClosed)
    }
}

impl fmt::Display for BookingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Accepted => "booking_accepted",
            Self::Denied => "booking_denied",
            Self::FlightClosed => "flight_closed",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// Response of `POST /reservations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingResponse {
    pub status: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BookingResponse {
    pub fn outcome(&self) -> BookingOutcome {
        BookingOutcome::from_status(&self.status)
    }
}

/// Time window of an alert: a single day or a whole month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AlertWindow {
    Date { date: NaiveDate },
    YearMonth { year: i32, month: u32 },
}

/// Body of `POST /alerts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAlert {
    pub user: String,
    pub origin: String,
    pub destination: String,
    pub webhook_uri: String,
    #[serde(flatten)]
    pub window: AlertWindow,
}

impl NewAlert {
    /// Default alert for a single day.
    pub fn on_date(date: NaiveDate) -> Self {
        Self::with_window(AlertWindow::Date { date })
    }

    /// The day of the default flight, 2025-06-24.
    pub fn default_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 24).unwrap_or_default()
    }

    /// Default alert for a whole month.
    pub fn in_month(year: i32, month: u32) -> Self {
        Self::with_window(AlertWindow::YearMonth { year, month })
    }

    fn with_window(window: AlertWindow) -> Self {
        Self {
            user: "user".to_string(),
            origin: "Buenos Aires".to_string(),
            destination: "Madrid".to_string(),
            webhook_uri: "localhost:8080".to_string(),
            window,
        }
    }
}

impl Default for NewAlert {
    /// Alert for the day of the default flight.
    fn default() -> Self {
        Self::on_date(Self::default_date())
    }
}

/// An alert as reported by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub user: String,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `{status, value?}` envelope returned by write endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse<T = Value> {
    pub status: String,
    pub value: Option<T>,
}

impl<T> StatusResponse<T> {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// `{value}` envelope returned by read endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueResponse<T> {
    pub value: T,
}

/// Node currently coordinating a flight, parsed from `<node>@<host>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coordinator {
    pub node: String,
    pub host: Option<String>,
}

impl Coordinator {
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('@') {
            Some((node, host)) => Self {
                node: node.to_string(),
                host: Some(host.to_string()),
            },
            None => Self {
                node: raw.to_string(),
                host: None,
            },
        }
    }
}

impl fmt::Display for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Some(host) => write!(f, "{}@{}", self.node, host),
            None => f.write_str(&self.node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_flight_wire_format() {
        let flight = NewFlight::with_seats(Seats::window(2));
        let value = serde_json::to_value(&flight).unwrap();

        assert_eq!(value["type"], "Boeing 737");
        assert_eq!(value["datetime"], "2025-06-24T00:00:00Z");
        assert_eq!(
            value["seats"],
            json!({"window": 2, "aisle": 0, "between_seats": 0})
        );
        assert_eq!(value["offer_duration"], 1);
    }

    #[test]
    fn test_alert_window_is_flattened() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 24).unwrap();
        let by_date = serde_json::to_value(NewAlert::on_date(date)).unwrap();
        assert_eq!(by_date["date"], "2025-06-24");
        assert!(by_date.get("year").is_none());

        let by_month = serde_json::to_value(NewAlert::in_month(2025, 6)).unwrap();
        assert_eq!(by_month["year"], 2025);
        assert_eq!(by_month["month"], 6);
        assert!(by_month.get("date").is_none());
    }

    #[test]
    fn test_booking_seats_default_missing_categories() {
        let booking: Booking = serde_json::from_value(json!({
            "user": "user",
            "flight_id": "f-1",
            "seats": {"window": 1},
        }))
        .unwrap();
        assert_eq!(booking.seats, Some(Seats::window(1)));

        let default = serde_json::to_value(NewAlert::default()).unwrap();
        assert_eq!(default["date"], "2025-06-24");
    }

    #[test]
    fn test_flight_keeps_unknown_fields() {
        let flight: Flight = serde_json::from_value(json!({
            "id": "f-1",
            "origin": "Buenos Aires",
            "destination": "Madrid",
            "status": "closed",
            "type": "Boeing 737",
        }))
        .unwrap();

        assert!(flight.is_closed());
        assert_eq!(flight.extra["type"], "Boeing 737");
    }

    #[test]
    fn test_status_response_without_value() {
        let created: StatusResponse<Flight> =
            serde_json::from_value(json!({"status": "ok"})).unwrap();
        assert!(created.is_ok());
        assert!(created.value.is_none());

        let created: StatusResponse<Flight> = serde_json::from_value(json!({
            "status": "ok",
            "value": {"id": "f-1", "origin": "Buenos Aires"},
        }))
        .unwrap();
        assert_eq!(created.value.map(|f| f.id).as_deref(), Some("f-1"));
    }

    #[test]
    fn test_booking_outcome_from_status() {
        assert_eq!(
            BookingOutcome::from_status("booking_accepted"),
            BookingOutcome::Accepted
        );
        assert!(BookingOutcome::from_status("booking_denied").is_refusal());
        assert!(BookingOutcome::from_status("flight_closed").is_refusal());
        assert_eq!(BookingOutcome::from_status("boom"), BookingOutcome::Other);
        assert!(!BookingOutcome::Other.is_refusal());
    }

    #[test]
    fn test_coordinator_parse() {
        let coordinator = Coordinator::parse("node-27240@127.0.0.1");
        assert_eq!(coordinator.node, "node-27240");
        assert_eq!(coordinator.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(coordinator.to_string(), "node-27240@127.0.0.1");

        let bare = Coordinator::parse("node-1");
        assert_eq!(bare.node, "node-1");
        assert!(bare.host.is_none());
    }
}
