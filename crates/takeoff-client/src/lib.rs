//! HTTP/JSON client for take-off reservation nodes.
//!
//! One [`ApiClient`] is bound to one node's base URL and exposes a typed
//! operation per endpoint:
//!
//! | Operation | Request |
//! |---|---|
//! | [`ApiClient::health_check`] | `GET /health-check` |
//! | [`ApiClient::create_flight`] | `POST /flights` |
//! | [`ApiClient::list_flights`] | `GET /flights` |
//! | [`ApiClient::subscribe_to_flight`] | `POST /flights/{id}/subscriptions` |
//! | [`ApiClient::list_subscriptions`] | `GET /flights/{id}/subscriptions` |
//! | [`ApiClient::get_coordinator`] | `GET /flights/{id}/coordinator` |
//! | [`ApiClient::create_booking`] | `POST /reservations` |
//! | [`ApiClient::list_bookings`] | `GET /reservations` |
//! | [`ApiClient::create_alert`] | `POST /alerts` |
//! | [`ApiClient::list_alerts`] | `GET /alerts` |
//!
//! Booking refusals (`booking_denied`, `flight_closed`) are ordinary
//! responses, see [`BookingOutcome`].

pub mod client;
pub mod error;
pub mod models;

pub use client::{ApiClient, Method};
pub use error::{ClientError, ClientResult};
pub use models::{
    Alert, AlertWindow, Booking, BookingOutcome, BookingResponse, Coordinator,
    DEFAULT_WEBHOOK_URI, Flight, NewAlert, NewBooking, NewFlight, NewSubscription, Seats,
    StatusResponse, Subscription, ValueResponse,
};
