//! Blocking JSON-over-HTTP client bound to one node.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::models::{
    Alert, Booking, BookingResponse, Coordinator, Flight, NewAlert, NewBooking, NewFlight,
    NewSubscription, StatusResponse, Subscription, ValueResponse,
};

const CONTENT_TYPE: &str = "application/json";

/// HTTP verbs used by the take-off API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// Client for one take-off node.
///
/// Holds nothing but the base URL and a connection agent, so clones are cheap
/// and a single instance can be shared by many threads. No retries and no
/// timeouts are applied here.
#[derive(Clone)]
pub struct ApiClient {
    agent: ureq::Agent,
    base_url: String,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ApiClient {
    /// Creates a client for `base_url` (e.g. `http://127.0.0.1:27220`).
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        let base_url = base_url.into();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::InvalidBaseUrl(base_url));
        }

        Ok(Self {
            agent: ureq::AgentBuilder::new().build(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Creates a client for `http://{host}:{port}`.
    pub fn for_node(host: &str, port: u16) -> ClientResult<Self> {
        Self::new(format!("http://{host}:{port}"))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /health-check`
    pub fn health_check(&self) -> ClientResult<Value> {
        self.request(Method::Get, "/health-check", None::<&()>)
    }

    /// `POST /flights`
    pub fn create_flight(&self, flight: &NewFlight) -> ClientResult<StatusResponse<Flight>> {
        self.request(Method::Post, "/flights", Some(flight))
    }

    /// `GET /flights`, keyed by flight id.
    pub fn list_flights(&self) -> ClientResult<HashMap<String, Flight>> {
        let response: ValueResponse<HashMap<String, Flight>> =
            self.request(Method::Get, "/flights", None::<&()>)?;
        Ok(response.value)
    }

    /// `POST /flights/{id}/subscriptions` with the default webhook.
    pub fn subscribe_to_flight(&self, flight_id: &str, user: &str) -> ClientResult<StatusResponse> {
        self.subscribe_with(flight_id, &NewSubscription::new(user))
    }

    /// `POST /flights/{id}/subscriptions`
    pub fn subscribe_with(
        &self,
        flight_id: &str,
        subscription: &NewSubscription,
    ) -> ClientResult<StatusResponse> {
        let path = format!("/flights/{flight_id}/subscriptions");
        self.request(Method::Post, &path, Some(subscription))
    }

    /// `GET /flights/{id}/subscriptions`
    pub fn list_subscriptions(&self, flight_id: &str) -> ClientResult<Vec<Subscription>> {
        let path = format!("/flights/{flight_id}/subscriptions");
        let response: ValueResponse<Vec<Subscription>> =
            self.request(Method::Get, &path, None::<&()>)?;
        Ok(response.value)
    }

    /// `GET /flights/{id}/coordinator`
    pub fn get_coordinator(&self, flight_id: &str) -> ClientResult<Coordinator> {
        let path = format!("/flights/{flight_id}/coordinator");
        let response: ValueResponse<String> = self.request(Method::Get, &path, None::<&()>)?;
        Ok(Coordinator::parse(&response.value))
    }

    /// `POST /reservations`
    pub fn create_booking(&self, booking: &NewBooking) -> ClientResult<BookingResponse> {
        self.request(Method::Post, "/reservations", Some(booking))
    }

    /// `GET /reservations`
    pub fn list_bookings(&self) -> ClientResult<Vec<Booking>> {
        let response: ValueResponse<Vec<Booking>> =
            self.request(Method::Get, "/reservations", None::<&()>)?;
        Ok(response.value)
    }

    /// `POST /alerts`
    pub fn create_alert(&self, alert: &NewAlert) -> ClientResult<StatusResponse> {
        self.request(Method::Post, "/alerts", Some(alert))
    }

    /// `GET /alerts`
    pub fn list_alerts(&self) -> ClientResult<Vec<Alert>> {
        let response: ValueResponse<Vec<Alert>> =
            self.request(Method::Get, "/alerts", None::<&()>)?;
        Ok(response.value)
    }

    /// Sends `method path` with an optional JSON body and decodes the JSON answer.
    pub fn request<B, R>(&self, method: Method, path: &str, body: Option<&B>) -> ClientResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = method.as_str(), %url, "node request");

        let request = self
            .agent
            .request(method.as_str(), &url)
            .set("Content-Type", CONTENT_TYPE)
            .set("Accept", CONTENT_TYPE);

        let result = match body {
            Some(body) => {
                let payload = serde_json::to_string(body).map_err(ClientError::Encode)?;
                request.send_string(&payload)
            }
            None => request.call(),
        };

        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                return Err(ClientError::Status { code, body });
            }
            Err(ureq::Error::Transport(transport)) => return Err(transport.into()),
        };

        let body = response.into_string()?;
        serde_json::from_str(&body).map_err(|source| ClientError::Decode { body, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = ApiClient::new("http://127.0.0.1:27220/").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:27220");
    }

    #[test]
    fn test_for_node_builds_url() {
        let client = ApiClient::for_node("localhost", 4000).unwrap();
        assert_eq!(client.base_url(), "http://localhost:4000");
    }

    #[test]
    fn test_rejects_non_http_url() {
        let result = ApiClient::new("127.0.0.1:27220");
        assert!(matches!(result, Err(ClientError::InvalidBaseUrl(_))));
    }

    #[test]
    fn test_refused_connection_is_retryable() {
        // Port 1 is privileged and never bound in test environments.
        let client = ApiClient::for_node("127.0.0.1", 1).unwrap();
        let err = client.health_check().unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert!(err.is_retryable());
    }
}
