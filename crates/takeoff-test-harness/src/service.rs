//! In-process fake of the take-off reservation service.
//!
//! Every fake node shares one backend, so writes are visible on all nodes at
//! once. A flight is coordinated by the node that created it until that node
//! goes down; the next coordinator query then hands it to the lowest live
//! port.

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value, json};
use tracing::debug;
use uuid::Uuid;

use crate::http::{HttpServer, Request, Response};

/// Rewrites the response a node on the given port is about to send.
pub type ResponseFilter = Arc<dyn Fn(u16, &Request, Response) -> Response + Send + Sync>;

const SEAT_CATEGORIES: [&str; 3] = ["window", "aisle", "between_seats"];

#[derive(Debug)]
struct NodeState {
    name: String,
    live: bool,
    warmup_remaining: u32,
}

#[derive(Debug)]
struct FlightRecord {
    fields: Map<String, Value>,
    available: [u64; 3],
    closed: bool,
    subscriptions: Vec<Value>,
    coordinator: u16,
}

impl FlightRecord {
    fn to_json(&self) -> Value {
        let mut fields = self.fields.clone();
        fields.insert(
            "status".to_string(),
            json!(if self.closed { "closed" } else { "open" }),
        );
        fields.insert(
            "available_seats".to_string(),
            seats_json(self.available),
        );
        Value::Object(fields)
    }
}

#[derive(Debug, Default)]
struct Backend {
    nodes: BTreeMap<u16, NodeState>,
    flights: BTreeMap<String, FlightRecord>,
    bookings: Vec<Value>,
    alerts: Vec<Value>,
    warmup: u32,
    health_status: Option<u16>,
}

/// Shared state behind every fake node.
#[derive(Debug, Clone, Default)]
pub struct FakeTakeOff {
    backend: Arc<Mutex<Backend>>,
}

impl FakeTakeOff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes started from now on answer their first `failed_checks` health
    /// checks with 503.
    #[must_use]
    pub fn with_warmup(self, failed_checks: u32) -> Self {
        self.lock().warmup = failed_checks;
        self
    }

    /// Forces every health check to answer `status`. `None` restores normal
    /// behaviour.
    pub fn set_health_status(&self, status: Option<u16>) {
        self.lock().health_status = status;
    }

    /// Starts a fake node named `name` on `port`.
    pub fn serve(&self, port: u16, name: &str) -> io::Result<HttpServer> {
        self.serve_filtered(port, name, Arc::new(pass_through))
    }

    /// Starts a fake node whose answers pass through `filter`, e.g. to make
    /// one node report state the others do not.
    pub fn serve_filtered(
        &self,
        port: u16,
        name: &str,
        filter: ResponseFilter,
    ) -> io::Result<HttpServer> {
        self.lock().register(port, name);

        let service = self.clone();
        let server = HttpServer::bind(
            port,
            Arc::new(move |request: &Request| {
                filter(port, request, service.handle(port, request))
            }),
        );
        if server.is_err() {
            self.mark_down(port);
        }
        server
    }

    /// Records that the node on `port` is gone.
    pub fn mark_down(&self, port: u16) {
        if let Some(node) = self.lock().nodes.get_mut(&port) {
            node.live = false;
        }
    }

    pub fn flight_count(&self) -> usize {
        self.lock().flights.len()
    }

    pub fn booking_count(&self) -> usize {
        self.lock().bookings.len()
    }

    /// Answers one request as the node on `port`.
    pub fn handle(&self, port: u16, request: &Request) -> Response {
        let path = request.path.split('?').next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        debug!(port, method = %request.method, path, "fake node request");

        let mut backend = self.lock();
        match (request.method.as_str(), segments.as_slice()) {
            ("GET", ["health-check"]) => backend.health_check(port),
            ("POST", ["flights"]) => backend.create_flight(port, request),
            ("GET", ["flights"]) => backend.list_flights(),
            ("POST", ["flights", id, "subscriptions"]) => backend.subscribe(id, request),
            ("GET", ["flights", id, "subscriptions"]) => backend.list_subscriptions(id),
            ("GET", ["flights", id, "coordinator"]) => backend.coordinator(id),
            ("POST", ["reservations"]) => backend.book(request),
            ("GET", ["reservations"]) => Response::ok(&json!({ "value": backend.bookings })),
            ("POST", ["alerts"]) => backend.create_alert(request),
            ("GET", ["alerts"]) => Response::ok(&json!({ "value": backend.alerts })),
            _ => Response::not_found(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Backend> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Backend {
    fn register(&mut self, port: u16, name: &str) {
        let warmup_remaining = self.warmup;
        self.nodes.insert(
            port,
            NodeState {
                name: name.to_string(),
                live: true,
                warmup_remaining,
            },
        );
    }

    fn health_check(&mut self, port: u16) -> Response {
        if let Some(status) = self.health_status {
            return Response::json(status, &json!({ "status": "forced" }));
        }
        if let Some(node) = self.nodes.get_mut(&port) {
            if node.warmup_remaining > 0 {
                node.warmup_remaining -= 1;
                return Response::json(503, &json!({ "status": "starting" }));
            }
        }
        Response::ok(&json!({ "status": "ok" }))
    }

    fn create_flight(&mut self, port: u16, request: &Request) -> Response {
        let Some(Value::Object(mut fields)) = request.json() else {
            return Response::bad_request("flight body must be a JSON object");
        };
        let Some(available) = fields.get("seats").and_then(parse_seats) else {
            return Response::bad_request("seats are required");
        };

        let id = Uuid::new_v4().to_string();
        fields.insert("id".to_string(), json!(id));

        let record = FlightRecord {
            fields,
            available,
            closed: false,
            subscriptions: Vec::new(),
            coordinator: port,
        };
        let flight = record.to_json();
        self.flights.insert(id, record);

        Response::ok(&json!({ "status": "ok", "value": flight }))
    }

    fn list_flights(&self) -> Response {
        let flights: Map<String, Value> = self
            .flights
            .iter()
            .map(|(id, flight)| (id.clone(), flight.to_json()))
            .collect();
        Response::ok(&json!({ "value": flights }))
    }

    fn subscribe(&mut self, id: &str, request: &Request) -> Response {
        let Some(subscription) = request.json().filter(|v| v.get("user").is_some()) else {
            return Response::bad_request("subscription needs a user");
        };
        let Some(flight) = self.flights.get_mut(id) else {
            return Response::not_found();
        };
        if !flight.closed {
            flight.subscriptions.push(subscription);
        }
        Response::ok(&json!({ "status": "ok" }))
    }

    fn list_subscriptions(&self, id: &str) -> Response {
        match self.flights.get(id) {
            Some(flight) => Response::ok(&json!({ "value": flight.subscriptions })),
            None => Response::not_found(),
        }
    }

    fn coordinator(&mut self, id: &str) -> Response {
        let live_ports: Vec<u16> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.live)
            .map(|(port, _)| *port)
            .collect();

        let Some(flight) = self.flights.get_mut(id) else {
            return Response::not_found();
        };
        if !live_ports.contains(&flight.coordinator) {
            match live_ports.first() {
                Some(port) => flight.coordinator = *port,
                None => return Response::json(503, &json!({ "status": "no_live_nodes" })),
            }
        }

        let name = self
            .nodes
            .get(&flight.coordinator)
            .map_or_else(|| format!("node-{}", flight.coordinator), |n| n.name.clone());
        Response::ok(&json!({ "value": format!("{name}@127.0.0.1") }))
    }

    fn book(&mut self, request: &Request) -> Response {
        let Some(booking) = request.json() else {
            return Response::bad_request("booking body must be JSON");
        };
        let (Some(user), Some(flight_id), Some(requested)) = (
            booking.get("user").and_then(Value::as_str),
            booking.get("flight_id").and_then(Value::as_str),
            booking.get("seats").and_then(parse_seats),
        ) else {
            return Response::bad_request("booking needs user, flight_id and seats");
        };

        let Some(flight) = self.flights.get_mut(flight_id) else {
            return Response::not_found();
        };
        if flight.closed {
            return Response::ok(&json!({ "status": "flight_closed" }));
        }

        let total: u64 = requested.iter().sum();
        let fits = requested
            .iter()
            .zip(flight.available.iter())
            .all(|(want, have)| want <= have);
        if total == 0 || !fits {
            return Response::ok(&json!({ "status": "booking_denied" }));
        }

        for (have, want) in flight.available.iter_mut().zip(requested) {
            *have -= want;
        }
        flight
            .subscriptions
            .retain(|sub| sub.get("user").and_then(Value::as_str) != Some(user));
        if flight.available.iter().all(|seats| *seats == 0) {
            flight.closed = true;
            flight.subscriptions.clear();
        }

        self.bookings.push(json!({
            "user": user,
            "flight_id": flight_id,
            "seats": seats_json(requested),
        }));
        Response::ok(&json!({ "status": "booking_accepted" }))
    }

    fn create_alert(&mut self, request: &Request) -> Response {
        match request.json() {
            Some(alert) if alert.get("user").is_some() => {
                self.alerts.push(alert);
                Response::ok(&json!({ "status": "ok" }))
            }
            _ => Response::bad_request("alert needs a user"),
        }
    }
}

fn parse_seats(value: &Value) -> Option<[u64; 3]> {
    let seats = value.as_object()?;
    let mut parsed = [0u64; 3];
    for (slot, category) in parsed.iter_mut().zip(SEAT_CATEGORIES) {
        if let Some(count) = seats.get(category) {
            *slot = count.as_u64()?;
        }
    }
    Some(parsed)
}

fn pass_through(_port: u16, _request: &Request, response: Response) -> Response {
    response
}

fn seats_json(seats: [u64; 3]) -> Value {
    json!({
        "window": seats[0],
        "aisle": seats[1],
        "between_seats": seats[2],
    })
}
