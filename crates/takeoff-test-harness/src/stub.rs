//! Canned-response server for error-path tests.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::http::{HttpServer, Request, Response};

/// Answers the n-th request with the n-th canned response; the last one
/// repeats forever.
pub struct StubServer {
    server: HttpServer,
    hits: Arc<AtomicUsize>,
}

impl StubServer {
    /// Always answers `status` with `body`.
    pub fn respond(status: u16, body: &str) -> io::Result<Self> {
        Self::sequence(vec![Response::raw(status, body)])
    }

    /// Answers in order, repeating the last response.
    pub fn sequence(responses: Vec<Response>) -> io::Result<Self> {
        if responses.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "stub needs at least one response",
            ));
        }

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let server = HttpServer::bind(
            0,
            Arc::new(move |_: &Request| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                responses[n.min(responses.len() - 1)].clone()
            }),
        )?;

        Ok(Self { server, hits })
    }

    pub fn port(&self) -> u16 {
        self.server.port()
    }

    pub fn base_url(&self) -> String {
        self.server.base_url()
    }

    /// Requests answered so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}
