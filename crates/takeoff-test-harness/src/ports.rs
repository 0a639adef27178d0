//! Free port discovery for tests that need a run of consecutive ports.

use std::io;
use std::net::TcpListener;

use rand::Rng;

const SEARCH_ATTEMPTS: usize = 200;
const LOW: u16 = 20_000;
const HIGH: u16 = 60_000;

/// First port of `count` consecutive ports that are free right now.
///
/// Starts from a random point so parallel tests rarely collide.
pub fn free_base_port(count: u16) -> io::Result<u16> {
    let mut rng = rand::thread_rng();

    for _ in 0..SEARCH_ATTEMPTS {
        let base = rng.gen_range(LOW..HIGH - count);
        if (base..base + count).all(|port| TcpListener::bind(("127.0.0.1", port)).is_ok()) {
            return Ok(base);
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AddrNotAvailable,
        format!("no run of {count} free ports found"),
    ))
}
