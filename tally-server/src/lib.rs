//! tally-server — the stateless arithmetic compute service.

pub mod service;

pub use service::{TallyServer, serve_connection};
