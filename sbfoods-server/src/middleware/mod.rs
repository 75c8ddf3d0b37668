//! Request pipeline stages
//!
//! One module per stage; `crate::pipeline` puts them in order.
//!
//! - security_headers: helmet-style security headers
//! - rate_limit: per-IP quota on `/api/`
//! - cors: origin whitelist per environment
//! - body: JSON / URL-encoded parsing with a size cap
//! - request_log: development request logging
//! - uploads: static files under `/uploads`

pub mod body;
pub mod cors;
pub mod rate_limit;
pub mod request_log;
pub mod security_headers;
pub mod uploads;

pub use body::ParsedBody;
