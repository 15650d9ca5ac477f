//! Manifest source implementations

pub mod cached;
pub mod http;

pub use cached::CacheSource;
pub use http::HttpSource;
