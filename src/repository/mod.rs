//! Repository manifest retrieval and the on-disk manifest cache
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌──────────────┐
//! │ SourceProvider│────▶│   Cache     │────▶│ PackageCatalog│
//! │ (locators)   │     │ (reconcile) │     │  (snapshot)   │
//! └──────────────┘     └─────────────┘     └──────────────┘
//!                         │       │
//!                         ▼       ▼
//!                 ┌──────────┐ ┌──────────┐
//!                 │  Sources │ │  Store   │
//!                 │(http,disk)│ │ (records)│
//!                 └──────────┘ └──────────┘
//! ```
//!
//! - [`cache`]: reconciliation policy, session state and subscribers
//! - [`refresh`]: bounded parallel fetch of every configured source
//! - [`source`]: the fetch trait shared by network and disk sources
//! - [`sources`]: HTTP and cache-record implementations
//! - [`store`]: SHA-256 keyed record files
//! - [`error`]: fetch, decode and cache errors

pub mod cache;
pub mod error;
pub mod refresh;
pub mod source;
pub mod sources;
pub mod store;
