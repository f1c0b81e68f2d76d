//! Persistence for rules, delivery attempts and the tenant schema catalog.
//!
//! Every store is a trait so the engine can run against PostgreSQL in
//! production and against the in-memory implementations in tests and
//! single-node development.

pub mod error;
pub mod log_query;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use error::StoreError;
pub use log_query::{DeliveryStats, LogFilter, LogPage, RuleStats};
pub use memory::{MemoryDeliveryLog, MemoryRuleStore, MemorySchemaCatalog};
pub use traits::{DeliveryLogStore, RuleStore, SchemaCatalog};
