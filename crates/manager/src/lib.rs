//! # Manager
//!
//! Consumer Manager: keeps exactly one upstream consumer active, replaces
//! consumers without gaps and restarts them when they die.
//!
//! ## Usage Example
//!
//! ```ignore
//! use manager::{ConsumerManager, StoreDataSink, StoreParameters};
//!
//! let params = StoreParameters::new(store.clone(), keys.clone(), names);
//! let sink = StoreDataSink::new(store.clone(), &keys);
//! let manager = ConsumerManager::new(upstream, &config, params, sink, framer);
//!
//! manager.start_a_consumer().await?;
//! // ... parameters changed
//! manager.start_a_consumer().await?; // hot restart
//!
//! manager.shutdown().await;
//! ```

mod error;
mod manager;
mod store_hooks;

pub use error::{ManagerError, Result};
pub use manager::ConsumerManager;
pub use store_hooks::{seed_parameters, StoreDataSink, StoreParameters};
