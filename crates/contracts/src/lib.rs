//! # Contracts
//!
//! Interface contracts shared by every crate in the relay.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Data path
//! - A stream consumer emits [`Event`]s tagged with its [`ConsumerId`]
//! - The manager hands `Event::Data` payloads to a [`DataSink`]
//! - Batch processors drain a [`ListStore`] addressed through [`StoreKeys`]

mod auth;
mod backoff;
mod blueprint;
mod error;
mod event;
mod params;
mod sink;
mod store;
mod transform;

pub use auth::basic_auth_header;
pub use backoff::{DoublingBackoff, HttpBackoff, LinearBackoff};
pub use blueprint::*;
pub use error::*;
pub use event::{ConsumerId, Event};
pub use params::{LocalParameterProvider, ParameterProvider, StaticParameters};
pub use sink::{DataSink, LocalDataSink};
pub use store::{ListStore, LocalListStore, StoreKeys, DEFAULT_NAMESPACE};
pub use transform::ItemTransform;
