//! Per-project, per-day time tracking persisted to a local JSON file.
//!
//! [`ProjectDataManager`] is the entry point: it owns the project tree,
//! the current selection and throttled, atomic persistence, all configured
//! by an explicit [`Config`].

pub mod clock;
pub mod config;
pub mod entities;
pub mod error;
pub mod logging;
pub mod models;
pub mod store;
pub mod tracker;

pub use clock::{Clock, SystemClock};
pub use config::{Config, Environment};
pub use error::StoreError;
pub use models::{format_time, Project, SubActivity, TimeRecord, Tracked};
pub use tracker::ProjectDataManager;
