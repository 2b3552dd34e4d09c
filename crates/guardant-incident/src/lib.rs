//! guardant-incident — open/resolve incidents from check results.

pub mod manager;
pub mod notify;

pub use manager::IncidentManager;
pub use notify::{IncidentEvent, IncidentNotifier, LogNotifier};
