//! Core types and engine for the Remis ride dispatch service.
//!
//! This crate is free of HTTP and database dependencies. The
//! [`coordinator::Coordinator`] ties the components together; storage
//! backends implement [`snapshot::SnapshotStore`] and external services
//! implement the traits in [`collab`].

pub mod alert;
pub mod channel;
pub mod collab;
pub mod coordinator;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod location;
pub mod rate_limit;
pub mod ride;
pub mod snapshot;

pub use coordinator::{Collaborators, Coordinator, CoordinatorConfig};
pub use error::{Error, Result};
