//! Application Layer - Port definitions.
//!
//! Defines how decoded feed output leaves the session. Adapters for the
//! Dhan socket live in the infrastructure layer.

/// Port interfaces for consumers of the feed.
pub mod ports;
