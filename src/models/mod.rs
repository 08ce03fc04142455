//! Data models representing database entities and wire types.
//!
//! This module contains all data structures that map to database tables or
//! to the HTTP surface.

/// Customer provisioning payload
pub mod customer;
/// Payment ledger entity and intake request/response types
pub mod payment;
/// Processor notification envelope and acknowledgment types
pub mod webhook;
