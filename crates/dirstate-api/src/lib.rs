//! dirstate-api: Shared API types and schemas
//!
//! Contains request/response types, the inventory document, event types, and
//! OpenAPI schema definitions used across the daemon and CLI.

pub mod events;
pub mod inventory;
pub mod requests;
pub mod responses;
