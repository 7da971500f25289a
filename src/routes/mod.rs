//! HTTP route handlers for the local development gateway.

pub mod gateway;
pub mod health;
