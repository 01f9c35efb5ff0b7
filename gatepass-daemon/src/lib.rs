//! Gatepass daemon library.
//!
//! SQLite-backed request store, OTP issuance, the lifecycle engine, and the
//! read-only status projection. The binary in `main.rs` exposes every
//! operation as an operator CLI subcommand; the HTTP routing layer that
//! would wrap these in production is an external collaborator and calls the
//! same service methods.

pub mod config;
pub mod db;
pub mod notify;
pub mod otp;
pub mod services;
pub mod store;
