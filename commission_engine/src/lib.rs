//! Commission Engine library crate.
//!
//! This crate exposes the dealership commission calculator together
//! with the record keeping built around it: sales and spiff storage,
//! monthly statistics, user sessions, proof uploads and shared sales.
//! External applications may call `commission::calculate_commissions`
//! directly or embed the HTTP API via `api::build_router`.

pub mod api;
pub mod blob;
pub mod commission;
pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod models;
pub mod sharing;
pub mod store;
