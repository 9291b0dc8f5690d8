//! r2r-api: HTTP API layer for the Rent2Repay dashboard
//!
//! Serves contract and account reads, drives configuration wizard sessions
//! and builds unsigned transactions for the browser wallet.

pub mod dto;
pub mod routes;
pub mod server;
pub mod sessions;
pub mod state;
pub mod tx_watcher;

pub use server::*;
pub use state::{AppError, AppState};
