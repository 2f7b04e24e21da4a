//! Golf tee-time availability monitor.
//!
//! Scrapes GolfBox booking grids on a fixed cadence, diffs each cycle
//! against the previous one, matches the results against per-user
//! preferences, and delivers email notifications on two cadences (daily
//! digest and incremental alerts). A small HTTP API manages preferences.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod digest;
pub mod error;
pub mod grid;
pub mod logging;
pub mod monitor;
pub mod notify;
pub mod prefs;
pub mod services;
pub mod session;
pub mod state;
pub mod store;
pub mod web;
