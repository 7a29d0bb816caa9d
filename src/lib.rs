//! CafeBot Library
//!
//! Multi-source coffee price tracker: scrapes international and Vietnamese
//! coffee markets, reconciles the readings into confidence-scored prices,
//! and reports them to Telegram.

pub mod config;
pub mod convert;
pub mod history;
pub mod notify;
pub mod reconcile;
pub mod sources;
pub mod types;
