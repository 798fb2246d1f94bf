//! NDP Common Library
//!
//! Shared functionality for the NDP workspace members.
//!
//! # Overview
//!
//! This crate provides the pieces every NDP component needs regardless of
//! which stage of the pipeline it implements:
//!
//! - **Logging**: Centralized tracing configuration and initialization
//!
//! # Example
//!
//! ```no_run
//! use ndp_common::logging::{init_logging, LogConfig};
//! use tracing::info;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!
//!     info!("Application started");
//!     Ok(())
//! }
//! ```

pub mod logging;
