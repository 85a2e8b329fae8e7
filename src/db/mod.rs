//! Database access layer.
//!
//! This module provides profile-based database access:
//! - Connection profile resolution from configuration
//! - Lazy connection factory with per-profile pools
//! - Statement shaping and positional bind parameters
//! - Query execution, cursors, and transaction helpers

pub mod client;
pub mod factory;
pub mod params;
pub mod profiles;
pub mod statement;
pub mod transaction;

pub use client::{DbClient, MultiResult, RowReader};
pub use factory::ConnectionFactory;
pub use params::SqlParam;
pub use profiles::{ConnectionProfile, DEFAULT_PROFILE_NAME, ProfileSet};
pub use statement::{CommandKind, Statement};
pub use transaction::DbTransaction;
