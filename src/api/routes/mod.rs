//! API Routes
//!
//! Route handlers organized by functionality.

pub mod mgmt;
pub mod query;
