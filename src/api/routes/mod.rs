//! HTTP Routes
//!
//! Route handlers organized by functionality.

pub mod debug;
pub mod fallback;
pub mod health;
pub mod readings;
pub mod root;
