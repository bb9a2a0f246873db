//! Command implementations.

pub mod assets;
pub mod cache;
pub mod check;
pub mod common;
pub mod deps;
pub mod engine;
