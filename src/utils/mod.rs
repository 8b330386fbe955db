//! Shared helpers.

pub mod memo;
