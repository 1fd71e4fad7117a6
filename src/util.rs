//! Shared utility modules used across the index components.

pub mod fs;
