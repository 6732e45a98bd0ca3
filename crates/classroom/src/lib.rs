//! Course admission, FIFO waitlist management, and consolidated instructor notifications.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
