//! Reelforge bot - the Telegram front end and scheduler around `reelcore`.
//!
//! # Module Structure
//!
//! - `cli`: command-line interface
//! - `services`: construction of the backend clients and the video pipeline
//! - `scheduler`: single-flight video job and the weekly schedule loop
//! - `telegram`: commands, keyboards, dialogs, handlers and delivery

pub mod cli;
pub mod scheduler;
pub mod services;
pub mod telegram;
