#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]

pub mod app;
pub mod audit;
pub mod cli;
pub mod config;
pub mod directory;
pub mod dispatch;
pub mod doctor;
pub mod error;
pub mod gateway;
pub mod monitor;
pub mod policy;
pub mod setup;
pub mod snapshot;
pub mod tracker;

pub use config::Config;
pub use error::{GuardError, Result};
