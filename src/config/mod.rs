// src/config/mod.rs
pub mod filters;
pub mod settings;

pub use filters::{load_filters_default, load_filters_from};
pub use settings::Settings;
