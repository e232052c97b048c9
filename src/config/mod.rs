//! Pesto - Configuration module

pub mod settings;

pub use settings::{ConfigError, DemotionPolicy, Settings, StorageLimit, CONFIG_PATH_ENV};
