//! # Configuration Management
//!
//! Typed configuration for the rotation service: global settings plus the
//! per-family binding lists, loaded from YAML and validated at startup.

pub mod settings;

pub use settings::{
    AppConfig, CircleCiBinding, HealthWindow, SpaceliftBinding, TfCloudBinding,
};
