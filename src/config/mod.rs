//! Pipeline definition loading and validation.
//!
//! - [`model`] mirrors the TOML layout.
//! - [`validate`] turns a raw [`PipelineFile`] into a checked [`Pipeline`].
//! - [`loader`] reads files and strings.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, from_toml_str, load_from_path, load_pipeline};
pub use model::{
    CredentialsSection, PipelineFile, RetrySection, RunSection, TaskConfig, WarehouseSection,
};
pub use validate::Pipeline;
