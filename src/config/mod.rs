// src/config/mod.rs

//! Configuration loading and validation for jobhost.
//!
//! - `model.rs`: the TOML-backed raw model and the validated [`ConfigFile`].
//! - `loader.rs`: reading a file from disk.
//! - `validate.rs`: turning a [`RawConfigFile`] into a [`ConfigFile`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{DEFAULT_CONFIG_FILE, load_and_validate, load_from_path, load_from_str};
pub use model::{ConfigFile, FunctionConfig, HostSection, HostSettings, RawConfigFile};
pub use validate::is_valid_queue_name;
