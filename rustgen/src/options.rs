//! Render configuration.
//!
//! Options come from defaults, optionally overlaid by a TOML table and by
//! the `RUSTGEN_CRATE_NAME` environment variable.

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_RUNTIME_PRELUDE: &str = "arc_runtime::prelude::*";
pub const DEFAULT_NDARRAY_VERSION: &str = "0.13.0";
pub const CRATE_NAME_ENV: &str = "RUSTGEN_CRATE_NAME";

#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("invalid render options: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderOptions {
    /// Crate the generated module lives in, used by the `uses` blob.
    pub crate_name: Option<String>,
    /// Text spliced verbatim into the generated module after the imports.
    pub include: Option<String>,
    /// Glob import providing `#[rewrite]` and the construction macros.
    pub runtime_prelude: String,
    pub ndarray_version: String,
    /// Emit explanatory comments inside loops and task scaffolding.
    pub annotate: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            crate_name: None,
            include: None,
            runtime_prelude: DEFAULT_RUNTIME_PRELUDE.to_string(),
            ndarray_version: DEFAULT_NDARRAY_VERSION.to_string(),
            annotate: true,
        }
    }
}

impl RenderOptions {
    pub fn from_toml_str(text: &str) -> Result<Self, OptionsError> {
        Ok(toml::from_str(text)?)
    }

    /// Defaults, overlaid by the TOML `text` when given and then by the
    /// environment.
    pub fn load(text: Option<&str>) -> Result<Self, OptionsError> {
        let options = match text {
            Some(text) => Self::from_toml_str(text)?,
            None => Self::default(),
        };
        Ok(options.with_env_overrides())
    }

    /// Apply environment overrides. An empty variable is ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(name) = std::env::var(CRATE_NAME_ENV)
            .ok()
            .filter(|val| !val.trim().is_empty())
        {
            self.crate_name = Some(name.trim().to_string());
        }
        self
    }

    /// Path prefix for `pub use` lines in the uses blob.
    pub fn crate_path(&self) -> &str {
        self.crate_name.as_deref().unwrap_or("crate")
    }
}
