//! Rust source backend for verified IR modules.
//!
//! [`render_module`] checks a module with [`verify::verify_module`] and then
//! walks it once, producing the text of a `pub mod` together with the `pub
//! use` lines and crate dependencies the text needs.

mod emit;
pub mod error;
pub mod options;
pub mod printer;
pub mod registry;
pub mod signature;
pub mod verify;

pub use error::{Location, RenderError, StructuralError};
pub use options::{OptionsError, RenderOptions};
pub use printer::RenderedModule;
pub use signature::signature;
pub use verify::{verify_function, verify_module};

use ir::Module;

pub fn render_module(module: &Module, options: &RenderOptions) -> Result<RenderedModule, RenderError> {
    let name = module.name.as_deref().unwrap_or("<unnamed>");
    log::debug!(
        "rendering module '{}' ({} functions)",
        name,
        module.functions.len()
    );
    verify::verify_module(module)?;
    let rendered = emit::Emitter::new(module, options).emit_module()?;
    log::info!(
        "rendered module '{}': {} bytes of source",
        name,
        rendered.source.len()
    );
    Ok(rendered)
}

/// Render several modules with the same options, stopping at the first error.
pub fn render_modules(
    modules: &[Module],
    options: &RenderOptions,
) -> Result<Vec<RenderedModule>, RenderError> {
    modules
        .iter()
        .map(|module| render_module(module, options))
        .collect()
}
