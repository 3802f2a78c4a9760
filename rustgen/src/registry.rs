//! Nominal type registry.
//!
//! Records and variants have no names in the IR. The registry interns them by
//! signature, hands out `Struct<n>` / `Enum<n>` names from per-kind counters,
//! and writes each definition exactly once, after every nominal type it
//! mentions.

use crate::error::RenderError;
use crate::printer::Printer;
use crate::signature::signature;
use ir::{StreamDirection, Type};
use std::collections::HashMap;

pub const RC_IMPORT: &str = "use std::rc::Rc;";
pub const NDARRAY_IMPORT: &str = "use ndarray::{Array, Dim, Ix};";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NominalKind {
    Struct,
    Enum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitState {
    Pending,
    /// Definition is being produced; seeing it again means the type graph
    /// loops back on itself.
    Emitting,
    Emitted,
}

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub signature: String,
    pub kind: NominalKind,
    pub id: usize,
    pub state: EmitState,
}

impl RegistryEntry {
    pub fn name(&self) -> String {
        match self.kind {
            NominalKind::Struct => format!("Struct{}", self.id),
            NominalKind::Enum => format!("Enum{}", self.id),
        }
    }
}

pub struct TypeRegistry {
    entries: HashMap<String, RegistryEntry>,
    next_struct: usize,
    next_enum: usize,
    prelude_import: String,
    ndarray_version: String,
}

impl TypeRegistry {
    pub fn new(runtime_prelude: &str, ndarray_version: &str) -> Self {
        Self {
            entries: HashMap::new(),
            next_struct: 0,
            next_enum: 0,
            prelude_import: format!("use {};", runtime_prelude),
            ndarray_version: ndarray_version.to_string(),
        }
    }

    pub fn prelude_import(&self) -> &str {
        &self.prelude_import
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up or create the entry of a record or variant type.
    pub fn resolve(&mut self, ty: &Type) -> Result<&RegistryEntry, RenderError> {
        let kind = match ty {
            Type::Record(_) => NominalKind::Struct,
            Type::Variant(_) => NominalKind::Enum,
            other => {
                return Err(RenderError::internal(format!(
                    "type {} has no nominal name",
                    other
                )))
            }
        };
        let sig = signature(ty);
        if !self.entries.contains_key(&sig) {
            let id = match kind {
                NominalKind::Struct => {
                    self.next_struct += 1;
                    self.next_struct - 1
                }
                NominalKind::Enum => {
                    self.next_enum += 1;
                    self.next_enum - 1
                }
            };
            self.entries.insert(
                sig.clone(),
                RegistryEntry {
                    signature: sig.clone(),
                    kind,
                    id,
                    state: EmitState::Pending,
                },
            );
        }
        self.entries
            .get(&sig)
            .ok_or_else(|| RenderError::internal(format!("registry lost entry for {}", sig)))
    }

    fn set_state(&mut self, sig: &str, state: EmitState) -> Result<(), RenderError> {
        match self.entries.get_mut(sig) {
            Some(entry) => {
                entry.state = state;
                Ok(())
            }
            None => Err(RenderError::internal(format!(
                "registry lost entry for {}",
                sig
            ))),
        }
    }

    /// Make sure every nominal type reachable from `ty` is defined, children
    /// before parents.
    pub fn ensure_emitted(&mut self, ty: &Type, printer: &mut Printer) -> Result<(), RenderError> {
        // Aliased types are defined by their task module.
        if printer.type_alias(ty).is_some() {
            return Ok(());
        }
        match ty {
            Type::Primitive(_) => Ok(()),
            Type::Record(_) | Type::Variant(_) => self.emit_nominal(ty, printer),
            Type::Array { element, .. } => {
                self.require_ndarray(printer);
                self.ensure_emitted(element, printer)
            }
            Type::Tuple(_) | Type::Stream { .. } | Type::Function { .. } => {
                if ty.is_stream() {
                    printer.write_import(&self.prelude_import);
                }
                for child in ty.children() {
                    self.ensure_emitted(child, printer)?;
                }
                Ok(())
            }
        }
    }

    fn emit_nominal(&mut self, ty: &Type, printer: &mut Printer) -> Result<(), RenderError> {
        let entry = self.resolve(ty)?;
        let sig = entry.signature.clone();
        let name = entry.name();
        match entry.state {
            EmitState::Emitted => return Ok(()),
            EmitState::Emitting => {
                return Err(RenderError::internal(format!(
                    "recursive emission of {} ({})",
                    name, sig
                )))
            }
            EmitState::Pending => {}
        }
        self.set_state(&sig, EmitState::Emitting)?;

        for child in ty.children() {
            self.ensure_emitted(child, printer)?;
        }

        let mut lines = vec!["#[rewrite]".to_string()];
        match ty {
            Type::Record(fields) => {
                lines.push(format!("pub struct {} {{", name));
                for field in fields {
                    let field_ty = self.rust_type(&field.ty, printer)?;
                    lines.push(format!("    pub {}: {},", field.name, field_ty));
                }
            }
            Type::Variant(alts) => {
                lines.push(format!("pub enum {} {{", name));
                for alt in alts {
                    let alt_ty = self.rust_type(&alt.ty, printer)?;
                    lines.push(format!("    {}({}),", alt.name, alt_ty));
                }
            }
            _ => {}
        }
        lines.push("}".to_string());

        log::trace!("defining {} for {}", name, sig);
        printer.write_import(&self.prelude_import);
        printer.write_type_def(&lines);
        printer.write_use(&name);
        self.set_state(&sig, EmitState::Emitted)
    }

    fn require_ndarray(&self, printer: &mut Printer) {
        printer.write_import(RC_IMPORT);
        printer.write_import(NDARRAY_IMPORT);
        printer.write_dependency("ndarray", &self.ndarray_version);
    }

    /// Rust spelling of `ty`, defining any nominal types it needs.
    pub fn rust_type(&mut self, ty: &Type, printer: &mut Printer) -> Result<String, RenderError> {
        if let Some(alias) = printer.type_alias(ty) {
            return Ok(alias.to_string());
        }
        match ty {
            Type::Primitive(p) => Ok(p.rust_name().to_string()),
            Type::Record(_) | Type::Variant(_) => {
                self.ensure_emitted(ty, printer)?;
                Ok(self.resolve(ty)?.name())
            }
            Type::Tuple(elems) => {
                let parts = elems
                    .iter()
                    .map(|elem| self.rust_type(elem, printer))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(tuple_text(&parts))
            }
            Type::Array { element, rank } => {
                self.require_ndarray(printer);
                let element = self.rust_type(element, printer)?;
                Ok(format!("Rc<Array<{}, Dim<[Ix; {}]>>>", element, rank))
            }
            Type::Stream { item, direction } => {
                printer.write_import(&self.prelude_import);
                let item = self.rust_type(item, printer)?;
                let wrapper = match direction {
                    StreamDirection::In => "Pullable",
                    StreamDirection::Out => "Pushable",
                    StreamDirection::Bidirectional => "Stream",
                };
                Ok(format!("{}<{}>", wrapper, item))
            }
            Type::Function { inputs, output } => {
                let inputs = inputs
                    .iter()
                    .map(|input| self.rust_type(input, printer))
                    .collect::<Result<Vec<_>, _>>()?;
                let mut text = format!("fn({})", inputs.join(", "));
                if let Some(output) = output {
                    text.push_str(" -> ");
                    text.push_str(&self.rust_type(output, printer)?);
                }
                Ok(text)
            }
        }
    }
}

/// Tuple syntax, with the trailing comma a one-element tuple needs.
pub fn tuple_text(parts: &[String]) -> String {
    match parts {
        [single] => format!("({},)", single),
        _ => format!("({})", parts.join(", ")),
    }
}
