//! Task scaffolding.
//!
//! Functions tagged with a task and module name become methods of a state
//! record that lives in its own Rust module next to the task's inbound and
//! outbound interface enums:
//!
//! ```text
//! #[rewrite(on_event = "handle")]
//! pub mod counter {
//!     use super::*;
//!     pub struct Counter { .. }
//!     #[rewrite]
//!     pub enum IInterface { .. }
//!     #[rewrite]
//!     pub enum OInterface { .. }
//! }
//! impl counter::Counter { .. }
//! ```

use super::{Emitter, FnRole};
use crate::error::RenderError;
use crate::printer::Printer;
use ir::{Function, Module, Type};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub(super) struct TaskInfo {
    task_name: String,
    state: Option<Type>,
    input: Option<Type>,
    output: Option<Type>,
    on_event: Vec<String>,
    on_start: Vec<String>,
    emitted: bool,
}

/// Tasks of a module keyed by module name, gathered before emission so the
/// scaffolding is complete whichever task function comes first.
#[derive(Debug, Default)]
pub(super) struct TaskTable {
    tasks: HashMap<String, TaskInfo>,
    /// Module names in order of first appearance.
    order: Vec<String>,
}

impl TaskTable {
    pub(super) fn collect(module: &Module) -> Self {
        let mut tasks: HashMap<String, TaskInfo> = HashMap::new();
        let mut order = Vec::new();
        for function in module.functions.iter().filter(|f| !f.external) {
            let role = FnRole::of(function);
            let (Some(task_name), Some(mod_name)) = (function.task_name(), function.mod_name())
            else {
                continue;
            };
            if !tasks.contains_key(mod_name) {
                order.push(mod_name.to_string());
            }
            let info = tasks.entry(mod_name.to_string()).or_default();
            info.task_name = task_name.to_string();
            let arg_type = |i: usize| {
                function
                    .args()
                    .get(i)
                    .and_then(|arg| function.value_type(*arg))
                    .cloned()
            };
            if info.state.is_none() {
                info.state = arg_type(0);
            }
            if role == FnRole::Handler {
                info.on_event.push(function.rust_name().to_string());
                if info.input.is_none() {
                    info.input = arg_type(1);
                }
                if info.output.is_none() {
                    info.output = match arg_type(2) {
                        Some(Type::Stream { item, direction })
                            if direction.can_push() && matches!(*item, Type::Variant(_)) =>
                        {
                            Some(*item)
                        }
                        _ => None,
                    };
                }
            }
            if function.is_init() {
                info.on_start.push(function.rust_name().to_string());
            }
        }
        TaskTable { tasks, order }
    }

    /// Alias every task's state and interface types for the whole render
    /// pass, so a record that mentions one is defined the same way wherever
    /// it is first used.
    pub(super) fn register_aliases(&self, printer: &mut Printer) {
        for mod_name in &self.order {
            let Some(info) = self.tasks.get(mod_name) else {
                continue;
            };
            if let Some(state) = &info.state {
                printer.set_type_alias(state, format!("{}::{}", mod_name, info.task_name));
            }
            if let Some(input) = &info.input {
                printer.set_type_alias(input, format!("{}::IInterface", mod_name));
            }
            if let Some(output) = &info.output {
                printer.set_type_alias(output, format!("{}::OInterface", mod_name));
            }
        }
    }
}

impl Emitter<'_> {
    /// Emit the task module on first use and open the `impl` block the
    /// method goes into.
    pub(super) fn open_task_impl(
        &mut self,
        function: &Function,
        role: FnRole,
    ) -> Result<(), RenderError> {
        let (Some(task_name), Some(mod_name)) = (function.task_name(), function.mod_name()) else {
            return Err(RenderError::internal(format!(
                "'{}' emitted as {:?} without task attributes",
                function.name, role
            )));
        };
        let info = self.tasks.tasks.get(mod_name).cloned().ok_or_else(|| {
            RenderError::internal(format!("no task table entry for module '{}'", mod_name))
        })?;

        if !info.emitted {
            self.emit_task_module(mod_name, &info)?;
            if let Some(entry) = self.tasks.tasks.get_mut(mod_name) {
                entry.emitted = true;
            }
            self.printer.begin_item();
        }

        self.printer
            .open(&format!("impl {}::{} {{", mod_name, task_name));
        Ok(())
    }

    fn emit_task_module(&mut self, mod_name: &str, info: &TaskInfo) -> Result<(), RenderError> {
        log::debug!("emitting task module '{}' for '{}'", mod_name, info.task_name);
        self.use_prelude();

        let mut entries: Vec<String> = Vec::new();
        entries.extend(info.on_event.iter().map(|f| format!("on_event = \"{}\"", f)));
        entries.extend(info.on_start.iter().map(|f| format!("on_start = \"{}\"", f)));
        if entries.is_empty() {
            self.printer.write_body("#[rewrite]");
        } else {
            self.printer
                .write_body(&format!("#[rewrite({})]", entries.join(", ")));
        }

        self.printer.open(&format!("pub mod {} {{", mod_name));
        self.printer.write_body("use super::*;");
        self.printer.write_body("");

        let fields = match &info.state {
            Some(Type::Record(fields)) => fields.clone(),
            Some(other) => {
                return Err(RenderError::internal(format!(
                    "task state of '{}' is not a record: {}",
                    mod_name, other
                )))
            }
            None => Vec::new(),
        };
        if self.options.annotate {
            self.printer.write_body("// The state type");
        }
        self.printer
            .open(&format!("pub struct {} {{", info.task_name));
        for field in &fields {
            let ty = self.rust_type(&field.ty)?;
            self.printer
                .write_body(&format!("pub {}: {},", field.name, ty));
        }
        self.printer.close("}");

        if let Some(input) = &info.input {
            self.emit_interface("IInterface", input)?;
        }
        if let Some(output) = &info.output {
            self.emit_interface("OInterface", output)?;
        }
        self.printer.close("}");
        self.printer.write_use(mod_name);
        Ok(())
    }

    fn emit_interface(&mut self, name: &str, ty: &Type) -> Result<(), RenderError> {
        let Type::Variant(alts) = ty else {
            return Err(RenderError::internal(format!(
                "{} must be a variant type, found {}",
                name, ty
            )));
        };
        self.printer.write_body("");
        self.printer.write_body("#[rewrite]");
        self.printer.open(&format!("pub enum {} {{", name));
        for alt in alts {
            let payload = self.rust_type(&alt.ty)?;
            self.printer
                .write_body(&format!("{}({}),", alt.name, payload));
        }
        self.printer.close("}");
        Ok(())
    }
}
