//! Output buffers and value naming for one render pass.
//!
//! Text accumulates in independent buffers (dependencies, imports, type
//! definitions, bodies) and is stitched together by [`Printer::flush`] in a
//! fixed order, so a type definition can be produced while a function body is
//! half written.

use ir::{Type, ValueId};
use std::collections::{HashMap, HashSet};

pub(crate) struct RustWriter {
    out: String,
    indent: usize,
}

impl RustWriter {
    pub(crate) fn new() -> Self {
        Self {
            out: String::new(),
            indent: 0,
        }
    }

    pub(crate) fn line(&mut self, text: &str) {
        if !text.is_empty() {
            for _ in 0..self.indent {
                self.out.push_str("    ");
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    pub(crate) fn blank(&mut self) {
        self.out.push('\n');
    }

    pub(crate) fn push_indent(&mut self) {
        self.indent += 1;
    }

    pub(crate) fn pop_indent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    /// Re-indent pre-rendered text line by line.
    pub(crate) fn text(&mut self, text: &str) {
        for line in text.lines() {
            self.line(line);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    pub(crate) fn finish(self) -> String {
        self.out
    }
}

/// Result of rendering one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedModule {
    pub source: String,
    /// One `pub use` line per generated nominal type and task module, for
    /// callers that keep generated code in a separate file.
    pub uses: String,
    /// Distinct external crates the source needs, as (name, version).
    pub dependencies: Vec<(String, String)>,
}

pub struct Printer {
    dependencies: Vec<(String, String)>,
    imports: Vec<String>,
    seen: HashSet<String>,
    uses: Vec<String>,
    type_defs: RustWriter,
    body: RustWriter,
    names: HashMap<ValueId, String>,
    type_aliases: HashMap<Type, String>,
    next_name: usize,
}

impl Default for Printer {
    fn default() -> Self {
        Self::new()
    }
}

impl Printer {
    pub fn new() -> Self {
        Self {
            dependencies: Vec::new(),
            imports: Vec::new(),
            seen: HashSet::new(),
            uses: Vec::new(),
            type_defs: RustWriter::new(),
            body: RustWriter::new(),
            names: HashMap::new(),
            type_aliases: HashMap::new(),
            next_name: 0,
        }
    }

    /// Printable name of `value`, allocating `v<n>` on first sight.
    pub fn print(&mut self, value: ValueId) -> String {
        if let Some(name) = self.names.get(&value) {
            return name.clone();
        }
        let name = format!("v{}", self.next_name);
        self.next_name += 1;
        self.names.insert(value, name.clone());
        name
    }

    pub fn print_list(&mut self, values: &[ValueId]) -> String {
        values
            .iter()
            .map(|v| self.print(*v))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn set_alias(&mut self, value: ValueId, name: impl Into<String>) {
        self.names.insert(value, name.into());
    }

    /// Spell `ty` as `name` for the rest of the render pass. The first alias
    /// registered for a type wins.
    pub fn set_type_alias(&mut self, ty: &Type, name: impl Into<String>) {
        self.type_aliases.entry(ty.clone()).or_insert_with(|| name.into());
    }

    pub fn type_alias(&self, ty: &Type) -> Option<&str> {
        self.type_aliases.get(ty).map(String::as_str)
    }

    /// Forget every value name and value alias. Called before each function
    /// body; type aliases stay.
    pub fn clear_aliases(&mut self) {
        self.names.clear();
        self.next_name = 0;
    }

    pub fn write_dependency(&mut self, name: &str, version: &str) {
        if self.seen.insert(format!("dep:{}", name)) {
            self.dependencies
                .push((name.to_string(), version.to_string()));
        }
    }

    pub fn write_import(&mut self, text: &str) {
        if self.seen.insert(format!("import:{}", text)) {
            self.imports.push(text.to_string());
        }
    }

    pub fn write_use(&mut self, path: &str) {
        if self.seen.insert(format!("use:{}", path)) {
            self.uses.push(path.to_string());
        }
    }

    pub fn write_type_def(&mut self, lines: &[String]) {
        if !self.type_defs.is_empty() {
            self.type_defs.blank();
        }
        for line in lines {
            self.type_defs.line(line);
        }
    }

    /// Start a new top-level item in the body buffer.
    pub fn begin_item(&mut self) {
        if !self.body.is_empty() {
            self.body.blank();
        }
    }

    pub fn write_body(&mut self, text: &str) {
        self.body.line(text);
    }

    /// Write `text` and indent what follows.
    pub fn open(&mut self, text: &str) {
        self.body.line(text);
        self.body.push_indent();
    }

    /// Dedent, write `text`, indent again. For `} else {`.
    pub fn reopen(&mut self, text: &str) {
        self.body.pop_indent();
        self.body.line(text);
        self.body.push_indent();
    }

    /// Dedent and write `text`.
    pub fn close(&mut self, text: &str) {
        self.body.pop_indent();
        self.body.line(text);
    }

    pub fn flush(self, module_name: &str, crate_path: &str, include: Option<&str>) -> RenderedModule {
        let mut w = RustWriter::new();
        for (name, version) in &self.dependencies {
            w.line(&format!("// cargo-dependency: {} = \"{}\"", name, version));
        }
        if !self.dependencies.is_empty() {
            w.blank();
        }

        let mut sections: Vec<String> = Vec::new();
        if !self.imports.is_empty() {
            sections.push(self.imports.join("\n"));
        }
        if let Some(include) = include.filter(|text| !text.trim().is_empty()) {
            sections.push(include.trim_end().to_string());
        }
        if !self.type_defs.is_empty() {
            sections.push(self.type_defs.finish());
        }
        if !self.body.is_empty() {
            sections.push(self.body.finish());
        }

        w.line(&format!("pub mod {} {{", module_name));
        w.push_indent();
        for (i, section) in sections.iter().enumerate() {
            if i > 0 {
                w.blank();
            }
            w.text(section);
        }
        w.pop_indent();
        w.line("}");

        let uses = self
            .uses
            .iter()
            .map(|path| format!("pub use {}::{}::{};\n", crate_path, module_name, path))
            .collect::<String>();

        RenderedModule {
            source: w.finish(),
            uses,
            dependencies: self.dependencies,
        }
    }
}
