use ir::ValueId;
use std::fmt;
use thiserror::Error;

/// Well-formedness violations found before or during rendering.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("module is missing a name (is the module implicitly created?)")]
    MissingModuleName,
    #[error("expected {expected} arguments to body region, found {found}")]
    BodyArity { expected: usize, found: usize },
    #[error("expected body region argument #{index} to be of type {expected}, found {found}")]
    BodyArgument {
        index: usize,
        expected: String,
        found: String,
    },
    #[error("task event handlers are expected to have 3 arguments, found {found}")]
    HandlerArity { found: usize },
    #[error("the {position} argument to a task event handler is expected to be {expected}, found {found}")]
    HandlerArgument {
        position: &'static str,
        expected: &'static str,
        found: String,
    },
    #[error("function has a task name but no module name")]
    MissingTaskModule,
    #[error("task functions of module '{module}' disagree on {what}")]
    TaskStateMismatch { module: String, what: &'static str },
    #[error("the first argument to a task method is expected to be a struct, found {found}")]
    MethodReceiver { found: String },
    #[error("'{op}' requires an enclosing task method")]
    OutsideTask { op: &'static str },
    #[error("must be inside a loop region")]
    BreakOutsideLoop,
    #[error("returns {found} values parent expects {expected}")]
    BreakArity { expected: usize, found: usize },
    #[error("type signature ({found}) does not match signature of parent loop ({expected})")]
    BreakType { expected: String, found: String },
    #[error("expects terminators to be 'loop.break', 'block.result' or 'return' operations, found '{found}'")]
    BadIfTerminator { found: &'static str },
    #[error("branch yields {found}, expected {expected}")]
    IfResultMismatch { expected: String, found: String },
    #[error("{region} block must end with '{expected}'")]
    MissingTerminator {
        region: &'static str,
        expected: &'static str,
    },
    #[error("'{op}' must be the last operation of its region")]
    MisplacedTerminator { op: &'static str },
    #[error("loop {what}: expected {expected}, found {found}")]
    LoopArity {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("loop {what}: expected ({expected}), found ({found})")]
    LoopType {
        what: &'static str,
        expected: String,
        found: String,
    },
    #[error("cannot return a value from a void function")]
    ReturnFromVoid,
    #[error("operation must return a {expected} value")]
    MissingReturnValue { expected: String },
    #[error("result type does not match the type of the function: expected {expected} but found {found}")]
    ReturnMismatch { expected: String, found: String },
    #[error("expected {expected} results, found {found}")]
    ResultCount { expected: usize, found: usize },
    #[error("expected {expected} operands, found {found}")]
    OperandCount { expected: usize, found: usize },
    #[error("operand #{index} has type {found}, expected {expected}")]
    OperandType {
        index: usize,
        expected: String,
        found: String,
    },
    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("no field '{field}' in {ty}")]
    UnknownField { field: String, ty: String },
    #[error("no alternative '{variant}' in {ty}")]
    UnknownVariant { variant: String, ty: String },
    #[error("call to undefined function '{name}'")]
    UnknownCallee { name: String },
    #[error("tensor of shape {shape:?} cannot hold {found} elements of rank-{rank} type")]
    TensorShape {
        shape: Vec<usize>,
        rank: usize,
        found: usize,
    },
    #[error("stream type {ty} may not be nested inside another type")]
    NestedStream { ty: String },
    #[error("use of undefined value {value}")]
    UnknownValue { value: ValueId },
    #[error("'{name}' is not a valid Rust identifier")]
    InvalidIdentifier { name: String },
    #[error("member '{name}' appears more than once in {ty}")]
    DuplicateMember { name: String, ty: String },
    #[error("literal {literal} does not fit in {ty}")]
    LiteralRange { literal: String, ty: String },
    #[error("'{name}' is reserved for generated local names")]
    ReservedName { name: String },
    #[error("type {ty} is already rendered as {first}, cannot also be {second}")]
    SharedTaskType {
        ty: String,
        first: String,
        second: String,
    },
}

impl StructuralError {
    pub fn code(&self) -> &'static str {
        match self {
            StructuralError::MissingModuleName => "RS001",
            StructuralError::BodyArity { .. } => "RS002",
            StructuralError::BodyArgument { .. } => "RS003",
            StructuralError::HandlerArity { .. } => "RS004",
            StructuralError::HandlerArgument { .. } => "RS005",
            StructuralError::MissingTaskModule => "RS006",
            StructuralError::TaskStateMismatch { .. } => "RS007",
            StructuralError::OutsideTask { .. } => "RS008",
            StructuralError::MethodReceiver { .. } => "RS009",
            StructuralError::BreakOutsideLoop => "RS010",
            StructuralError::BreakArity { .. } => "RS011",
            StructuralError::BreakType { .. } => "RS012",
            StructuralError::BadIfTerminator { .. } => "RS013",
            StructuralError::IfResultMismatch { .. } => "RS014",
            StructuralError::MissingTerminator { .. } => "RS015",
            StructuralError::MisplacedTerminator { .. } => "RS016",
            StructuralError::LoopArity { .. } => "RS017",
            StructuralError::LoopType { .. } => "RS018",
            StructuralError::ReturnFromVoid => "RS020",
            StructuralError::MissingReturnValue { .. } => "RS021",
            StructuralError::ReturnMismatch { .. } => "RS022",
            StructuralError::ResultCount { .. } => "RS030",
            StructuralError::OperandCount { .. } => "RS031",
            StructuralError::OperandType { .. } => "RS032",
            StructuralError::TypeMismatch { .. } => "RS033",
            StructuralError::UnknownField { .. } => "RS034",
            StructuralError::UnknownVariant { .. } => "RS035",
            StructuralError::UnknownCallee { .. } => "RS036",
            StructuralError::TensorShape { .. } => "RS037",
            StructuralError::NestedStream { .. } => "RS038",
            StructuralError::UnknownValue { .. } => "RS039",
            StructuralError::InvalidIdentifier { .. } => "RS040",
            StructuralError::DuplicateMember { .. } => "RS041",
            StructuralError::LiteralRange { .. } => "RS042",
            StructuralError::ReservedName { .. } => "RS043",
            StructuralError::SharedTaskType { .. } => "RS044",
        }
    }
}

/// Where a structural error was found: the function, the operation's path
/// from the function body (`2.then.0`) and its mnemonic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub function: Option<String>,
    pub path: String,
    pub op: Option<&'static str>,
}

impl Location {
    pub fn module() -> Self {
        Self::default()
    }

    pub fn function(name: &str) -> Self {
        Location {
            function: Some(name.to_string()),
            path: String::new(),
            op: None,
        }
    }

    pub fn op(function: &str, path: &str, op: &'static str) -> Self {
        Location {
            function: Some(function.to_string()),
            path: path.to_string(),
            op: Some(op),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.function, self.op) {
            (None, _) => write!(f, "module"),
            (Some(func), None) => write!(f, "function '{}'", func),
            (Some(func), Some(op)) => write!(f, "function '{}', op {} ('{}')", func, self.path, op),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("[{}] {}: {}", .kind.code(), .location, .kind)]
    Structural {
        location: Location,
        kind: StructuralError,
    },
    /// Registry or printer bookkeeping went wrong. Never a property of the
    /// input alone.
    #[error("[RS900] internal invariant violated: {0}")]
    Internal(String),
}

impl RenderError {
    pub fn structural(location: Location, kind: StructuralError) -> Self {
        RenderError::Structural { location, kind }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        RenderError::Internal(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            RenderError::Structural { kind, .. } => kind.code(),
            RenderError::Internal(_) => "RS900",
        }
    }

    pub fn kind(&self) -> Option<&StructuralError> {
        match self {
            RenderError::Structural { kind, .. } => Some(kind),
            RenderError::Internal(_) => None,
        }
    }
}
