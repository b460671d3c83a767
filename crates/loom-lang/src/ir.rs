//! Structural parse IR: design units and their extracted collections.

use serde::{Deserialize, Serialize};

/// Line/column position within a source file (both 1-indexed).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePos {
    pub line: u32,
    pub col: u32,
}

impl SourcePos {
    #[must_use]
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

/// Kind of design unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DesignUnitKind {
    Module,
    Package,
    Interface,
    Class,
    Program,
}

/// Port direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortDir {
    Input,
    Output,
    Inout,
    Ref,
}

/// Classification of a procedural `always` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlwaysKind {
    /// `always @(...)`
    Plain,
    /// `always @(*)`
    Star,
    /// `always_comb`
    Comb,
    /// `always_ff`
    Ff,
    /// `always_latch`
    Latch,
}

/// Case statement flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseKind {
    Case,
    Casex,
    Casez,
}

/// A port declaration with its raw type text preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDecl {
    pub name: String,
    pub direction: PortDir,
    /// e.g. `"wire"`, `"logic [7:0]"`, `"reg [WIDTH-1:0]"`.
    pub type_text: String,
    pub pos: SourcePos,
}

/// A parameter or localparam declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    /// Raw text of the default value expression.
    pub default_text: String,
    pub is_localparam: bool,
    pub pos: SourcePos,
}

/// A module/interface instantiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instantiation {
    pub module_name: String,
    pub instance_name: String,
    pub is_parameterized: bool,
    pub pos: SourcePos,
}

/// A procedural assignment inside an always block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// `=` vs `<=`.
    pub is_blocking: bool,
    /// LHS identifier.
    pub target: String,
    pub pos: SourcePos,
}

/// An always block with its assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlwaysBlock {
    pub kind: AlwaysKind,
    pub label: String,
    pub assignments: Vec<Assignment>,
    pub pos: SourcePos,
}

/// A case statement summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseStatement {
    pub kind: CaseKind,
    pub has_default: bool,
    pub is_unique: bool,
    pub is_priority: bool,
    pub pos: SourcePos,
}

/// A net or variable declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalDecl {
    pub name: String,
    pub type_text: String,
    pub pos: SourcePos,
}

/// A generate region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateBlock {
    pub label: String,
    pub has_label: bool,
    pub pos: SourcePos,
}

/// A `begin : label … end : label` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledBlock {
    pub begin_label: String,
    pub end_label: String,
    pub labels_match: bool,
    pub pos: SourcePos,
}

/// An `import pkg::sym;` or `import pkg::*;` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportDecl {
    pub package_name: String,
    pub symbol: String,
    pub is_wildcard: bool,
    pub pos: SourcePos,
}

/// One design unit and everything extracted from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignUnit {
    pub kind: DesignUnitKind,
    pub name: String,
    pub start_line: u32,
    pub end_line: u32,
    /// Nesting depth; 0 for top-level units.
    pub depth: u32,

    pub ports: Vec<PortDecl>,
    pub params: Vec<ParamDecl>,
    pub instantiations: Vec<Instantiation>,
    pub imports: Vec<ImportDecl>,
    pub always_blocks: Vec<AlwaysBlock>,
    pub case_statements: Vec<CaseStatement>,
    pub signals: Vec<SignalDecl>,
    pub generate_blocks: Vec<GenerateBlock>,
    pub labeled_blocks: Vec<LabeledBlock>,
    pub has_defparam: bool,

    pub pos: SourcePos,
}

impl DesignUnit {
    #[must_use]
    pub fn new(kind: DesignUnitKind, name: String, depth: u32, pos: SourcePos) -> Self {
        Self {
            kind,
            name,
            start_line: pos.line,
            end_line: pos.line,
            depth,
            ports: Vec::new(),
            params: Vec::new(),
            instantiations: Vec::new(),
            imports: Vec::new(),
            always_blocks: Vec::new(),
            case_statements: Vec::new(),
            signals: Vec::new(),
            generate_blocks: Vec::new(),
            labeled_blocks: Vec::new(),
            has_defparam: false,
            pos,
        }
    }
}

/// A parser diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub message: String,
    pub file: String,
    pub line: u32,
    pub col: u32,
}

/// The parser's output: design units plus diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseResult {
    pub units: Vec<DesignUnit>,
    pub diagnostics: Vec<Diagnostic>,
}
