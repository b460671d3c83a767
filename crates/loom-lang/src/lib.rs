//! Verilog/SystemVerilog scanner and structural design-unit parser.
//!
//! This is not a simulator front-end. The parser extracts the structural
//! shape of a design (units, ports, parameters, instantiations, procedural
//! blocks) and recovers from anything it does not understand by skipping to
//! the next structural keyword.

pub mod ir;
pub mod lexer;
pub mod parser;

pub use ir::{
    AlwaysBlock, AlwaysKind, Assignment, CaseKind, CaseStatement, DesignUnit,
    DesignUnitKind, Diagnostic, GenerateBlock, ImportDecl, Instantiation,
    LabeledBlock, ParamDecl, ParseResult, PortDecl, PortDir, SignalDecl,
    SourcePos,
};
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::Parser;

/// Lex and parse a source buffer in one step.
#[must_use]
pub fn parse_source(source: &str, file: &str) -> ParseResult {
    let tokens = Lexer::new(source).tokenize();
    Parser::new(tokens, file).parse()
}
