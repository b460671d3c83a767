//! Target expressions: the small boolean language used to gate source groups.
//!
//! ```text
//! *                      always true
//! fpga                   true iff "fpga" is in the active target set
//! all(fpga, not(sim))    conjunction; all() is true
//! any(asic, fpga)        disjunction; any() is false
//! ```

use loom_core::{Error, ErrorCode, Result};
use std::collections::BTreeSet;
use std::fmt;

/// The set of active target names.
pub type TargetSet = BTreeSet<String>;

/// A parsed target expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetExpr {
    Wildcard,
    Ident(String),
    All(Vec<TargetExpr>),
    Any(Vec<TargetExpr>),
    Not(Box<TargetExpr>),
}

impl TargetExpr {
    /// Evaluate against an active target set.
    #[must_use]
    pub fn evaluate(&self, active: &TargetSet) -> bool {
        match self {
            Self::Wildcard => true,
            Self::Ident(name) => active.contains(name),
            Self::All(children) => children.iter().all(|c| c.evaluate(active)),
            Self::Any(children) => children.iter().any(|c| c.evaluate(active)),
            Self::Not(child) => !child.evaluate(active),
        }
    }

    /// Parse a target expression.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidArg` error for empty input and a `Parse` error for
    /// malformed expressions or trailing garbage.
    pub fn parse(input: &str) -> Result<Self> {
        if input.is_empty() {
            return Err(Error::new(ErrorCode::InvalidArg, "empty target expression"));
        }

        let mut parser = ExprParser { input, pos: 0 };
        let expr = parser.parse_expr()?;
        parser.skip_ws();
        if !parser.at_end() {
            return Err(Error::new(
                ErrorCode::Parse,
                "unexpected characters after target expression",
            )
            .with_hint(format!("at position {}", parser.pos)));
        }
        Ok(expr)
    }
}

impl fmt::Display for TargetExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard => f.write_str("*"),
            Self::Ident(name) => f.write_str(name),
            Self::All(children) | Self::Any(children) => {
                f.write_str(if matches!(self, Self::All(_)) {
                    "all("
                } else {
                    "any("
                })?;
                for (i, c) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str(")")
            }
            Self::Not(child) => write!(f, "not({child})"),
        }
    }
}

struct ExprParser<'a> {
    input: &'a str,
    pos: usize,
}

impl ExprParser<'_> {
    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.pos += 1;
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn try_consume(&mut self, keyword: &str) -> bool {
        if self.input[self.pos..].starts_with(keyword) {
            self.pos += keyword.len();
            return true;
        }
        false
    }

    fn parse_expr(&mut self) -> Result<TargetExpr> {
        self.skip_ws();
        match self.peek() {
            None => Err(Error::new(ErrorCode::Parse, "unexpected end of input")),
            Some('*') => {
                self.pos += 1;
                Ok(TargetExpr::Wildcard)
            }
            _ if self.try_consume("all(") => self.parse_compound(true),
            _ if self.try_consume("any(") => self.parse_compound(false),
            _ if self.try_consume("not(") => self.parse_not(),
            _ => self.parse_ident(),
        }
    }

    fn parse_compound(&mut self, is_all: bool) -> Result<TargetExpr> {
        let mut children = Vec::new();
        self.skip_ws();

        if self.peek() != Some(')') {
            children.push(self.parse_expr()?);
            self.skip_ws();
            while self.peek() == Some(',') {
                self.pos += 1;
                children.push(self.parse_expr()?);
                self.skip_ws();
            }
        }

        if self.peek() != Some(')') {
            return Err(Error::new(
                ErrorCode::Parse,
                "expected ')' in target expression",
            )
            .with_hint("check for unclosed parentheses"));
        }
        self.pos += 1;

        Ok(if is_all {
            TargetExpr::All(children)
        } else {
            TargetExpr::Any(children)
        })
    }

    fn parse_not(&mut self) -> Result<TargetExpr> {
        let child = self.parse_expr()?;
        self.skip_ws();
        if self.peek() != Some(')') {
            return Err(Error::new(
                ErrorCode::Parse,
                "expected ')' after not() argument",
            )
            .with_hint("not() takes exactly one argument"));
        }
        self.pos += 1;
        Ok(TargetExpr::Not(Box::new(child)))
    }

    fn parse_ident(&mut self) -> Result<TargetExpr> {
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() => self.pos += 1,
            Some(c) => {
                return Err(Error::new(
                    ErrorCode::Parse,
                    format!("invalid target name starting with '{c}'"),
                )
                .with_hint("target names must start with a letter"));
            }
            None => return Err(Error::new(ErrorCode::Parse, "expected target name")),
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            self.pos += 1;
        }
        Ok(TargetExpr::Ident(self.input[start..self.pos].to_string()))
    }
}

/// Returns true if `name` matches `[a-zA-Z][a-zA-Z0-9_-]*`.
#[must_use]
pub fn is_valid_target_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Parse a comma-separated target set, e.g. `"fpga, sim"`.
///
/// # Errors
///
/// Returns an `InvalidArg` error for empty input and a `Parse` error for
/// empty or malformed names.
pub fn parse_target_set(input: &str) -> Result<TargetSet> {
    if input.is_empty() {
        return Err(Error::new(ErrorCode::InvalidArg, "empty target set string"));
    }

    let mut set = TargetSet::new();
    for token in input.split(',') {
        let name = token.trim();
        if name.is_empty() {
            return Err(Error::new(ErrorCode::Parse, "empty target name in target set")
                .with_hint("check for consecutive commas or trailing commas"));
        }
        if !is_valid_target_name(name) {
            return Err(Error::new(
                ErrorCode::Parse,
                format!("invalid target name '{name}'"),
            )
            .with_hint("target names must match [a-zA-Z][a-zA-Z0-9_-]*"));
        }
        set.insert(name.to_string());
    }
    Ok(set)
}

/// Keep every group whose expression is absent or evaluates true.
#[must_use]
pub fn filter_source_groups(
    groups: &[crate::manifest::SourceGroup],
    active: &TargetSet,
) -> Vec<crate::manifest::SourceGroup> {
    groups
        .iter()
        .filter(|g| g.target.as_ref().map_or(true, |t| t.evaluate(active)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::SourceGroup;

    fn set(names: &[&str]) -> TargetSet {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn filter_keeps_untargeted_and_matching_groups() {
        let groups = vec![
            SourceGroup {
                target: None,
                files: vec!["always.sv".into()],
                include_dirs: vec![],
                defines: vec![],
            },
            SourceGroup {
                target: Some(TargetExpr::parse("fpga").unwrap()),
                files: vec!["fpga.sv".into()],
                include_dirs: vec![],
                defines: vec![],
            },
            SourceGroup {
                target: Some(TargetExpr::parse("not(fpga)").unwrap()),
                files: vec!["other.sv".into()],
                include_dirs: vec![],
                defines: vec![],
            },
        ];

        let kept = filter_source_groups(&groups, &set(&["fpga"]));
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].files, vec!["always.sv"]);
        assert_eq!(kept[1].files, vec!["fpga.sv"]);
    }

    #[test]
    fn wildcard_always_true() {
        let e = TargetExpr::parse("*").unwrap();
        assert!(e.evaluate(&set(&[])));
        assert!(e.evaluate(&set(&["fpga"])));
    }

    #[test]
    fn identifier_membership() {
        let e = TargetExpr::parse("fpga").unwrap();
        assert!(e.evaluate(&set(&["fpga", "sim"])));
        assert!(!e.evaluate(&set(&["sim"])));
    }

    #[test]
    fn all_and_any() {
        let e = TargetExpr::parse("all(fpga, sim)").unwrap();
        assert!(e.evaluate(&set(&["fpga", "sim"])));
        assert!(!e.evaluate(&set(&["fpga"])));

        let e = TargetExpr::parse("any(asic, fpga)").unwrap();
        assert!(e.evaluate(&set(&["fpga"])));
        assert!(!e.evaluate(&set(&["sim"])));
    }

    #[test]
    fn empty_all_true_empty_any_false() {
        assert!(TargetExpr::parse("all()").unwrap().evaluate(&set(&[])));
        assert!(!TargetExpr::parse("any()").unwrap().evaluate(&set(&[])));
    }

    #[test]
    fn negation() {
        let e = TargetExpr::parse("not(sim)").unwrap();
        assert!(e.evaluate(&set(&["fpga"])));
        assert!(!e.evaluate(&set(&["sim"])));
    }

    #[test]
    fn nested_expression() {
        let e = TargetExpr::parse("all(fpga, not(any(sim, lint)))").unwrap();
        assert!(e.evaluate(&set(&["fpga"])));
        assert!(!e.evaluate(&set(&["fpga", "sim"])));
    }

    #[test]
    fn whitespace_tolerated() {
        let e = TargetExpr::parse("all( fpga , sim )").unwrap();
        assert!(e.evaluate(&set(&["fpga", "sim"])));
    }

    #[test]
    fn display_roundtrip() {
        for src in ["*", "fpga", "all(a, b)", "any()", "not(x)"] {
            let e = TargetExpr::parse(src).unwrap();
            assert_eq!(e.to_string(), src);
        }
    }

    #[test]
    fn malformed_rejected() {
        assert!(TargetExpr::parse("").is_err());
        assert!(TargetExpr::parse("all(fpga").is_err());
        assert!(TargetExpr::parse("not(a, b)").is_err());
        assert!(TargetExpr::parse("fpga extra").is_err());
        assert!(TargetExpr::parse("9bad").is_err());
    }

    #[test]
    fn target_set_parsing() {
        let s = parse_target_set("fpga, sim").unwrap();
        assert!(s.contains("fpga") && s.contains("sim"));
        assert!(parse_target_set("").is_err());
        assert!(parse_target_set("a,,b").is_err());
        assert!(parse_target_set("bad name").is_err());
    }
}
