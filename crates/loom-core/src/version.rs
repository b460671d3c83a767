//! Version and constraint algebra for dependency requirements.
//!
//! Versions are `major.minor.micro` with an optional prerelease label.
//! A prerelease orders strictly before the same release triple, and never
//! satisfies a constraint: resolution only ever picks prereleases when a tag
//! is named explicitly.
//!
//! Constraint right-hand sides are *partial* versions (`"1"`, `"1.2"`), and a
//! bare version with no operator means caret, the same default Cargo uses.

use crate::error::{Error, ErrorCode, Result};
use std::cmp::Ordering;
use std::fmt;

/// A fully-specified version: `major.minor.micro[-label]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub micro: u64,
    /// Prerelease label, e.g. `rc1` in `2.0.0-rc1`.
    pub label: Option<String>,
}

impl Version {
    /// Construct a release version with no label.
    #[must_use]
    pub fn new(major: u64, minor: u64, micro: u64) -> Self {
        Self {
            major,
            minor,
            micro,
            label: None,
        }
    }

    /// Returns true if this version carries a prerelease label.
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        self.label.is_some()
    }

    /// Parse a version string.
    ///
    /// # Errors
    ///
    /// Returns a `Version` error for empty input, missing components,
    /// non-numeric components, or a trailing `-` with no label.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::new(ErrorCode::Version, "empty version string"));
        }

        let (triple, label) = match s.split_once('-') {
            Some((t, l)) => {
                if l.is_empty() {
                    return Err(Error::new(
                        ErrorCode::Version,
                        format!("empty label after '-' in '{s}'"),
                    ));
                }
                (t, Some(l.to_string()))
            }
            None => (s, None),
        };

        let mut parts = triple.split('.');
        let major = parse_component(parts.next(), s, "major")?;
        let minor = parse_component(parts.next(), s, "minor")?;
        let micro = parse_component(parts.next(), s, "micro")?;
        if parts.next().is_some() {
            return Err(Error::new(
                ErrorCode::Version,
                format!("too many components in version '{s}'"),
            )
            .with_hint("expected format: major.minor.micro[-label]"));
        }

        Ok(Self {
            major,
            minor,
            micro,
            label,
        })
    }
}

fn parse_component(part: Option<&str>, full: &str, which: &str) -> Result<u64> {
    let part = part.ok_or_else(|| {
        Error::new(ErrorCode::Version, format!("invalid version '{full}'"))
            .with_hint("expected format: major.minor.micro[-label]")
    })?;
    part.parse::<u64>().map_err(|_| {
        Error::new(
            ErrorCode::Version,
            format!("invalid {which} version in '{full}'"),
        )
    })
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.micro)
            .cmp(&(other.major, other.minor, other.micro))
            .then_with(|| match (&self.label, &other.label) {
                (None, None) => Ordering::Equal,
                // Prerelease orders before the same release triple.
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if let Some(label) = &self.label {
            write!(f, "-{label}")?;
        }
        Ok(())
    }
}

/// A partially-specified version used on constraint right-hand sides.
///
/// Major is required; minor and micro may be unset. `parse("1")` round-trips
/// through `to_string` as `"1"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartialVersion {
    pub major: u64,
    pub minor: Option<u64>,
    pub micro: Option<u64>,
}

impl PartialVersion {
    /// Parse a partial version: `"1"`, `"1.2"`, or `"1.2.3"`.
    ///
    /// # Errors
    ///
    /// Returns a `Version` error for empty or non-numeric input.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::new(
                ErrorCode::Version,
                "empty partial version string",
            ));
        }

        let mut parts = s.split('.');
        let parse_num = |p: &str| {
            p.parse::<u64>().map_err(|_| {
                Error::new(
                    ErrorCode::Version,
                    format!("invalid partial version '{s}'"),
                )
            })
        };

        let major = parse_num(parts.next().unwrap_or_default())?;
        let minor = parts.next().map(parse_num).transpose()?;
        let micro = parts.next().map(parse_num).transpose()?;
        if parts.next().is_some() {
            return Err(Error::new(
                ErrorCode::Version,
                format!("too many components in partial version '{s}'"),
            ));
        }

        Ok(Self {
            major,
            minor,
            micro,
        })
    }

    /// Expand unset components to zero, yielding a full release version.
    #[must_use]
    pub fn floor(&self) -> Version {
        Version::new(self.major, self.minor.unwrap_or(0), self.micro.unwrap_or(0))
    }
}

impl fmt::Display for PartialVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.major)?;
        if let Some(minor) = self.minor {
            write!(f, ".{minor}")?;
            if let Some(micro) = self.micro {
                write!(f, ".{micro}")?;
            }
        }
        Ok(())
    }
}

/// Constraint operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintOp {
    /// `=X.Y.Z`: exact release match.
    Exact,
    /// `^X.Y.Z`: compatible within the leading nonzero component.
    Caret,
    /// `~X.Y.Z`: patch-level changes only.
    Tilde,
    GreaterEq,
    Greater,
    LessEq,
    Less,
}

/// A single operator + partial version pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub op: ConstraintOp,
    pub version: PartialVersion,
}

impl Constraint {
    /// Check whether a version satisfies this constraint.
    ///
    /// Prerelease versions never match: only an explicit tag can select one.
    #[must_use]
    pub fn matches(&self, v: &Version) -> bool {
        if v.is_prerelease() {
            return false;
        }

        let req = self.version.floor();
        match self.op {
            ConstraintOp::Exact => {
                v.major == req.major && v.minor == req.minor && v.micro == req.micro
            }
            ConstraintOp::Caret => {
                if *v < req {
                    return false;
                }
                if req.major > 0 {
                    v.major == req.major
                } else if req.minor > 0 {
                    v.major == 0 && v.minor == req.minor
                } else {
                    v.major == 0 && v.minor == 0 && v.micro == req.micro
                }
            }
            ConstraintOp::Tilde => {
                *v >= req && v.major == req.major && v.minor == req.minor
            }
            ConstraintOp::GreaterEq => *v >= req,
            ConstraintOp::Greater => *v > req,
            ConstraintOp::LessEq => *v <= req,
            ConstraintOp::Less => *v < req,
        }
    }

    fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (op, rest) = if let Some(r) = s.strip_prefix("^") {
            (ConstraintOp::Caret, r)
        } else if let Some(r) = s.strip_prefix("~") {
            (ConstraintOp::Tilde, r)
        } else if let Some(r) = s.strip_prefix("=") {
            (ConstraintOp::Exact, r)
        } else if let Some(r) = s.strip_prefix(">=") {
            (ConstraintOp::GreaterEq, r)
        } else if let Some(r) = s.strip_prefix(">") {
            (ConstraintOp::Greater, r)
        } else if let Some(r) = s.strip_prefix("<=") {
            (ConstraintOp::LessEq, r)
        } else if let Some(r) = s.strip_prefix("<") {
            (ConstraintOp::Less, r)
        } else {
            // No operator: caret, the same default Cargo uses.
            (ConstraintOp::Caret, s)
        };

        let rest = rest.trim();
        if rest.is_empty() {
            return Err(Error::new(
                ErrorCode::Version,
                format!("missing version in constraint '{s}'"),
            ));
        }

        Ok(Self {
            op,
            version: PartialVersion::parse(rest)?,
        })
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.op {
            ConstraintOp::Exact => "=",
            ConstraintOp::Caret => "^",
            ConstraintOp::Tilde => "~",
            ConstraintOp::GreaterEq => ">=",
            ConstraintOp::Greater => ">",
            ConstraintOp::LessEq => "<=",
            ConstraintOp::Less => "<",
        };
        write!(f, "{prefix}{}", self.version)
    }
}

/// A comma-separated AND list of constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionReq {
    pub constraints: Vec<Constraint>,
}

impl VersionReq {
    /// Parse a requirement like `">=1.2, <2.0"`.
    ///
    /// # Errors
    ///
    /// Returns a `Version` error for empty input or any malformed constraint.
    pub fn parse(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Err(Error::new(ErrorCode::Version, "empty version requirement"));
        }

        let constraints = s
            .split(',')
            .map(Constraint::parse)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { constraints })
    }

    /// A version matches iff every constraint matches.
    #[must_use]
    pub fn matches(&self, v: &Version) -> bool {
        self.constraints.iter().all(|c| c.matches(v))
    }
}

impl fmt::Display for VersionReq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.constraints.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{c}")?;
        }
        Ok(())
    }
}
