use std::fmt::Display;

/// An ID for a "unit", the vehicle whose position is being reported.
///
/// The identifier is opaque and used verbatim in every transmitted envelope. It is never empty:
/// construction through [`UnitId::parse`] trims surrounding whitespace and rejects blank input.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct UnitId(Box<str>);

/// Indicates that a unit identifier was blank after trimming.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("a unit id must contain at least one non-whitespace character")]
pub struct InvalidUnitId;

impl UnitId {
    /// Parse operator input into a [`UnitId`], trimming surrounding whitespace.
    pub fn parse(raw: &str) -> Result<Self, InvalidUnitId> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InvalidUnitId);
        }

        Ok(Self(trimmed.into()))
    }

    /// Returns the underlying string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for UnitId {
    type Error = InvalidUnitId;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl TryFrom<&str> for UnitId {
    type Error = InvalidUnitId;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl std::str::FromStr for UnitId {
    type Err = InvalidUnitId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
