//! Identifiers and value types shared by the cache and its consumers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an entity or relationship class
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ClassId(pub i64);

impl ClassId {
    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ClassId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Identity of a physical table, resolved through [`crate::SchemaScope`]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct TableId(pub i64);

impl TableId {
    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TableId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Physical kind of a table, stored in `ec_Table.Type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    /// Table owned by a class hierarchy
    Primary,
    /// Table holding split-off columns, joined to its parent by primary key
    Joined,
    /// Pre-existing table mapped read-only
    Existing,
    /// Table holding columns that did not fit into the parent table
    Overflow,
    /// Table that is never created (abstract/mixin bases)
    Virtual,
}

impl TableKind {
    /// Value stored in `ec_Table.Type`
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Primary => 0,
            Self::Joined => 1,
            Self::Existing => 2,
            Self::Overflow => 3,
            Self::Virtual => 4,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Primary),
            1 => Some(Self::Joined),
            2 => Some(Self::Existing),
            3 => Some(Self::Overflow),
            4 => Some(Self::Virtual),
            _ => None,
        }
    }

    /// Joined, overflow and virtual tables never hold a horizontal partition
    /// of an ordinary class.
    pub fn is_split_or_virtual(self) -> bool {
        matches!(self, Self::Joined | Self::Overflow | Self::Virtual)
    }

    pub fn is_virtual(self) -> bool {
        self == Self::Virtual
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Joined => "joined",
            Self::Existing => "existing",
            Self::Overflow => "overflow",
            Self::Virtual => "virtual",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A physical table as described by `ec_Table`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbTable {
    pub id: TableId,
    pub name: String,
    pub kind: TableKind,
    /// Parent table for joined and overflow tables
    pub parent: Option<TableId>,
    /// Name of the column holding the class id of each row, if any
    pub class_id_column: Option<String>,
}

impl DbTable {
    pub fn is_virtual(&self) -> bool {
        self.kind.is_virtual()
    }
}

/// End(s) of a relationship a constraint class may occupy
///
/// `Both` is the union of `Source` and `Target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipEnd {
    Source,
    Target,
    Both,
}

impl RelationshipEnd {
    const SOURCE_BIT: u8 = 0b01;
    const TARGET_BIT: u8 = 0b10;

    fn bits(self) -> u8 {
        match self {
            Self::Source => Self::SOURCE_BIT,
            Self::Target => Self::TARGET_BIT,
            Self::Both => Self::SOURCE_BIT | Self::TARGET_BIT,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits {
            Self::SOURCE_BIT => Self::Source,
            Self::TARGET_BIT => Self::Target,
            _ => Self::Both,
        }
    }

    /// Decode `ec_RelationshipConstraint.RelationshipEnd` (0 source, 1 target)
    pub fn from_db(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Source),
            1 => Some(Self::Target),
            _ => None,
        }
    }

    /// Value stored in `ec_RelationshipConstraint.RelationshipEnd`.
    ///
    /// `Both` has no storage representation.
    pub fn to_db(self) -> Option<i64> {
        match self {
            Self::Source => Some(0),
            Self::Target => Some(1),
            Self::Both => None,
        }
    }

    /// Union of two ends
    pub fn merge(self, other: Self) -> Self {
        Self::from_bits(self.bits() | other.bits())
    }

    /// True if every end in `other` is also in `self`
    pub fn contains(self, other: Self) -> bool {
        self.bits() & other.bits() == other.bits()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Target => "target",
            Self::Both => "both",
        }
    }
}

impl fmt::Display for RelationshipEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
