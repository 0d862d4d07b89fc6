//! Metadata information regarding the database and tracked information.

use std::collections::BTreeMap;

use enum_iterator::Sequence;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The scalar (storage) types supported by the Engine.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Sequence,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Boolean,
    Smallint,
    Integer,
    Bigint,
    Real,
    #[serde(rename = "double precision")]
    DoublePrecision,
    Numeric,
    Character,
    #[serde(rename = "character varying")]
    CharacterVarying,
    Text,
    Json,
    Date,
    #[serde(rename = "time without time zone")]
    TimeWithoutTimeZone,
    #[serde(rename = "timestamp with time zone")]
    TimestampWithTimeZone,
    #[serde(rename = "timestamp without time zone")]
    TimestampWithoutTimeZone,
    Uuid,
    Any,
}

/// Broad families of scalar types. Two types reconcile when they share a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Boolean,
    Numeric,
    String,
    Temporal,
    Other,
}

impl ScalarType {
    pub fn family(&self) -> TypeFamily {
        match self {
            ScalarType::Boolean => TypeFamily::Boolean,
            ScalarType::Smallint
            | ScalarType::Integer
            | ScalarType::Bigint
            | ScalarType::Real
            | ScalarType::DoublePrecision
            | ScalarType::Numeric => TypeFamily::Numeric,
            ScalarType::Character | ScalarType::CharacterVarying | ScalarType::Text => {
                TypeFamily::String
            }
            ScalarType::Date
            | ScalarType::TimeWithoutTimeZone
            | ScalarType::TimestampWithTimeZone
            | ScalarType::TimestampWithoutTimeZone => TypeFamily::Temporal,
            ScalarType::Json | ScalarType::Uuid | ScalarType::Any => TypeFamily::Other,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.family() == TypeFamily::Numeric
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            ScalarType::Smallint | ScalarType::Integer | ScalarType::Bigint
        )
    }

    /// Can values of this type be compared with `<`, and therefore fed to `MIN` and `MAX`?
    pub fn is_orderable(&self) -> bool {
        matches!(
            self.family(),
            TypeFamily::Numeric | TypeFamily::String | TypeFamily::Temporal
        )
    }

    /// Can a value of type `self` be converted into `target` without losing its meaning?
    /// `Any` reconciles with everything.
    pub fn reconciles_with(&self, target: ScalarType) -> bool {
        *self == target
            || *self == ScalarType::Any
            || target == ScalarType::Any
            || (self.family() == target.family() && self.family() != TypeFamily::Other)
    }
}

impl std::fmt::Display for ScalarType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ScalarType::DoublePrecision => write!(f, "double precision"),
            ScalarType::CharacterVarying => write!(f, "character varying"),
            ScalarType::TimeWithoutTimeZone => write!(f, "time without time zone"),
            ScalarType::TimestampWithTimeZone => write!(f, "timestamp with time zone"),
            ScalarType::TimestampWithoutTimeZone => write!(f, "timestamp without time zone"),
            _ => write!(f, "{}", format!("{self:?}").to_lowercase()),
        }
    }
}

/// Mapping from an entity name to the table it is stored in.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct TablesInfo(pub BTreeMap<String, TableInfo>);

impl TablesInfo {
    pub fn empty() -> Self {
        TablesInfo(BTreeMap::new())
    }
}

/// Information about a database table (or any other kind of relation).
///
/// `columns` maps the entity's field names to the columns storing them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TableInfo {
    pub schema_name: String,
    pub table_name: String,
    pub columns: BTreeMap<String, ColumnInfo>,
}

/// Information about a database column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnInfo {
    pub name: String,
    pub r#type: ScalarType,
}
