//! Type-safe identifier wrappers for mesh entities.
//!
//! Vertex and cell identifiers are plain integers on the wire, but the
//! compiler keeps them apart. Identifiers are stable: they survive
//! serialization, engine round trips and change-request application, so
//! checkpoints taken at different steps can be compared entity by entity.

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around `u64` with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Create an identifier from its raw value.
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Return the inner `u64` value.
            pub const fn into_inner(self) -> u64 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a mesh vertex.
    VertexId
}

define_id! {
    /// Unique identifier for a polygonal cell.
    CellId
}

/// Tag naming a cell type; force parameters are registered per type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellType(pub String);

impl CellType {
    /// Create a cell-type tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Borrow the tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CellType {
    fn default() -> Self {
        Self::new("default")
    }
}

impl core::fmt::Display for CellType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CellType {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_bare_integers() {
        let json = serde_json::to_string(&VertexId::new(7)).unwrap();
        assert_eq!(json, "7");
        let back: CellId = serde_json::from_str("12").unwrap();
        assert_eq!(back, CellId::new(12));
    }

    #[test]
    fn cell_type_serializes_as_bare_string() {
        let json = serde_json::to_string(&CellType::new("epithelial")).unwrap();
        assert_eq!(json, "\"epithelial\"");
    }

    #[test]
    fn id_display_matches_raw_value() {
        assert_eq!(VertexId::new(42).to_string(), "42");
        assert_eq!(CellType::default().to_string(), "default");
    }
}
