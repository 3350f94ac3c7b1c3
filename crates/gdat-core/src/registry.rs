//! Parameter registry: the authoritative id -> (name, unit, wire format) map.
//!
//! The registry is loaded once, before decoding, and never mutated. Payload
//! layout is described by [`WireFormat`], an explicit enumeration of the
//! big-endian scalar encodings the logger emits.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid registry JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate parameter id {id} ({first} and {second})")]
    DuplicateId {
        id: u16,
        first: String,
        second: String,
    },
    #[error("registry defines no parameters")]
    Empty,
}

/// Numeric family of a wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    Integer,
    Float,
}

/// Big-endian scalar encoding of a parameter payload.
///
/// # Examples
/// ```
/// use gdat_core::{NumericKind, WireFormat};
///
/// assert_eq!(WireFormat::I16.width(), 2);
/// assert!(WireFormat::I16.is_signed());
/// assert_eq!(WireFormat::F32.kind(), NumericKind::Float);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl WireFormat {
    /// Payload width in bytes.
    pub fn width(self) -> usize {
        match self {
            WireFormat::U8 | WireFormat::I8 => 1,
            WireFormat::U16 | WireFormat::I16 => 2,
            WireFormat::U32 | WireFormat::I32 | WireFormat::F32 => 4,
            WireFormat::U64 | WireFormat::I64 | WireFormat::F64 => 8,
        }
    }

    pub fn is_signed(self) -> bool {
        !matches!(
            self,
            WireFormat::U8 | WireFormat::U16 | WireFormat::U32 | WireFormat::U64
        )
    }

    pub fn kind(self) -> NumericKind {
        match self {
            WireFormat::F32 | WireFormat::F64 => NumericKind::Float,
            _ => NumericKind::Integer,
        }
    }
}

/// Registry entry for one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub id: u16,
    pub name: String,
    #[serde(default)]
    pub unit: String,
    pub format: WireFormat,
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    parameters: Vec<ParameterDescriptor>,
}

/// Immutable id -> descriptor map, iterated in id order.
///
/// # Examples
/// ```
/// use gdat_core::ParameterRegistry;
///
/// let registry = ParameterRegistry::from_json_str(
///     r#"{"parameters": [{"id": 1, "name": "rpm", "unit": "rpm", "format": "u16"}]}"#,
/// )?;
/// assert_eq!(registry.len(), 1);
/// assert_eq!(registry.get(1).map(|p| p.name.as_str()), Some("rpm"));
/// # Ok::<(), gdat_core::RegistryError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ParameterRegistry {
    parameters: BTreeMap<u16, ParameterDescriptor>,
}

impl ParameterRegistry {
    /// Build a registry, rejecting duplicate ids.
    ///
    /// An empty list is accepted here; the loaders enforce non-emptiness.
    pub fn new(
        parameters: impl IntoIterator<Item = ParameterDescriptor>,
    ) -> Result<Self, RegistryError> {
        let mut map: BTreeMap<u16, ParameterDescriptor> = BTreeMap::new();
        for param in parameters {
            if let Some(existing) = map.get(&param.id) {
                return Err(RegistryError::DuplicateId {
                    id: param.id,
                    first: existing.name.clone(),
                    second: param.name,
                });
            }
            map.insert(param.id, param);
        }
        Ok(Self { parameters: map })
    }

    pub fn from_json_str(json: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = serde_json::from_str(json)?;
        if file.parameters.is_empty() {
            return Err(RegistryError::Empty);
        }
        Self::new(file.parameters)
    }

    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn get(&self, id: u16) -> Option<&ParameterDescriptor> {
        self.parameters.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        self.parameters.values()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}
