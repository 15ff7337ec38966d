// SPDX-License-Identifier: Apache-2.0

//! # MultiBus Schema
//!
//! In-memory model of a MultiBus protocol description plus the YAML loader
//! that builds and validates it.
//!
//! The MultiBus protocol multiplexes independent components (bridge, I2C
//! master, SPI master, ...) over one byte stream. Each frame is a fixed
//! header followed by a variable-length payload whose internal layout is
//! defined by the declared fields of the addressed operation. This crate
//! only describes that protocol; byte offsets are computed by
//! `multibus-layout` and source code is rendered by `multibus-codegen`.
//!
//! ## Usage
//!
//! ```rust
//! use multibus_schema::parse_str;
//!
//! let yaml = r#"
//! version: 1
//! message:
//!   fields:
//!     component: u8
//!     operation: u8
//!     channel: u8
//!     payload_len: u16
//!   enums: {}
//!   components:
//!     bridge:
//!       id: 0
//!       operations:
//!         delay_request:
//!           id: 0
//!           fields:
//!             timeout_ms: u32
//! "#;
//!
//! let proto = parse_str(yaml).unwrap();
//! assert_eq!(proto.version, 1);
//! assert_eq!(proto.components[0].name, "bridge");
//! ```

pub mod loader;
pub mod model;

pub use loader::{load_file, parse_str};
pub use model::{
    Component, EnumSymbol, EnumTable, Field, HeaderField, Operation, OperationKind,
    ProtocolDescription, TypeTag,
};

/// Schema loading and validation errors.
///
/// All of these are fatal: generation aborts before any emitter runs and no
/// artifact is written.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("failed to read schema file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML syntax: {0}")]
    Yaml(String),

    #[error("missing required key '{key}' in {context}")]
    MissingKey { context: String, key: &'static str },

    #[error("malformed schema element {element}: {reason}")]
    Malformed { element: String, reason: String },

    #[error("field '{field}' declares unknown type '{type_name}'")]
    UnknownType { field: String, type_name: String },

    #[error("field '{field}' declares type 'enum' but no general enum '{field}' exists")]
    UnknownEnum { field: String },

    #[error("duplicate component id {id} (component '{component}')")]
    DuplicateComponentId { component: String, id: u8 },

    #[error("duplicate operation id {id} in component '{component}' (operation '{operation}')")]
    DuplicateOperationId {
        component: String,
        operation: String,
        id: u8,
    },

    #[error("variable-length field '{field}' of operation '{operation}' is not the last field")]
    VariableFieldNotLast { operation: String, field: String },

    #[error("operation '{operation}' declares more than one variable-length field ('{field}')")]
    MultipleVariableFields { operation: String, field: String },

    #[error("enum '{enum_name}' value {value} for symbol '{symbol}' does not fit in one byte (0-255)")]
    EnumValueOutOfRange {
        enum_name: String,
        symbol: String,
        value: i64,
    },

    #[error("cannot determine kind of operation '{operation}' in component '{component}': name matches no convention and no 'type' tag given")]
    UnknownOperationKind {
        component: String,
        operation: String,
    },
}

impl From<serde_yaml::Error> for SchemaError {
    fn from(err: serde_yaml::Error) -> Self {
        SchemaError::Yaml(err.to_string())
    }
}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;
