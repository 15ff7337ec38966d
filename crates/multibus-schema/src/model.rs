// SPDX-License-Identifier: Apache-2.0

//! Protocol description model (IR)
//!
//! Pure data, no behavior beyond small accessors. Built fresh per compile
//! run by the loader, consumed read-only by the layout resolver and the
//! emitters, and discarded afterwards. All collections are `Vec`s so that
//! iteration order is declaration order and generated output stays
//! deterministic.

use serde::Serialize;
use std::fmt;

/// Wire type of a header or payload field.
///
/// This is a closed set; the loader rejects anything else at parse time.
/// `Str` and `Bytes` are variable-length and only permitted as the last
/// field of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    /// One byte, 0/1 on encode, any nonzero byte decodes as true.
    Bool,
    U8,
    /// Big-endian, unsigned.
    U16,
    /// Big-endian, unsigned.
    U32,
    /// Trailing text, no embedded length prefix.
    Str,
    /// Trailing byte array, length carried out-of-band (`<field>_len` argument).
    Bytes,
    /// One byte backed by a named symbol table.
    Enum,
}

impl TypeTag {
    /// Fixed wire size in bytes; 0 for the variable-length types.
    pub fn wire_size(&self) -> usize {
        match self {
            TypeTag::Bool | TypeTag::U8 | TypeTag::Enum => 1,
            TypeTag::U16 => 2,
            TypeTag::U32 => 4,
            TypeTag::Str | TypeTag::Bytes => 0,
        }
    }

    /// True for the types whose length is only known at encode/decode time.
    pub fn is_variable(&self) -> bool {
        matches!(self, TypeTag::Str | TypeTag::Bytes)
    }

    /// Parse a schema type name. `None` for anything outside the closed set.
    pub fn parse(name: &str) -> Option<TypeTag> {
        match name {
            "bool" => Some(TypeTag::Bool),
            "u8" => Some(TypeTag::U8),
            "u16" => Some(TypeTag::U16),
            "u32" => Some(TypeTag::U32),
            "string" => Some(TypeTag::Str),
            "u8[]" => Some(TypeTag::Bytes),
            "enum" => Some(TypeTag::Enum),
            _ => None,
        }
    }

    /// The name used in schema documents and error messages.
    pub fn schema_name(&self) -> &'static str {
        match self {
            TypeTag::Bool => "bool",
            TypeTag::U8 => "u8",
            TypeTag::U16 => "u16",
            TypeTag::U32 => "u32",
            TypeTag::Str => "string",
            TypeTag::Bytes => "u8[]",
            TypeTag::Enum => "enum",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.schema_name())
    }
}

/// One symbol of an enum table. Values need not be contiguous but must fit
/// in one byte, which is the enum wire representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumSymbol {
    pub name: String,
    pub value: u8,
}

/// A named, ordered symbol table.
///
/// General enums are declared protocol-wide; field-scoped enums carry the
/// qualified name `component_operation_field` to prevent cross-operation
/// symbol collisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumTable {
    pub name: String,
    pub symbols: Vec<EnumSymbol>,
}

impl EnumTable {
    /// Look up a symbol by wire value.
    pub fn symbol_for(&self, value: u8) -> Option<&EnumSymbol> {
        self.symbols.iter().find(|s| s.value == value)
    }

    /// Look up a wire value by symbol name.
    pub fn value_of(&self, symbol: &str) -> Option<u8> {
        self.symbols.iter().find(|s| s.name == symbol).map(|s| s.value)
    }
}

/// One header field in wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderField {
    pub name: String,
    pub tag: TypeTag,
}

/// One payload field in wire order.
///
/// For `TypeTag::Enum`, `enum_name` holds the table name the field refers
/// to: the general enum of the same name when declared as `field: enum`,
/// or the qualified `component_operation_field` table when declared with
/// an inline mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: String,
    pub tag: TypeTag,
    pub enum_name: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, tag: TypeTag) -> Self {
        Field {
            name: name.into(),
            tag,
            enum_name: None,
        }
    }
}

/// Message kind of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Request,
    Response,
    Event,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Request => "request",
            OperationKind::Response => "response",
            OperationKind::Event => "event",
        };
        f.write_str(name)
    }
}

/// One operation of a component. `id` is unique within the owning
/// component; `(component.id, operation.id)` is the joint wire key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Operation {
    pub name: String,
    pub id: u8,
    pub kind: OperationKind,
    pub fields: Vec<Field>,
}

/// A logical sub-protocol multiplexed over the shared byte stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Component {
    pub name: String,
    pub id: u8,
    pub operations: Vec<Operation>,
}

impl Component {
    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.name == name)
    }
}

/// The complete protocol description, root of the IR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtocolDescription {
    pub version: u32,
    /// Fixed preamble of every frame, in wire order.
    pub header: Vec<HeaderField>,
    pub components: Vec<Component>,
    /// Protocol-wide enums, including merged component-scoped fragments.
    pub general_enums: Vec<EnumTable>,
    /// Field-scoped enums under their qualified names.
    pub field_enums: Vec<EnumTable>,
}

impl ProtocolDescription {
    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Resolve an enum table by name, searching general then field-scoped
    /// tables.
    pub fn enum_table(&self, name: &str) -> Option<&EnumTable> {
        self.general_enums
            .iter()
            .chain(self.field_enums.iter())
            .find(|e| e.name == name)
    }
}
