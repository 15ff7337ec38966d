// SPDX-License-Identifier: Apache-2.0

//! Layout resolution
//!
//! Single left-to-right scan per field list, maintaining a running offset.
//! Each fixed-size field consumes `wire_size()` bytes; the (at most one)
//! variable-length field is recorded with the running offset and size 0,
//! its true length being a runtime matter. Payload length for a concrete
//! frame is `fixed_size + runtime_length(variable tail)`.

use crate::LayoutError;
use multibus_schema::{EnumSymbol, OperationKind, ProtocolDescription, TypeTag};
use tracing::debug;

/// Resolved position of one field inside its enclosing structure (header
/// or payload). `size == 0` marks the variable-length tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSlot {
    pub name: String,
    pub tag: TypeTag,
    pub offset: usize,
    pub size: usize,
    /// Qualified enum table name for `TypeTag::Enum` slots.
    pub enum_name: Option<String>,
    /// Symbol table for `TypeTag::Enum` slots, empty otherwise. Carried
    /// here so that emitters and the wire codec never re-resolve it.
    pub symbols: Vec<EnumSymbol>,
}

impl FieldSlot {
    pub fn is_variable(&self) -> bool {
        self.size == 0 && self.tag.is_variable()
    }
}

/// Resolved payload layout of one operation, keyed by the joint wire key
/// `(component_id, operation_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationLayout {
    pub component: String,
    pub operation: String,
    pub component_id: u8,
    pub operation_id: u8,
    pub kind: OperationKind,
    pub slots: Vec<FieldSlot>,
    /// Payload bytes consumed by all fixed-size fields.
    pub fixed_size: usize,
}

impl OperationLayout {
    /// The single variable-length tail slot, if the operation has one.
    pub fn variable_tail(&self) -> Option<&FieldSlot> {
        self.slots.last().filter(|slot| slot.is_variable())
    }

    /// Payload length of a concrete frame carrying `variable_len` tail
    /// bytes (0 when the operation has no variable tail).
    pub fn payload_len(&self, variable_len: usize) -> usize {
        self.fixed_size + variable_len
    }
}

/// The immutable, language-neutral layout table shared by every backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLayout {
    /// Derived header size: sum of all header field sizes.
    pub header_size: usize,
    pub header: Vec<FieldSlot>,
    pub operations: Vec<OperationLayout>,
}

impl ResolvedLayout {
    pub fn operation(&self, component: &str, operation: &str) -> Option<&OperationLayout> {
        self.operations
            .iter()
            .find(|op| op.component == component && op.operation == operation)
    }

    pub fn operation_by_ids(&self, component_id: u8, operation_id: u8) -> Option<&OperationLayout> {
        self.operations
            .iter()
            .find(|op| op.component_id == component_id && op.operation_id == operation_id)
    }

    /// True exactly when `opcode` names an event operation of the
    /// component. Mirrors the generated `mb_<component>_is_event`.
    pub fn is_event(&self, component_id: u8, opcode: u8) -> bool {
        self.operation_by_ids(component_id, opcode)
            .is_some_and(|op| op.kind == OperationKind::Event)
    }

    /// Layouts of one component's operations, in declaration order.
    pub fn operations_of<'a>(
        &'a self,
        component: &'a str,
    ) -> impl Iterator<Item = &'a OperationLayout> {
        self.operations
            .iter()
            .filter(move |op| op.component == component)
    }
}

/// Resolve byte offsets and sizes for the whole protocol description.
///
/// Runs exactly once per compile; emitters consume the result verbatim.
pub fn resolve(proto: &ProtocolDescription) -> Result<ResolvedLayout, LayoutError> {
    let mut header = Vec::with_capacity(proto.header.len());
    let mut offset = 0usize;
    for field in &proto.header {
        if field.tag.is_variable() {
            return Err(LayoutError::UnsupportedType {
                field: field.name.clone(),
                type_name: field.tag.schema_name().to_string(),
            });
        }
        let size = field.tag.wire_size();
        let (enum_name, symbols) = if field.tag == TypeTag::Enum {
            // A header enum refers to the general enum of the same name.
            let symbols = proto
                .enum_table(&field.name)
                .map(|table| table.symbols.clone())
                .unwrap_or_default();
            (Some(field.name.clone()), symbols)
        } else {
            (None, Vec::new())
        };
        header.push(FieldSlot {
            name: field.name.clone(),
            tag: field.tag,
            offset,
            size,
            enum_name,
            symbols,
        });
        offset += size;
    }
    let header_size = offset;

    let mut operations = Vec::new();
    for component in &proto.components {
        for operation in &component.operations {
            let mut slots = Vec::with_capacity(operation.fields.len());
            let mut offset = 0usize;
            for field in &operation.fields {
                let size = field.tag.wire_size();
                let symbols = field
                    .enum_name
                    .as_deref()
                    // The loader guarantees the referenced table exists.
                    .and_then(|name| proto.enum_table(name))
                    .map(|table| table.symbols.clone())
                    .unwrap_or_default();
                slots.push(FieldSlot {
                    name: field.name.clone(),
                    tag: field.tag,
                    offset,
                    size,
                    enum_name: field.enum_name.clone(),
                    symbols,
                });
                offset += size;
            }
            operations.push(OperationLayout {
                component: component.name.clone(),
                operation: operation.name.clone(),
                component_id: component.id,
                operation_id: operation.id,
                kind: operation.kind,
                slots,
                fixed_size: offset,
            });
        }
    }

    debug!(
        header_size,
        operations = operations.len(),
        "resolved protocol layout"
    );

    Ok(ResolvedLayout {
        header_size,
        header,
        operations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use multibus_schema::parse_str;

    const SCHEMA: &str = r#"
version: 1
message:
  fields:
    component: u8
    operation: u8
    channel: u8
    payload_len: u16
  enums:
    status:
      ok: 0
      unknown_error: 1
  components:
    i2c_master:
      id: 1
      operations:
        write_request:
          id: 1
          fields:
            slave_address: u8
            data: u8[]
        read_response:
          id: 4
          fields:
            status: enum
            slave_address: u16
            num_bytes: u16
            data: u8[]
"#;

    fn layout() -> ResolvedLayout {
        resolve(&parse_str(SCHEMA).unwrap()).unwrap()
    }

    #[test]
    fn canonical_header_is_five_bytes() {
        let layout = layout();
        assert_eq!(layout.header_size, 5);
        let offsets: Vec<usize> = layout.header.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, [0, 1, 2, 3]);
        assert_eq!(layout.header[3].size, 2);
    }

    #[test]
    fn fixed_fields_accumulate_offsets() {
        let layout = layout();
        let op = layout.operation("i2c_master", "read_response").unwrap();
        let offsets: Vec<usize> = op.slots.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, [0, 1, 3, 5]);
        assert_eq!(op.fixed_size, 5);
    }

    #[test]
    fn variable_tail_has_size_zero() {
        let layout = layout();
        let op = layout.operation("i2c_master", "write_request").unwrap();
        let tail = op.variable_tail().unwrap();
        assert_eq!(tail.name, "data");
        assert_eq!(tail.offset, 1);
        assert_eq!(tail.size, 0);
        assert_eq!(op.fixed_size, 1);
        assert_eq!(op.payload_len(2), 3);
    }

    #[test]
    fn enum_slot_carries_symbols() {
        let layout = layout();
        let op = layout.operation("i2c_master", "read_response").unwrap();
        let status = &op.slots[0];
        assert_eq!(status.enum_name.as_deref(), Some("status"));
        assert_eq!(status.symbols.len(), 2);
        assert_eq!(status.size, 1);
    }

    #[test]
    fn lookup_by_ids_matches_lookup_by_name() {
        let layout = layout();
        let by_ids = layout.operation_by_ids(1, 4).unwrap();
        assert_eq!(by_ids.operation, "read_response");
    }

    #[test]
    fn variable_header_field_is_unsupported() {
        let yaml = r#"
version: 1
message:
  fields:
    component: u8
    name: string
  components: {}
"#;
        let err = resolve(&parse_str(yaml).unwrap()).unwrap_err();
        match err {
            LayoutError::UnsupportedType { field, type_name } => {
                assert_eq!(field, "name");
                assert_eq!(type_name, "string");
            }
        }
    }

    #[test]
    fn resolution_is_deterministic() {
        assert_eq!(layout(), layout());
    }
}
