// SPDX-License-Identifier: Apache-2.0

//! YAML schema loading and validation
//!
//! Walks the document as a `serde_yaml::Value` instead of deserializing
//! into fixed structs: mapping order in the document is wire order for
//! header and payload fields and declaration order for everything else,
//! and both must survive into the IR.
//!
//! The loader has no side effects beyond reading the schema source. All
//! referential and uniqueness constraints are checked here so that the
//! resolver and the emitters can assume a consistent description.

use crate::model::{
    Component, EnumSymbol, EnumTable, Field, HeaderField, Operation, OperationKind,
    ProtocolDescription, TypeTag,
};
use crate::{SchemaError, SchemaResult};
use serde_yaml::{Mapping, Value};
use std::path::Path;
use tracing::debug;

/// Load and validate a protocol description from a schema file.
pub fn load_file(path: &Path) -> SchemaResult<ProtocolDescription> {
    let content = std::fs::read_to_string(path)?;
    let proto = parse_str(&content)?;
    debug!(
        schema = %path.display(),
        components = proto.components.len(),
        "loaded protocol description"
    );
    Ok(proto)
}

/// Parse and validate a protocol description from YAML text.
pub fn parse_str(yaml: &str) -> SchemaResult<ProtocolDescription> {
    let doc: Value = serde_yaml::from_str(yaml)?;
    let root = as_mapping(&doc, "document root")?;

    let version = require_u64(root, "version", "document root")? as u32;

    let message = as_mapping(require(root, "message", "document root")?, "'message'")?;

    let header = parse_header(message)?;
    let mut general_enums = parse_general_enums(message)?;
    let mut field_enums: Vec<EnumTable> = Vec::new();

    let components_value = require(message, "components", "'message'")?;
    let components_map = as_mapping(components_value, "'components'")?;

    let mut components: Vec<Component> = Vec::new();
    for (key, value) in components_map {
        let component_name = key_string(key, "'components'")?;
        let component_map = as_mapping(value, &format!("component '{component_name}'"))?;

        let id = require_id(component_map, "id", &format!("component '{component_name}'"))?;
        // Report the later declaration; the earlier one keeps the id.
        if components.iter().any(|c| c.id == id) {
            return Err(SchemaError::DuplicateComponentId {
                component: component_name,
                id,
            });
        }

        merge_component_enums(component_map, &component_name, &mut general_enums)?;

        let operations =
            parse_operations(component_map, &component_name, &general_enums, &mut field_enums)?;

        components.push(Component {
            name: component_name,
            id,
            operations,
        });
    }

    Ok(ProtocolDescription {
        version,
        header,
        components,
        general_enums,
        field_enums,
    })
}

fn parse_header(message: &Mapping) -> SchemaResult<Vec<HeaderField>> {
    let fields_value = require(message, "fields", "'message'")?;
    let fields_map = as_mapping(fields_value, "'message.fields'")?;

    let mut header = Vec::new();
    for (key, value) in fields_map {
        let name = key_string(key, "'message.fields'")?;
        let type_name = scalar_string(value, &format!("header field '{name}'"))?;
        let tag = TypeTag::parse(&type_name).ok_or_else(|| SchemaError::UnknownType {
            field: name.clone(),
            type_name: type_name.clone(),
        })?;
        header.push(HeaderField { name, tag });
    }
    Ok(header)
}

fn parse_general_enums(message: &Mapping) -> SchemaResult<Vec<EnumTable>> {
    let mut enums = Vec::new();
    let Some(enums_value) = message.get("enums") else {
        return Ok(enums);
    };
    if enums_value.is_null() {
        return Ok(enums);
    }
    let enums_map = as_mapping(enums_value, "'message.enums'")?;
    for (key, value) in enums_map {
        let name = key_string(key, "'message.enums'")?;
        let symbols = parse_enum_symbols(value, &name, None)?;
        enums.push(EnumTable { name, symbols });
    }
    Ok(enums)
}

/// Merge a component's enum fragments into the protocol-wide tables.
///
/// A component extends a general enum by declaring extra symbols under the
/// same enum name; the merged symbols are qualified as `component_symbol`
/// while base symbols stay untouched. A fragment for an enum that does not
/// exist yet creates it.
fn merge_component_enums(
    component_map: &Mapping,
    component_name: &str,
    general_enums: &mut Vec<EnumTable>,
) -> SchemaResult<()> {
    let Some(enums_value) = component_map.get("enums") else {
        return Ok(());
    };
    if enums_value.is_null() {
        return Ok(());
    }
    let enums_map = as_mapping(
        enums_value,
        &format!("enums of component '{component_name}'"),
    )?;
    for (key, value) in enums_map {
        let enum_name = key_string(key, &format!("enums of component '{component_name}'"))?;
        let fragment = parse_enum_symbols(value, &enum_name, Some(component_name))?;
        match general_enums.iter_mut().find(|e| e.name == enum_name) {
            Some(table) => table.symbols.extend(fragment),
            None => general_enums.push(EnumTable {
                name: enum_name,
                symbols: fragment,
            }),
        }
    }
    Ok(())
}

fn parse_operations(
    component_map: &Mapping,
    component_name: &str,
    general_enums: &[EnumTable],
    field_enums: &mut Vec<EnumTable>,
) -> SchemaResult<Vec<Operation>> {
    let operations_value = require(
        component_map,
        "operations",
        &format!("component '{component_name}'"),
    )?;
    let operations_map = as_mapping(
        operations_value,
        &format!("operations of component '{component_name}'"),
    )?;

    let mut operations: Vec<Operation> = Vec::new();
    for (key, value) in operations_map {
        let operation_name = key_string(key, &format!("operations of '{component_name}'"))?;
        let operation_map = as_mapping(
            value,
            &format!("operation '{component_name}.{operation_name}'"),
        )?;

        let id = require_id(
            operation_map,
            "id",
            &format!("operation '{component_name}.{operation_name}'"),
        )?;
        if operations.iter().any(|op| op.id == id) {
            return Err(SchemaError::DuplicateOperationId {
                component: component_name.to_string(),
                operation: operation_name,
                id,
            });
        }

        let kind = operation_kind(operation_map, component_name, &operation_name)?;
        let fields = parse_fields(
            operation_map,
            component_name,
            &operation_name,
            general_enums,
            field_enums,
        )?;
        check_variable_fields(&operation_name, &fields)?;

        operations.push(Operation {
            name: operation_name,
            id,
            kind,
            fields,
        });
    }
    Ok(operations)
}

/// Determine the operation kind: an explicit `type:` tag wins, otherwise
/// the naming convention (`*_request`, `*_response`, `*_event`) decides.
fn operation_kind(
    operation_map: &Mapping,
    component_name: &str,
    operation_name: &str,
) -> SchemaResult<OperationKind> {
    if let Some(type_value) = operation_map.get("type") {
        let tag = scalar_string(
            type_value,
            &format!("type of '{component_name}.{operation_name}'"),
        )?;
        return match tag.as_str() {
            "request" => Ok(OperationKind::Request),
            "response" => Ok(OperationKind::Response),
            "event" => Ok(OperationKind::Event),
            other => Err(SchemaError::Malformed {
                element: format!("operation '{component_name}.{operation_name}'"),
                reason: format!("unknown operation type '{other}'"),
            }),
        };
    }
    if operation_name.contains("event") {
        Ok(OperationKind::Event)
    } else if operation_name.contains("response") {
        Ok(OperationKind::Response)
    } else if operation_name.contains("request") {
        Ok(OperationKind::Request)
    } else {
        Err(SchemaError::UnknownOperationKind {
            component: component_name.to_string(),
            operation: operation_name.to_string(),
        })
    }
}

fn parse_fields(
    operation_map: &Mapping,
    component_name: &str,
    operation_name: &str,
    general_enums: &[EnumTable],
    field_enums: &mut Vec<EnumTable>,
) -> SchemaResult<Vec<Field>> {
    let mut fields = Vec::new();
    let Some(fields_value) = operation_map.get("fields") else {
        return Ok(fields);
    };
    // `fields:` with no entries parses as null and means "no payload".
    if fields_value.is_null() {
        return Ok(fields);
    }
    let fields_map = as_mapping(
        fields_value,
        &format!("fields of '{component_name}.{operation_name}'"),
    )?;

    for (key, value) in fields_map {
        let field_name = key_string(
            key,
            &format!("fields of '{component_name}.{operation_name}'"),
        )?;
        let field = match value {
            // Inline mapping: a field-scoped enum, registered under its
            // qualified name to avoid cross-operation symbol collisions.
            Value::Mapping(_) => {
                let qualified = format!("{component_name}_{operation_name}_{field_name}");
                let symbols = parse_enum_symbols(value, &qualified, None)?;
                field_enums.push(EnumTable {
                    name: qualified.clone(),
                    symbols,
                });
                Field {
                    name: field_name,
                    tag: TypeTag::Enum,
                    enum_name: Some(qualified),
                }
            }
            _ => {
                let type_name = scalar_string(
                    value,
                    &format!("field '{field_name}' of '{component_name}.{operation_name}'"),
                )?;
                let tag = TypeTag::parse(&type_name).ok_or_else(|| SchemaError::UnknownType {
                    field: format!("{component_name}.{operation_name}.{field_name}"),
                    type_name: type_name.clone(),
                })?;
                let enum_name = if tag == TypeTag::Enum {
                    // `field: enum` refers to the general enum of the same
                    // name as the field.
                    if general_enums.iter().any(|e| e.name == field_name) {
                        Some(field_name.clone())
                    } else {
                        return Err(SchemaError::UnknownEnum { field: field_name });
                    }
                } else {
                    None
                };
                Field {
                    name: field_name,
                    tag,
                    enum_name,
                }
            }
        };
        fields.push(field);
    }
    Ok(fields)
}

/// At most one variable-length field per operation, and it must be last.
/// This is what bounds offset resolution to a single forward pass.
fn check_variable_fields(operation_name: &str, fields: &[Field]) -> SchemaResult<()> {
    let mut variable: Option<&Field> = None;
    for field in fields {
        if let Some(prev) = variable {
            if field.tag.is_variable() {
                return Err(SchemaError::MultipleVariableFields {
                    operation: operation_name.to_string(),
                    field: field.name.clone(),
                });
            }
            return Err(SchemaError::VariableFieldNotLast {
                operation: operation_name.to_string(),
                field: prev.name.clone(),
            });
        }
        if field.tag.is_variable() {
            variable = Some(field);
        }
    }
    Ok(())
}

fn parse_enum_symbols(
    value: &Value,
    enum_name: &str,
    qualify_with: Option<&str>,
) -> SchemaResult<Vec<EnumSymbol>> {
    let map = as_mapping(value, &format!("enum '{enum_name}'"))?;
    let mut symbols = Vec::new();
    for (key, value) in map {
        let symbol_name = key_string(key, &format!("enum '{enum_name}'"))?;
        let raw = value.as_i64().ok_or_else(|| SchemaError::Malformed {
            element: format!("enum '{enum_name}' symbol '{symbol_name}'"),
            reason: "value is not an integer".to_string(),
        })?;
        if !(0..=255).contains(&raw) {
            return Err(SchemaError::EnumValueOutOfRange {
                enum_name: enum_name.to_string(),
                symbol: symbol_name,
                value: raw,
            });
        }
        let name = match qualify_with {
            Some(prefix) => format!("{prefix}_{symbol_name}"),
            None => symbol_name,
        };
        symbols.push(EnumSymbol {
            name,
            value: raw as u8,
        });
    }
    Ok(symbols)
}

// ── YAML access helpers ──────────────────────────────────────────────────────

fn as_mapping<'a>(value: &'a Value, element: &str) -> SchemaResult<&'a Mapping> {
    value.as_mapping().ok_or_else(|| SchemaError::Malformed {
        element: element.to_string(),
        reason: "expected a mapping".to_string(),
    })
}

fn require<'a>(map: &'a Mapping, key: &'static str, context: &str) -> SchemaResult<&'a Value> {
    map.get(key).ok_or_else(|| SchemaError::MissingKey {
        context: context.to_string(),
        key,
    })
}

fn require_u64(map: &Mapping, key: &'static str, context: &str) -> SchemaResult<u64> {
    let value = require(map, key, context)?;
    value.as_u64().ok_or_else(|| SchemaError::Malformed {
        element: format!("'{key}' in {context}"),
        reason: "expected an unsigned integer".to_string(),
    })
}

fn require_id(map: &Mapping, key: &'static str, context: &str) -> SchemaResult<u8> {
    let raw = require_u64(map, key, context)?;
    u8::try_from(raw).map_err(|_| SchemaError::Malformed {
        element: format!("'{key}' in {context}"),
        reason: format!("id {raw} does not fit in one byte"),
    })
}

fn key_string(key: &Value, context: &str) -> SchemaResult<String> {
    key.as_str()
        .map(str::to_string)
        .ok_or_else(|| SchemaError::Malformed {
            element: context.to_string(),
            reason: "mapping key is not a string".to_string(),
        })
}

fn scalar_string(value: &Value, element: &str) -> SchemaResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| SchemaError::Malformed {
            element: element.to_string(),
            reason: "expected a string".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
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
      enums:
        status:
          slave_not_connected: 3
      operations:
        write_request:
          id: 1
          fields:
            slave_address: u8
            data: u8[]
        write_response:
          id: 2
          fields:
            status: enum
        data_received_event:
          id: 128
          fields:
            data: u8[]
"#;

    #[test]
    fn parses_minimal_schema() {
        let proto = parse_str(MINIMAL).unwrap();
        assert_eq!(proto.version, 1);
        assert_eq!(proto.header.len(), 4);
        assert_eq!(proto.header[3].tag, TypeTag::U16);

        let i2c = proto.component("i2c_master").unwrap();
        assert_eq!(i2c.id, 1);
        assert_eq!(i2c.operations.len(), 3);

        let write = i2c.operation("write_request").unwrap();
        assert_eq!(write.kind, OperationKind::Request);
        assert_eq!(write.fields[0].tag, TypeTag::U8);
        assert_eq!(write.fields[1].tag, TypeTag::Bytes);

        let event = i2c.operation("data_received_event").unwrap();
        assert_eq!(event.kind, OperationKind::Event);
        assert_eq!(event.id, 128);
    }

    #[test]
    fn field_order_is_document_order() {
        let proto = parse_str(MINIMAL).unwrap();
        let names: Vec<&str> = proto.header.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["component", "operation", "channel", "payload_len"]);
    }

    #[test]
    fn component_enum_fragment_is_qualified_and_merged() {
        let proto = parse_str(MINIMAL).unwrap();
        let status = proto.enum_table("status").unwrap();
        assert_eq!(status.value_of("ok"), Some(0));
        assert_eq!(status.value_of("i2c_master_slave_not_connected"), Some(3));
        // base symbols must not be re-qualified
        assert!(status.value_of("i2c_master_ok").is_none());
    }

    #[test]
    fn general_enum_reference_resolves_by_field_name() {
        let proto = parse_str(MINIMAL).unwrap();
        let op = proto
            .component("i2c_master")
            .unwrap()
            .operation("write_response")
            .unwrap();
        assert_eq!(op.fields[0].tag, TypeTag::Enum);
        assert_eq!(op.fields[0].enum_name.as_deref(), Some("status"));
    }

    #[test]
    fn inline_enum_gets_qualified_name() {
        let yaml = r#"
version: 1
message:
  fields:
    component: u8
  components:
    spi_master:
      id: 2
      operations:
        config_request:
          id: 0
          fields:
            bit_order:
              msb_first: 0
              lsb_first: 1
"#;
        let proto = parse_str(yaml).unwrap();
        let table = proto
            .enum_table("spi_master_config_request_bit_order")
            .unwrap();
        assert_eq!(table.value_of("lsb_first"), Some(1));
        let field = &proto.components[0].operations[0].fields[0];
        assert_eq!(
            field.enum_name.as_deref(),
            Some("spi_master_config_request_bit_order")
        );
    }

    #[test]
    fn rejects_duplicate_component_id() {
        let yaml = r#"
version: 1
message:
  fields:
    component: u8
  components:
    bridge:
      id: 0
      operations:
        a_request:
          id: 0
    i2c_master:
      id: 0
      operations:
        b_request:
          id: 0
"#;
        let err = parse_str(yaml).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::DuplicateComponentId { id: 0, .. }
        ));
    }

    #[test]
    fn rejects_duplicate_operation_id() {
        let yaml = r#"
version: 1
message:
  fields:
    component: u8
  components:
    bridge:
      id: 0
      operations:
        a_request:
          id: 3
        b_request:
          id: 3
"#;
        let err = parse_str(yaml).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::DuplicateOperationId { id: 3, .. }
        ));
    }

    #[test]
    fn operation_ids_may_repeat_across_components() {
        let yaml = r#"
version: 1
message:
  fields:
    component: u8
  components:
    bridge:
      id: 0
      operations:
        a_request:
          id: 1
    i2c_master:
      id: 1
      operations:
        b_request:
          id: 1
"#;
        assert!(parse_str(yaml).is_ok());
    }

    #[test]
    fn rejects_variable_field_not_last() {
        let yaml = r#"
version: 1
message:
  fields:
    component: u8
  components:
    bridge:
      id: 0
      operations:
        a_request:
          id: 0
          fields:
            data: u8[]
            trailer: u8
"#;
        let err = parse_str(yaml).unwrap_err();
        assert!(matches!(err, SchemaError::VariableFieldNotLast { .. }));
    }

    #[test]
    fn rejects_multiple_variable_fields() {
        let yaml = r#"
version: 1
message:
  fields:
    component: u8
  components:
    bridge:
      id: 0
      operations:
        a_request:
          id: 0
          fields:
            data: u8[]
            name: string
"#;
        let err = parse_str(yaml).unwrap_err();
        assert!(matches!(err, SchemaError::MultipleVariableFields { .. }));
    }

    #[test]
    fn rejects_enum_value_out_of_range() {
        let yaml = r#"
version: 1
message:
  fields:
    component: u8
  enums:
    status:
      ok: 0
      overflow: 300
  components: {}
"#;
        let err = parse_str(yaml).unwrap_err();
        match err {
            SchemaError::EnumValueOutOfRange { symbol, value, .. } => {
                assert_eq!(symbol, "overflow");
                assert_eq!(value, 300);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_unknown_type_tag() {
        let yaml = r#"
version: 1
message:
  fields:
    component: u8
  components:
    bridge:
      id: 0
      operations:
        a_request:
          id: 0
          fields:
            count: i64
"#;
        let err = parse_str(yaml).unwrap_err();
        match err {
            SchemaError::UnknownType { field, type_name } => {
                assert_eq!(field, "bridge.a_request.count");
                assert_eq!(type_name, "i64");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_enum_reference_without_table() {
        let yaml = r#"
version: 1
message:
  fields:
    component: u8
  components:
    bridge:
      id: 0
      operations:
        a_response:
          id: 0
          fields:
            outcome: enum
"#;
        let err = parse_str(yaml).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownEnum { .. }));
    }

    #[test]
    fn explicit_type_tag_wins_over_name() {
        let yaml = r#"
version: 1
message:
  fields:
    component: u8
  components:
    bridge:
      id: 0
      operations:
        ready_request:
          id: 0
          type: event
"#;
        let proto = parse_str(yaml).unwrap();
        assert_eq!(
            proto.components[0].operations[0].kind,
            OperationKind::Event
        );
    }

    #[test]
    fn rejects_undeterminable_kind() {
        let yaml = r#"
version: 1
message:
  fields:
    component: u8
  components:
    bridge:
      id: 0
      operations:
        ping:
          id: 0
"#;
        let err = parse_str(yaml).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownOperationKind { .. }));
    }

    #[test]
    fn missing_version_is_reported() {
        let err = parse_str("message:\n  fields:\n    component: u8\n  components: {}\n")
            .unwrap_err();
        assert!(matches!(
            err,
            SchemaError::MissingKey {
                key: "version",
                ..
            }
        ));
    }

    #[test]
    fn load_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multibus.yml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let proto = load_file(&path).unwrap();
        assert_eq!(proto.components.len(), 1);
    }
}
