//! Emitted C text: dispatch coverage, release routine cases, struct layout, serializer shapes.

use dnp3_objgen::emit::{self, decoder, free, EmitError};
use dnp3_objgen::layout::LayoutPlan;
use dnp3_objgen::loader::load_str;
use dnp3_objgen::schema::{ObjectKey, Schema};

const OBJECTS: &str = r#"
objects:
  - group: 1
    variation: 1
    packed: true
    fields:
      - type: uint8
        name: state
        width: 1
  - group: 12
    variation: 1
    fields:
      - type: bstr8
        fields:
          - name: op_type
            width: 4
          - name: qu
            width: 1
          - name: cr
            width: 1
          - name: tcc
            width: 2
      - type: uint8
        name: count
      - type: uint32
        name: ontime
      - type: uint32
        name: offtime
      - type: bstr8
        fields:
          - name: status_code
            width: 7
          - name: reserved
            width: 1
  - group: 60
    variation: 1
    unimplemented: class data carries no points
  - group: 70
    variation: 4
    fields:
      - type: uint32
        name: file_handle
      - type: chararray
        name: optional_text
        size: 255
        len_from_prefix: true
        len_field: optional_text_len
    extra_fields:
      - type: uint8
        name: optional_text_len
  - group: 83
    variation: 1
    fields:
      - type: vstr4
        name: vendor_code
      - type: uint16
        name: length
      - type: bytearray
        name: data_objects
        len_field: length
  - group: 110
    variation: 3
    fields:
      - type: int24
        name: value
  - group: 120
    variation: 1
    constraints:
      require_size_prefix: true
    fields:
      - type: uint32
        name: csq
      - type: bytearray
        name: challenge_data
        len_from_prefix: true
        len_field: challenge_data_len
    extra_fields:
      - type: uint16
        name: challenge_data_len
"#;

fn schema() -> Schema {
    load_str(OBJECTS).expect("schema")
}

fn artifacts(schema: &Schema) -> emit::Artifacts {
    emit::emit_all(schema, &LayoutPlan::new(schema)).expect("emit")
}

#[test]
fn test_dispatch_has_one_case_per_object() {
    let schema = schema();
    let dispatch = decoder::emit_dispatch(&schema).expect("dispatch");
    assert_eq!(dispatch.matches("case DNP3_OBJECT_CODE(").count(), schema.len());
    for object in schema.objects() {
        let label = format!(
            "case DNP3_OBJECT_CODE({}, {}):",
            object.key.group, object.key.variation
        );
        assert_eq!(dispatch.matches(&label).count(), 1, "{}", label);
    }
    assert!(dispatch.contains("return DNP3_DECODER_EVENT_UNKNOWN_OBJECT;"));
    assert!(dispatch.contains("return rc ? 0 : DNP3_DECODER_EVENT_MALFORMED;"));
}

#[test]
fn test_one_routine_per_object() {
    let schema = schema();
    let out = artifacts(&schema);
    for object in schema.objects() {
        let def = format!("static int {}(", decoder::routine_name(object.key));
        assert_eq!(out.objects_source.matches(&def).count(), 1, "{}", def);
    }
}

#[test]
fn test_unimplemented_objects_absent() {
    let schema = schema();
    let out = artifacts(&schema);
    for text in [&out.structs, &out.objects_source, &out.lua, &out.json] {
        assert!(!text.contains("G60V1"));
        assert!(!text.contains("DNP3_OBJECT_CODE(60, 1)"));
    }
}

#[test]
fn test_free_cases_only_for_owned_buffers() {
    let schema = schema();
    let plan = LayoutPlan::new(&schema);
    let out = free::emit(&schema, &plan).expect("free");
    assert_eq!(out.matches("case DNP3_OBJECT_CODE(").count(), 2);
    assert!(out.contains("case DNP3_OBJECT_CODE(83, 1): {"));
    assert!(out.contains("case DNP3_OBJECT_CODE(120, 1): {"));
    assert!(out.contains("SCFree(object->data_objects);"));
    assert!(out.contains("SCFree(object->challenge_data);"));
    assert!(!out.contains("DNP3_OBJECT_CODE(12, 1)"));
    assert!(out.trim_end().ends_with("SCFree(point);\n}"));
}

#[test]
fn test_struct_layout() {
    let schema = schema();
    let structs = artifacts(&schema).structs;
    let g12 = section(&structs, "typedef struct DNP3ObjectG12V1_ {", "} DNP3ObjectG12V1;");
    let expected = [
        "uint8_t op_type:4;",
        "uint8_t qu:1;",
        "uint8_t cr:1;",
        "uint8_t tcc:2;",
        "uint8_t count;",
        "uint32_t ontime;",
        "uint32_t offtime;",
        "uint8_t status_code:7;",
        "uint8_t reserved:1;",
    ];
    let lines: Vec<&str> = g12.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    assert_eq!(lines, expected);

    assert!(structs.contains("    char vendor_code[5];"));
    assert!(structs.contains("    uint8_t *data_objects;"));
    assert!(structs.contains("    char optional_text[255];"));
    assert!(structs.contains("    int32_t value;"));
    // Extra fields follow the wire fields.
    let g70 = section(&structs, "typedef struct DNP3ObjectG70V4_ {", "} DNP3ObjectG70V4;");
    let text = g70.find("optional_text[255]").expect("text field");
    let len = g70.find("uint8_t optional_text_len;").expect("extra field");
    assert!(text < len);
}

#[test]
fn test_extra_field_type_restricted() {
    let src = r#"
objects:
  - group: 70
    variation: 5
    fields:
      - type: uint32
        name: file_handle
    extra_fields:
      - type: int16
        name: spare
"#;
    let schema = load_str(src).expect("loader accepts scalar extra fields");
    match emit::emit_all(&schema, &LayoutPlan::new(&schema)) {
        Err(EmitError::UnsupportedExtraType { object, field, ty }) => {
            assert_eq!(object, ObjectKey::new(70, 5));
            assert_eq!(field, "spare");
            assert_eq!(ty, "int16");
        }
        other => panic!("expected UnsupportedExtraType, got {:?}", other),
    }
}

#[test]
fn test_packed_routine() {
    let schema = schema();
    let src = artifacts(&schema).objects_source;
    let routine = section(
        &src,
        "static int DNP3DecodeObjectG1V1(",
        "static int DNP3DecodeObjectG12V1(",
    );
    assert!(routine.contains("while (count) {"));
    assert!(routine.contains("for (int j = 0; j < 8 && count; j = j + 1) {"));
    assert!(routine.contains("object->state = (octet >> j) & 0x1;"));
    assert_eq!(routine.matches("DNP3ReadPrefix(").count(), 1);
}

#[test]
fn test_record_routine_reads() {
    let schema = schema();
    let src = artifacts(&schema).objects_source;
    let g12 = section(
        &src,
        "static int DNP3DecodeObjectG12V1(",
        "static int DNP3DecodeObjectG70V4(",
    );
    assert!(g12.contains("object->op_type = (octet >> 0) & 0xf;"));
    assert!(g12.contains("object->tcc = (octet >> 6) & 0x3;"));
    assert!(g12.contains("object->reserved = (octet >> 7) & 0x1;"));
    assert!(g12.contains("DNP3ReadUint32(buf, len, &object->ontime)"));
    assert!(!g12.contains("offset"));

    let g110 = section(
        &src,
        "static int DNP3DecodeObjectG110V3(",
        "static int DNP3DecodeObjectG120V1(",
    );
    assert!(g110.contains("DNP3ReadUint24(buf, len, &raw)"));
    assert!(g110.contains("object->value = (int32_t)(raw << 8) >> 8;"));
}

#[test]
fn test_prefix_length_and_constraints() {
    let schema = schema();
    let src = artifacts(&schema).objects_source;
    let g120 = section(&src, "static int DNP3DecodeObjectG120V1(", "void DNP3FreeObjectPoint(");
    assert!(g120.contains("if (!DNP3PrefixIsSize(prefix_code)) {"));
    assert!(g120.contains("offset = *len;"));
    assert!(g120.contains("if (consumed > prefix || prefix - consumed > UINT16_MAX) {"));
    assert!(g120.contains("object->challenge_data_len = prefix - consumed;"));
    assert!(g120.contains("object->challenge_data = SCCalloc(1, object->challenge_data_len);"));
    // The error path frees the owned buffer before the object.
    let error = section(g120, "error:", "return 0;");
    let buffer = error.find("SCFree(object->challenge_data);").expect("buffer freed");
    let object = error.find("SCFree(object);").expect("object freed");
    assert!(buffer < object);

    let g70 = section(
        &src,
        "static int DNP3DecodeObjectG70V4(",
        "static int DNP3DecodeObjectG83V1(",
    );
    assert!(g70.contains("prefix - consumed > UINT8_MAX"));
    assert!(g70.contains("if (object->optional_text_len >= sizeof(object->optional_text)) {"));
    assert!(g70.contains("object->optional_text[object->optional_text_len] = '\\0';"));
}

#[test]
fn test_lua_binding() {
    let schema = schema();
    let lua = artifacts(&schema).lua;
    assert!(lua.starts_with(emit::LICENSE_HEADER));
    assert!(lua[emit::LICENSE_HEADER.len()..].starts_with("\n/**\n * DO NOT EDIT."));
    assert!(lua.contains("#ifdef HAVE_LUA"));
    assert!(lua.trim_end().ends_with("#endif /* HAVE_LUA */"));
    assert!(lua.contains("lua_pushliteral(luastate, \"op_type\");"));
    assert!(lua.contains("lua_pushinteger(luastate, data->op_type);"));
    assert!(lua.contains("LuaPushStringBuffer(luastate, (uint8_t *)data->vendor_code, 4);"));
    assert!(lua.contains("lua_pushlstring(luastate, (const char *)data->data_objects,"));
    assert!(!lua.contains("\"optional_text_len\""));
}

#[test]
fn test_json_serializer() {
    let schema = schema();
    let json = artifacts(&schema).json;
    assert!(json.starts_with("/* Copyright (C) 2015 Open Information Security Foundation\n"));
    assert!(json.contains(" * DO NOT EDIT. THIS FILE IS AUTO-GENERATED.\n"));
    assert!(json.contains("void OutputJsonDNP3SetItem(json_t *js, DNP3Object *object,"));
    assert!(json.contains("json_object_set_new(js, \"qu\","));
    assert!(json.contains(
        "unsigned long data_objects_b64_len = ((data->length + 2) / 3) * 4 + 1;"
    ));
    assert!(json.contains("Base64Encode(data->data_objects, data->length,"));
    assert!(json.contains("json_object_set_new(js, \"vendor_code\", json_string(data->vendor_code));"));
    assert!(json.contains("char tmpbuf[data->optional_text_len + 1];"));
    assert!(json.contains("SCLogDebug(\"Unknown object: %d:%d\", object->group,"));
    assert!(!json.contains("\"data->"));
}

#[test]
fn test_emission_is_deterministic() {
    let schema = schema();
    assert_eq!(artifacts(&schema), artifacts(&schema));
}

#[test]
fn test_bundled_schema_emits() {
    let schema = load_str(include_str!("../schema/dnp3-objects.yaml")).expect("bundled");
    let out = artifacts(&schema);
    let dispatch = section(&out.objects_source, "int DNP3DecodeObject(int group", "\n}\n");
    assert_eq!(dispatch.matches("case DNP3_OBJECT_CODE(").count(), schema.len());
    for u in schema.unimplemented() {
        let label = format!("DNP3_OBJECT_CODE({}, {})", u.key.group, u.key.variation);
        assert!(!out.objects_source.contains(&label), "{}", label);
    }
}

/// Text from `start` up to (not including) `end`.
fn section<'a>(text: &'a str, start: &str, end: &str) -> &'a str {
    let from = text.find(start).unwrap_or_else(|| panic!("missing {:?}", start));
    let rest = &text[from + start.len()..];
    let to = rest.find(end).unwrap_or_else(|| panic!("missing {:?}", end));
    &rest[..to]
}
