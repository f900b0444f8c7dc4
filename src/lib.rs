//! # dnp3-objgen: DNP3 object code generator
//!
//! Turns a declarative description of DNP3 objects (group/variation pairs with typed fields,
//! bit-packed subfields and length-prefixed variable data) into consistent C artifacts for a
//! DNP3 application-layer engine: storage structs, decoders, release routines, a scripting
//! binding and a JSON serializer. The same model drives a Rust decoder that runs the decode
//! algorithm directly, so schemas can be exercised against real payloads.
//!
//! ## Pipeline
//!
//! raw schema → [`loader`] → [`Schema`] (+ [`LayoutPlan`]) → [`emit`] → [`integrate`]
//!
//! ## Field types
//!
//! - Integers: `uint8`, `uint16`, `uint24`, `uint32`, `uint64`, `int8`, `int16`, `int24`, `int32`, `int64`
//! - `flt32`, `flt64` (bit pattern preserved), `dnp3time` (48 bits on the wire)
//! - `vstr4` (fixed 4-byte text), `chararray` (text, `size` + `len_field`)
//! - `bytearray` (owned bytes, `len_field`), with `len_from_prefix` for prefix-derived lengths
//! - `bstr8` (one octet split into subfields of width 1, 2, 4 or 7)
//!
//! ## Example schema
//!
//! ```text
//! objects:
//!   - group: 1
//!     variation: 1
//!     packed: true
//!     fields:
//!       - type: uint8
//!         name: state
//!         width: 1
//!   - group: 30
//!     variation: 5
//!     fields:
//!       - type: bstr8
//!         fields:
//!           - name: online
//!             width: 1
//!           - name: reserved
//!             width: 7
//!       - type: flt32
//!         name: value
//! ```

pub mod codec;
pub mod emit;
pub mod generate;
pub mod integrate;
pub mod layout;
pub mod loader;
pub mod schema;
pub mod serialize;
pub mod value;

pub use codec::{Decoder, DecodeError, Point, PointData, PointList, Signal};
pub use emit::{emit_all, Artifacts, EmitError};
pub use generate::{generate_from_str, run, GenConfig, GenError, GenerationReport, Mode};
pub use layout::{LayoutPlan, ObjectPlan};
pub use loader::{load, load_str, SchemaError};
pub use schema::{FieldKind, ObjectDefinition, ObjectKey, Schema};
pub use value::Value;
