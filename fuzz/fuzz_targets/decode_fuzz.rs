//! Decode fuzz target: arbitrary payloads against every object of the bundled schema.
//! Decoding must not panic; it returns a signal for any input.
//! Build with: cargo fuzz run decode_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
static SCHEMA: std::sync::OnceLock<dnp3_objgen::Schema> = std::sync::OnceLock::new();

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }
    let schema = SCHEMA.get_or_init(|| {
        dnp3_objgen::load_str(include_str!("../../schema/dnp3-objects.yaml"))
            .expect("bundled schema")
    });
    let objects = schema.objects();
    let object = &objects[data[0] as usize % objects.len()];
    let prefix_code = data[1] & 0x07;
    // Bounded so a tiny payload cannot ask for billions of packed points.
    let count = u32::from(u16::from_le_bytes([data[2], data[3]]) % 1024);
    let decoder = dnp3_objgen::Decoder::new(schema);
    let mut buf = &data[4..];
    let mut points = Vec::new();
    let _ = decoder.decode_object(
        object.key.group,
        object.key.variation,
        &mut buf,
        prefix_code,
        0,
        count,
        &mut points,
    );
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run decode_fuzz");
}
