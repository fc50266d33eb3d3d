// WGSL validation with naga, so shader mistakes fail `cargo test` instead of
// the first frame on a real device.

use naga::front::wgsl;
use naga::valid::{Capabilities, ValidationFlags, Validator};

use super::compositor::BirdUniforms;
use super::flock::SimUniforms;

const VELOCITY: &str = include_str!("../shaders/flock_velocity.wgsl");
const POSITION: &str = include_str!("../shaders/flock_position.wgsl");
const BIRD: &str = include_str!("../shaders/bird.wgsl");

fn parse_and_validate(source: &str) -> naga::Module {
    let module = match wgsl::parse_str(source) {
        Ok(module) => module,
        Err(err) => panic!("{}", err.emit_to_string(source)),
    };
    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    if let Err(err) = validator.validate(&module) {
        panic!("validation failed: {err:?}");
    }
    module
}

/// Byte size naga computes for the named struct.
fn struct_span(module: &naga::Module, name: &str) -> u32 {
    module
        .types
        .iter()
        .find_map(|(_, ty)| match (&ty.name, &ty.inner) {
            (Some(n), naga::TypeInner::Struct { span, .. }) if n == name => Some(*span),
            _ => None,
        })
        .unwrap_or_else(|| panic!("struct {name} not found"))
}

#[test]
fn compute_passes_validate() {
    for source in [VELOCITY, POSITION] {
        let module = parse_and_validate(source);
        let entry = &module.entry_points[0];
        assert_eq!(entry.name, "main");
        assert_eq!(entry.stage, naga::ShaderStage::Compute);
        assert_eq!(entry.workgroup_size, [8, 8, 1]);
    }
}

#[test]
fn bird_shader_validates() {
    let module = parse_and_validate(BIRD);
    let names: Vec<_> = module.entry_points.iter().map(|e| e.name.as_str()).collect();
    assert!(names.contains(&"vs_main"));
    assert!(names.contains(&"fs_main"));
}

#[test]
fn uniform_layouts_match_rust_structs() {
    for source in [VELOCITY, POSITION] {
        let module = parse_and_validate(source);
        assert_eq!(struct_span(&module, "SimParams") as usize, std::mem::size_of::<SimUniforms>());
    }
    let module = parse_and_validate(BIRD);
    assert_eq!(struct_span(&module, "BirdUniforms") as usize, std::mem::size_of::<BirdUniforms>());
}
