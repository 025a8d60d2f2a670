//! Front-end validation shared by every backend's program compiler.

use anyhow::{anyhow, Result};
use wgpu::naga;

use super::backend::{ShaderModel, ShaderStage};
use super::constants::PerObjectConstants;

/// Entry point every program must export for its stage.
pub const ENTRY_POINT: &str = "main";

/// Highest vertex input location the vertex buffer layout feeds.
const MAX_VERTEX_LOCATION: u32 = 2;

/// Parses and validates WGSL, then checks for a `main` entry point of `stage` and that
/// the program fits the fixed binding layout.
///
/// Errors carry the compiler's own diagnostics, rendered against `source`.
pub fn validate(
    stage: ShaderStage,
    label: &str,
    source: &str,
    model: ShaderModel,
) -> Result<naga::Module> {
    let profile = model.profile(stage);

    let module = naga::front::wgsl::parse_str(source).map_err(|e| {
        anyhow!("failed to compile `{label}` ({profile}):\n{}", e.emit_to_string(source))
    })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator.validate(&module).map_err(|e| {
        anyhow!("failed to validate `{label}` ({profile}):\n{}", e.emit_to_string(source))
    })?;

    let wanted = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Pixel => naga::ShaderStage::Fragment,
    };
    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == wanted && ep.name == ENTRY_POINT)
        .ok_or_else(|| {
            anyhow!("`{label}` has no `{ENTRY_POINT}` entry point for the {stage:?} stage")
        })?;

    check_bindings(&module, label)?;
    if stage == ShaderStage::Vertex {
        check_vertex_inputs(&module, entry, label)?;
    }

    Ok(module)
}

/// Resources must sit where the shared pipeline layout puts them:
/// `@group(0) @binding(0)` per-object uniforms, `@group(1)` texture at 0 and sampler at 1.
fn check_bindings(module: &naga::Module, label: &str) -> Result<()> {
    for (_, global) in module.global_variables.iter() {
        let Some(binding) = global.binding.as_ref() else { continue };
        let inner = &module.types[global.ty].inner;
        let name = global.name.as_deref().unwrap_or("<unnamed>");

        let fits = match (binding.group, binding.binding) {
            (0, 0) => {
                let size = inner.size(module.to_ctx()) as usize;
                anyhow::ensure!(
                    size <= PerObjectConstants::SIZE,
                    "`{label}`: uniform `{name}` is {size} bytes, the per-object block holds {}",
                    PerObjectConstants::SIZE
                );
                matches!(global.space, naga::AddressSpace::Uniform)
            }
            (1, 0) => matches!(
                inner,
                naga::TypeInner::Image {
                    dim: naga::ImageDimension::D2,
                    arrayed: false,
                    class: naga::ImageClass::Sampled { multi: false, .. },
                }
            ),
            (1, 1) => matches!(inner, naga::TypeInner::Sampler { comparison: false }),
            _ => false,
        };
        anyhow::ensure!(
            fits,
            "`{label}`: `{name}` at @group({}) @binding({}) does not match the pipeline layout \
             (0/0 uniform block, 1/0 texture_2d, 1/1 sampler)",
            binding.group,
            binding.binding
        );
    }
    Ok(())
}

/// Vertex inputs may only read the locations the vertex buffer provides.
fn check_vertex_inputs(module: &naga::Module, entry: &naga::EntryPoint, label: &str) -> Result<()> {
    let mut locations = Vec::new();
    for arg in &entry.function.arguments {
        match arg.binding.as_ref() {
            Some(binding) => locations.extend(location_of(binding)),
            None => {
                if let naga::TypeInner::Struct { members, .. } = &module.types[arg.ty].inner {
                    locations.extend(members.iter().filter_map(|m| m.binding.as_ref().and_then(location_of)));
                }
            }
        }
    }

    if let Some(bad) = locations.into_iter().find(|&l| l > MAX_VERTEX_LOCATION) {
        anyhow::bail!(
            "`{label}`: vertex input @location({bad}) is not provided, \
             only 0 (position), 1 (color) and 2 (tex_coord) are"
        );
    }
    Ok(())
}

fn location_of(binding: &naga::Binding) -> Option<u32> {
    match binding {
        naga::Binding::Location { location, .. } => Some(*location),
        naga::Binding::BuiltIn(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIXEL: &str = r#"
@fragment
fn main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 0.0, 0.0, 1.0);
}
"#;

    #[test]
    fn accepts_valid_pixel_program() {
        assert!(validate(ShaderStage::Pixel, "red.wgsl", PIXEL, ShaderModel::Sm5).is_ok());
    }

    #[test]
    fn wrong_stage_is_rejected() {
        let err = validate(ShaderStage::Vertex, "red.wgsl", PIXEL, ShaderModel::Sm5).unwrap_err();
        assert!(err.to_string().contains("no `main` entry point"));
    }

    #[test]
    fn parse_error_includes_diagnostics() {
        let err = validate(ShaderStage::Pixel, "broken.wgsl", "fn main( {", ShaderModel::Sm4)
            .unwrap_err()
            .to_string();
        assert!(err.contains("broken.wgsl"));
        assert!(err.contains("ps_4_0"));
    }

    // ── layout ────────────────────────────────────────────────────────────

    #[test]
    fn binding_outside_layout_is_rejected() {
        let src = r#"
@group(2) @binding(0) var<uniform> extra: vec4<f32>;

@fragment
fn main() -> @location(0) vec4<f32> {
    return extra;
}
"#;
        let err = validate(ShaderStage::Pixel, "extra.wgsl", src, ShaderModel::Sm5)
            .unwrap_err()
            .to_string();
        assert!(err.contains("@group(2) @binding(0)"), "{err}");
    }

    #[test]
    fn texture_in_sampler_slot_is_rejected() {
        let src = r#"
@group(1) @binding(1) var tex: texture_2d<f32>;

@fragment
fn main() -> @location(0) vec4<f32> {
    return textureLoad(tex, vec2<i32>(0, 0), 0);
}
"#;
        assert!(validate(ShaderStage::Pixel, "swapped.wgsl", src, ShaderModel::Sm5).is_err());
    }

    #[test]
    fn oversized_uniform_block_is_rejected() {
        let src = r#"
struct Big { data: array<vec4<f32>, 32> };
@group(0) @binding(0) var<uniform> big: Big;

@fragment
fn main() -> @location(0) vec4<f32> {
    return big.data[0];
}
"#;
        let err = validate(ShaderStage::Pixel, "big.wgsl", src, ShaderModel::Sm5)
            .unwrap_err()
            .to_string();
        assert!(err.contains("512 bytes"), "{err}");
    }

    #[test]
    fn vertex_input_beyond_buffer_layout_is_rejected() {
        let src = r#"
struct In {
    @location(0) position: vec2<f32>,
    @location(5) normal: vec3<f32>,
};

@vertex
fn main(v: In) -> @builtin(position) vec4<f32> {
    return vec4<f32>(v.position, v.normal.z, 1.0);
}
"#;
        let err = validate(ShaderStage::Vertex, "normal.wgsl", src, ShaderModel::Sm5)
            .unwrap_err()
            .to_string();
        assert!(err.contains("@location(5)"), "{err}");
    }

    #[test]
    fn direct_vertex_arguments_are_checked() {
        let ok = r#"
@vertex
fn main(@location(0) p: vec2<f32>, @builtin(vertex_index) i: u32) -> @builtin(position) vec4<f32> {
    return vec4<f32>(p, f32(i), 1.0);
}
"#;
        assert!(validate(ShaderStage::Vertex, "ok.wgsl", ok, ShaderModel::Sm5).is_ok());
        let bad = ok.replace("@location(0)", "@location(3)");
        assert!(validate(ShaderStage::Vertex, "bad.wgsl", &bad, ShaderModel::Sm5).is_err());
    }

    #[test]
    fn default_programs_validate() {
        use crate::device::shaders;
        assert!(validate(ShaderStage::Vertex, "default", shaders::DEFAULT_VERTEX, ShaderModel::Sm5).is_ok());
        assert!(validate(ShaderStage::Pixel, "color", shaders::COLOR_PIXEL, ShaderModel::Sm5).is_ok());
        assert!(validate(ShaderStage::Pixel, "texture", shaders::TEXTURE_PIXEL, ShaderModel::Sm5).is_ok());
    }
}
