//! WGSL declarations matching the wgpu backend's binding contract.
//!
//! Group 0 holds the dispatch parameters (binding 0, uniform), the input
//! buffer (binding 1, read-only storage) and the output buffer (binding 2,
//! read-write storage). `u8` buffers are packed four elements per `u32` word,
//! since WGSL has no 8-bit storage type.

use crate::element::ElementKind;

/// WGSL element type used to address a buffer of `kind` from a kernel.
fn scalar_type(kind: ElementKind) -> &'static str {
    match kind {
        ElementKind::U8 | ElementKind::U32 => "u32",
        ElementKind::I32 => "i32",
        ElementKind::F32 => "f32",
    }
}

fn load_input_fn(kind: ElementKind) -> String {
    match kind {
        ElementKind::U8 => "fn load_input(i: i32) -> u32 {
    let word = input_data[u32(i) / 4u];
    return (word >> ((u32(i) % 4u) * 8u)) & 0xffu;
}"
        .to_string(),
        other => format!(
            "fn load_input(i: i32) -> {ty} {{
    return input_data[i];
}}",
            ty = scalar_type(other)
        ),
    }
}

fn store_output_fn(kind: ElementKind) -> String {
    match kind {
        // The output buffer is cleared before every dispatch, so or-ing the
        // byte into its word is enough.
        ElementKind::U8 => "fn store_output(i: i32, value: u32) {
    atomicOr(&output_data[u32(i) / 4u], (value & 0xffu) << ((u32(i) % 4u) * 8u));
}"
        .to_string(),
        other => format!(
            "fn store_output(i: i32, value: {ty}) {{
    output_data[i] = value;
}}",
            ty = scalar_type(other)
        ),
    }
}

/// Builds the WGSL declarations a kernel needs to run on the wgpu backend.
///
/// Provides `params`, `input_data`, `output_data`, the `WORKGROUP_X/Y/Z`
/// constants, `input_index`/`output_index` (same layout as
/// [`crate::Matrix::index`]), `output_contains`, `load_input` and
/// `store_output`. Prepend it to a kernel body that declares
/// `@workgroup_size(WORKGROUP_X, WORKGROUP_Y, WORKGROUP_Z)`.
pub fn binding_prelude(input: ElementKind, output: ElementKind, workgroup_size: [u32; 3]) -> String {
    let output_type = match output {
        ElementKind::U8 => "atomic<u32>",
        other => scalar_type(other),
    };
    format!(
        r#"// gpumat binding prelude: input {input}, output {output}

struct Params {{
    w_in: i32,
    h_in: i32,
    d_in: i32,
    w_out: i32,
    h_out: i32,
    d_out: i32,
}}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> input_data: array<{input_type}>;
@group(0) @binding(2) var<storage, read_write> output_data: array<{output_type}>;

const WORKGROUP_X: u32 = {wx}u;
const WORKGROUP_Y: u32 = {wy}u;
const WORKGROUP_Z: u32 = {wz}u;

fn input_index(x: i32, y: i32, z: i32) -> i32 {{
    return z * params.w_in * params.h_in + y * params.w_in + x;
}}

fn output_index(x: i32, y: i32, z: i32) -> i32 {{
    return z * params.w_out * params.h_out + y * params.w_out + x;
}}

fn output_contains(x: i32, y: i32, z: i32) -> bool {{
    return x < params.w_out && y < params.h_out && z < params.d_out;
}}

{load_input}

{store_output}
"#,
        input = input,
        output = output,
        input_type = scalar_type(input),
        output_type = output_type,
        wx = workgroup_size[0],
        wy = workgroup_size[1],
        wz = workgroup_size[2],
        load_input = load_input_fn(input),
        store_output = store_output_fn(output),
    )
}

/// Prepends [`binding_prelude`] to a kernel body.
pub fn with_prelude(
    input: ElementKind,
    output: ElementKind,
    workgroup_size: [u32; 3],
    kernel: &str,
) -> String {
    let mut source = binding_prelude(input, output, workgroup_size);
    source.push('\n');
    source.push_str(kernel);
    source
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_declares_bindings() {
        let wgsl = binding_prelude(ElementKind::F32, ElementKind::I32, [8, 8, 1]);
        assert!(wgsl.contains("var<uniform> params: Params;"));
        assert!(wgsl.contains("var<storage, read> input_data: array<f32>;"));
        assert!(wgsl.contains("var<storage, read_write> output_data: array<i32>;"));
        assert!(wgsl.contains("fn load_input(i: i32) -> f32"));
        assert!(wgsl.contains("fn store_output(i: i32, value: i32)"));
    }

    #[test]
    fn test_workgroup_substitution() {
        let wgsl = binding_prelude(ElementKind::U32, ElementKind::U32, [64, 2, 1]);
        assert!(wgsl.contains("const WORKGROUP_X: u32 = 64u;"));
        assert!(wgsl.contains("const WORKGROUP_Y: u32 = 2u;"));
        assert!(wgsl.contains("const WORKGROUP_Z: u32 = 1u;"));
    }

    #[test]
    fn test_u8_buffers_are_packed() {
        let wgsl = binding_prelude(ElementKind::U8, ElementKind::U8, [8, 8, 1]);
        assert!(wgsl.contains("input_data: array<u32>;"));
        assert!(wgsl.contains("output_data: array<atomic<u32>>;"));
        assert!(wgsl.contains("atomicOr"));
        assert!(wgsl.contains("fn load_input(i: i32) -> u32"));
    }

    #[test]
    fn test_params_field_order() {
        let wgsl = binding_prelude(ElementKind::F32, ElementKind::F32, [1, 1, 1]);
        let fields = ["w_in", "h_in", "d_in", "w_out", "h_out", "d_out"];
        let positions: Vec<usize> = fields
            .iter()
            .map(|f| wgsl.find(&format!("    {f}: i32,")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_with_prelude_appends_kernel() {
        let source = with_prelude(ElementKind::F32, ElementKind::F32, [1, 1, 1], "fn main() {}");
        assert!(source.starts_with("// gpumat binding prelude"));
        assert!(source.ends_with("fn main() {}"));
    }
}
