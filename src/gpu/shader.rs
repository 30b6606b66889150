//! WGSL assembly helpers.
//!
//! Kernel sources in this crate carry `%%NAME%%` placeholders for the
//! constants every shader bakes (atom count, grid sizes, centroid count,
//! fixed-point scale, decay...). `inject` substitutes them with typed
//! literals before module creation; no runtime specialization constants
//! are involved, so changing a constant means rebuilding the pipeline.

/// Substitute every `%%NAME%%` placeholder and panic on leftovers.
///
/// Leftover placeholders are programmer errors (a kernel asked for a
/// constant the config table does not provide) and would otherwise only
/// surface as an opaque naga parse failure.
pub fn inject(source: &str, constants: &[(&str, String)]) -> String {
    let mut out = source.to_string();
    for (name, value) in constants {
        out = out.replace(&format!("%%{}%%", name), value);
    }
    if let Some(pos) = out.find("%%") {
        let tail: String = out[pos..].chars().take(32).collect();
        panic!("unsubstituted shader placeholder near: {}", tail);
    }
    out
}

/// Hash and random helpers shared by kernels that need per-thread
/// deterministic noise (wander phases, NCA fire mask).
pub const HASH_WGSL: &str = r#"
fn hash(n: u32) -> u32 {
    var x = n;
    x = x ^ (x >> 17u);
    x = x * 0xed5ad4bbu;
    x = x ^ (x >> 11u);
    x = x * 0xac4c1b51u;
    x = x ^ (x >> 15u);
    x = x * 0x31848babu;
    x = x ^ (x >> 14u);
    return x;
}

fn hash3(p: vec3<u32>) -> u32 {
    return hash(p.x + hash(p.y + hash(p.z)));
}

// Random float in [0, 1)
fn rand(seed: u32) -> f32 {
    return f32(hash(seed)) / 4294967295.0;
}
"#;

/// Create a shader module from a placeholder source and a constant table.
pub fn create_module(
    device: &wgpu::Device,
    label: &str,
    source: &str,
    constants: &[(&str, String)],
) -> wgpu::ShaderModule {
    let injected = inject(source, constants);
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(injected.into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_replaces_all_occurrences() {
        let src = "const N: u32 = %%N%%; const M: u32 = %%N%%;";
        let out = inject(src, &[("N", "42u".to_string())]);
        assert_eq!(out, "const N: u32 = 42u; const M: u32 = 42u;");
    }

    #[test]
    #[should_panic(expected = "unsubstituted")]
    fn test_inject_panics_on_leftover() {
        inject("let x = %%MISSING%%;", &[("N", "1u".to_string())]);
    }

    #[test]
    fn test_all_kernel_sources_fully_inject() {
        let cfg = crate::config::FieldConfig {
            atom_count: 1024,
            clusters: 16,
            ..crate::config::FieldConfig::default()
        };
        let consts = cfg.shader_constants();
        for (name, src) in [
            ("physics", crate::gpu::physics::PHYSICS_WGSL),
            ("splat", crate::gpu::splat::SPLAT_WGSL),
            ("decay", crate::gpu::trail::DECAY_WGSL),
            ("bloom", crate::gpu::trail::BLOOM_WGSL),
            ("render", crate::gpu::render::RENDER_WGSL),
            ("kmeans", crate::gpu::kmeans::KMEANS_WGSL),
            ("nca_mlp", crate::gpu::nca::MLP_WGSL),
            ("nca_rds", crate::gpu::nca::RDS_WGSL),
        ] {
            let full = format!("{}\n{}", HASH_WGSL, src);
            let out = inject(&full, &consts);
            assert!(!out.contains("%%"), "{} left a placeholder", name);
            assert!(out.contains("fn "), "{} has no entry point", name);
        }
    }
}
