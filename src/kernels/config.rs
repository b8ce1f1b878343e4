//! Static `(operation, variant) -> KernelConfig` table. One row per
//! shader entry point; consumed by [`crate::pipeline::PipelineCache`].

use crate::device::RequiredFeature;
use crate::pipeline::KernelConfig;

const F16: &[RequiredFeature] = &[RequiredFeature::ShaderF16];
const SUBGROUP: &[RequiredFeature] = &[RequiredFeature::Subgroups];
const SUBGROUP_F16: &[RequiredFeature] =
    &[RequiredFeature::Subgroups, RequiredFeature::SubgroupsF16];
const NONE: &[RequiredFeature] = &[];

pub static KERNEL_CONFIGS: &[KernelConfig] = &[
    // --- matmul ---
    KernelConfig { operation: "matmul", variant: "f32", shader_file: "matmul.wgsl", entry_point: "matmul_f32", workgroup_size: (16, 16, 1), required_features: NONE },
    KernelConfig { operation: "matmul", variant: "f16", shader_file: "matmul.wgsl", entry_point: "matmul_f16", workgroup_size: (16, 16, 1), required_features: F16 },
    KernelConfig { operation: "matmul", variant: "f16_vec4", shader_file: "matmul.wgsl", entry_point: "matmul_f16_vec4", workgroup_size: (16, 16, 1), required_features: F16 },
    KernelConfig { operation: "matmul", variant: "f16w_f32a_naive", shader_file: "matmul.wgsl", entry_point: "matmul_f16w_f32a_naive", workgroup_size: (256, 1, 1), required_features: F16 },
    KernelConfig { operation: "matmul", variant: "f16w_f32a", shader_file: "matmul.wgsl", entry_point: "matmul_f16w_f32a", workgroup_size: (16, 16, 1), required_features: F16 },

    // --- attention ---
    KernelConfig { operation: "attention", variant: "tiled_large", shader_file: "attention.wgsl", entry_point: "attention_tiled_large", workgroup_size: (64, 1, 1), required_features: NONE },
    KernelConfig { operation: "attention", variant: "tiled_large_f16kv", shader_file: "attention.wgsl", entry_point: "attention_tiled_large_f16kv", workgroup_size: (64, 1, 1), required_features: F16 },
    KernelConfig { operation: "attention", variant: "tiled_small", shader_file: "attention.wgsl", entry_point: "attention_tiled_small", workgroup_size: (32, 1, 1), required_features: NONE },
    KernelConfig { operation: "attention", variant: "tiled_small_f16kv", shader_file: "attention.wgsl", entry_point: "attention_tiled_small_f16kv", workgroup_size: (32, 1, 1), required_features: F16 },
    KernelConfig { operation: "attention", variant: "streaming", shader_file: "attention.wgsl", entry_point: "attention_streaming", workgroup_size: (1, 1, 1), required_features: NONE },
    KernelConfig { operation: "attention", variant: "streaming_f16kv", shader_file: "attention.wgsl", entry_point: "attention_streaming_f16kv", workgroup_size: (1, 1, 1), required_features: F16 },

    // --- rmsnorm ---
    KernelConfig { operation: "rmsnorm", variant: "default", shader_file: "rmsnorm.wgsl", entry_point: "rmsnorm_default", workgroup_size: (256, 1, 1), required_features: NONE },
    KernelConfig { operation: "rmsnorm", variant: "small", shader_file: "rmsnorm.wgsl", entry_point: "rmsnorm_small", workgroup_size: (64, 1, 1), required_features: NONE },
    KernelConfig { operation: "rmsnorm", variant: "residual", shader_file: "rmsnorm.wgsl", entry_point: "rmsnorm_residual", workgroup_size: (256, 1, 1), required_features: NONE },

    // --- softmax ---
    KernelConfig { operation: "softmax", variant: "small", shader_file: "softmax.wgsl", entry_point: "softmax_small", workgroup_size: (256, 1, 1), required_features: NONE },
    KernelConfig { operation: "softmax", variant: "default", shader_file: "softmax.wgsl", entry_point: "softmax_default", workgroup_size: (256, 1, 1), required_features: NONE },
    KernelConfig { operation: "softmax", variant: "online", shader_file: "softmax.wgsl", entry_point: "softmax_online", workgroup_size: (256, 1, 1), required_features: NONE },

    // --- rope ---
    KernelConfig { operation: "rope", variant: "default", shader_file: "rope.wgsl", entry_point: "rope_default", workgroup_size: (64, 1, 1), required_features: NONE },
    KernelConfig { operation: "rope", variant: "ntk", shader_file: "rope.wgsl", entry_point: "rope_ntk", workgroup_size: (64, 1, 1), required_features: NONE },
    KernelConfig { operation: "rope", variant: "yarn", shader_file: "rope.wgsl", entry_point: "rope_yarn", workgroup_size: (64, 1, 1), required_features: NONE },
    KernelConfig { operation: "rope", variant: "qk", shader_file: "rope.wgsl", entry_point: "rope_qk", workgroup_size: (64, 1, 1), required_features: NONE },
    KernelConfig { operation: "rope", variant: "compute_freqs", shader_file: "rope.wgsl", entry_point: "rope_compute_freqs", workgroup_size: (64, 1, 1), required_features: NONE },

    // --- activation: silu / gelu / geglu / swiglu ---
    KernelConfig { operation: "silu", variant: "plain", shader_file: "activation.wgsl", entry_point: "silu_plain", workgroup_size: (256, 1, 1), required_features: NONE },
    KernelConfig { operation: "silu", variant: "gated", shader_file: "activation.wgsl", entry_point: "silu_gated", workgroup_size: (256, 1, 1), required_features: NONE },
    KernelConfig { operation: "gelu", variant: "plain", shader_file: "activation.wgsl", entry_point: "gelu_plain", workgroup_size: (256, 1, 1), required_features: NONE },
    KernelConfig { operation: "gelu", variant: "gated", shader_file: "activation.wgsl", entry_point: "gelu_gated", workgroup_size: (256, 1, 1), required_features: NONE },
    KernelConfig { operation: "geglu", variant: "default", shader_file: "activation.wgsl", entry_point: "geglu_default", workgroup_size: (256, 1, 1), required_features: NONE },
    KernelConfig { operation: "swiglu", variant: "rowsplit_bias", shader_file: "activation.wgsl", entry_point: "swiglu_rowsplit_bias", workgroup_size: (256, 1, 1), required_features: NONE },

    // --- residual add / bias add ---
    KernelConfig { operation: "residual_add", variant: "default", shader_file: "elementwise.wgsl", entry_point: "residual_add", workgroup_size: (256, 1, 1), required_features: NONE },
    KernelConfig { operation: "bias_add", variant: "default", shader_file: "elementwise.wgsl", entry_point: "bias_add", workgroup_size: (256, 1, 1), required_features: NONE },

    // --- gather (embedding lookup) ---
    KernelConfig { operation: "gather", variant: "default", shader_file: "gather.wgsl", entry_point: "gather_default", workgroup_size: (256, 1, 1), required_features: NONE },
    KernelConfig { operation: "gather", variant: "vec4", shader_file: "gather.wgsl", entry_point: "gather_vec4", workgroup_size: (64, 1, 1), required_features: NONE },

    // --- dequantize Q4_K ---
    KernelConfig { operation: "dequant_q4k", variant: "subgroup", shader_file: "dequant_q4k.wgsl", entry_point: "dequant_q4k_subgroup", workgroup_size: (64, 1, 1), required_features: SUBGROUP },
    KernelConfig { operation: "dequant_q4k", variant: "subgroup_vec4", shader_file: "dequant_q4k.wgsl", entry_point: "dequant_q4k_subgroup_vec4", workgroup_size: (64, 1, 1), required_features: SUBGROUP },
    KernelConfig { operation: "dequant_q4k", variant: "subgroup_f16out", shader_file: "dequant_q4k.wgsl", entry_point: "dequant_q4k_subgroup_f16out", workgroup_size: (64, 1, 1), required_features: SUBGROUP_F16 },
    KernelConfig { operation: "dequant_q4k", variant: "subgroup_f16out_vec4", shader_file: "dequant_q4k.wgsl", entry_point: "dequant_q4k_subgroup_f16out_vec4", workgroup_size: (64, 1, 1), required_features: SUBGROUP_F16 },
    KernelConfig { operation: "dequant_q4k", variant: "shared", shader_file: "dequant_q4k.wgsl", entry_point: "dequant_q4k_shared", workgroup_size: (64, 1, 1), required_features: NONE },
    KernelConfig { operation: "dequant_q4k", variant: "shared_vec4", shader_file: "dequant_q4k.wgsl", entry_point: "dequant_q4k_shared_vec4", workgroup_size: (64, 1, 1), required_features: NONE },
    KernelConfig { operation: "dequant_q4k", variant: "shared_f16out", shader_file: "dequant_q4k.wgsl", entry_point: "dequant_q4k_shared_f16out", workgroup_size: (64, 1, 1), required_features: F16 },
    KernelConfig { operation: "dequant_q4k", variant: "shared_f16out_vec4", shader_file: "dequant_q4k.wgsl", entry_point: "dequant_q4k_shared_f16out_vec4", workgroup_size: (64, 1, 1), required_features: F16 },

    // --- dequantize MXFP4 ---
    KernelConfig { operation: "dequant_mxfp4", variant: "mxfp4", shader_file: "dequant_mxfp4.wgsl", entry_point: "dequant_mxfp4_full", workgroup_size: (64, 1, 1), required_features: NONE },
    KernelConfig { operation: "dequant_mxfp4", variant: "mxfp4_vec4", shader_file: "dequant_mxfp4.wgsl", entry_point: "dequant_mxfp4_full_vec4", workgroup_size: (64, 1, 1), required_features: NONE },
    KernelConfig { operation: "dequant_mxfp4", variant: "mxfp4_expert", shader_file: "dequant_mxfp4.wgsl", entry_point: "dequant_mxfp4_expert", workgroup_size: (64, 1, 1), required_features: NONE },

    // --- MoE routing: topk, fused softmax+topk ---
    KernelConfig { operation: "topk", variant: "topk_2_small", shader_file: "routing.wgsl", entry_point: "topk_2_small", workgroup_size: (256, 1, 1), required_features: NONE },
    KernelConfig { operation: "topk", variant: "default", shader_file: "routing.wgsl", entry_point: "topk_default", workgroup_size: (256, 1, 1), required_features: NONE },
    KernelConfig { operation: "softmax_topk", variant: "default", shader_file: "routing.wgsl", entry_point: "softmax_topk_default", workgroup_size: (256, 1, 1), required_features: NONE },

    // --- MoE gather (two-phase) ---
    KernelConfig { operation: "moe_gather", variant: "count_and_map", shader_file: "moe_gather.wgsl", entry_point: "count_and_map", workgroup_size: (256, 1, 1), required_features: NONE },
    KernelConfig { operation: "moe_gather", variant: "gather_tokens", shader_file: "moe_gather.wgsl", entry_point: "gather_tokens", workgroup_size: (64, 1, 1), required_features: NONE },
    KernelConfig { operation: "moe_gather", variant: "gather_tokens_vec4", shader_file: "moe_gather.wgsl", entry_point: "gather_tokens_vec4", workgroup_size: (64, 1, 1), required_features: NONE },
    KernelConfig { operation: "moe_gather", variant: "single_pass", shader_file: "moe_gather.wgsl", entry_point: "single_pass", workgroup_size: (64, 1, 1), required_features: NONE },

    // --- MoE scatter-add ---
    KernelConfig { operation: "moe_scatter_add", variant: "default", shader_file: "moe_scatter_add.wgsl", entry_point: "scatter_add_default", workgroup_size: (256, 1, 1), required_features: NONE },
    KernelConfig { operation: "moe_scatter_add", variant: "vec4", shader_file: "moe_scatter_add.wgsl", entry_point: "scatter_add_vec4", workgroup_size: (64, 1, 1), required_features: NONE },
    KernelConfig { operation: "moe_scatter_add", variant: "accumulate", shader_file: "moe_scatter_add.wgsl", entry_point: "scatter_add_accumulate", workgroup_size: (256, 1, 1), required_features: NONE },
    KernelConfig { operation: "moe_scatter_add", variant: "dynamic", shader_file: "moe_scatter_add.wgsl", entry_point: "scatter_add_dynamic", workgroup_size: (256, 1, 1), required_features: NONE },

    // --- type conversion ---
    KernelConfig { operation: "convert", variant: "f32_to_f16", shader_file: "convert.wgsl", entry_point: "f32_to_f16", workgroup_size: (256, 1, 1), required_features: F16 },
    KernelConfig { operation: "convert", variant: "bf16_to_f32", shader_file: "convert.wgsl", entry_point: "bf16_to_f32", workgroup_size: (256, 1, 1), required_features: NONE },
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn all_operation_variant_pairs_are_unique() {
        let mut seen = HashSet::new();
        for c in KERNEL_CONFIGS {
            assert!(
                seen.insert((c.operation, c.variant)),
                "duplicate config key {}:{}",
                c.operation,
                c.variant
            );
        }
    }

    #[test]
    fn moe_gather_single_pass_is_never_selected_by_the_dispatcher() {
        // Open question resolved in DESIGN.md: single_pass stays in the
        // config table (so it's at least compilable/prewarmable) but
        // no dispatcher path selects it; callers always take the
        // two-phase count_and_map + gather_tokens route.
        assert!(KERNEL_CONFIGS
            .iter()
            .any(|c| c.operation == "moe_gather" && c.variant == "single_pass"));
    }
}
