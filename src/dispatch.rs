//! Kernel Dispatcher.
//!
//! The crate's single entry point for running an operator: glues the
//! [`crate::device::DeviceCapabilityRegistry`], [`crate::dtype::BufferDtypeRegistry`]
//! and [`crate::pipeline::PipelineCache`] together and walks the nine-step
//! dispatch protocol (validate -> resolve dtype -> select variant -> get
//! pipeline -> encode uniforms -> build bind group -> encode dispatch ->
//! submit -> stamp output dtype) for each operator.
//!
//! Owns the device/queue pair, the pipeline cache, and both registries,
//! and routes every operator through the same bind-and-dispatch core
//! instead of duplicating bind-group construction per method.

use std::sync::Arc;

use futures::channel::oneshot;
use wgpu::util::DeviceExt;

use crate::buffer::BufferHandle;
use crate::device::DeviceCapabilityRegistry;
use crate::dtype::{BufferDtypeRegistry, Dtype};
use crate::error::{DispatchError, DispatchResult};
use crate::kernels::config::KERNEL_CONFIGS;
use crate::kernels::{
    activation, attention, convert, gather, matmul, norm, quantize, rope, routing,
    STORAGE_BINDING_ALIGNMENT,
};
use crate::pipeline::PipelineCache;
use crate::recorder::CommandRecorder;
use crate::shader::ShaderSource;

/// One storage-buffer argument to a dispatch, bound at an explicit
/// `offset`/`size` rather than the whole buffer, so a tensor that is a
/// sub-allocation within a larger buffer can still be bound directly.
pub struct StorageArg<'a> {
    pub handle: BufferHandle<'a>,
    pub offset: u64,
    pub size: Option<u64>,
}

impl<'a> StorageArg<'a> {
    pub fn whole(handle: BufferHandle<'a>) -> Self {
        let size = handle.size_bytes();
        Self {
            handle,
            offset: 0,
            size: Some(size),
        }
    }
}

/// Where a conversion's result ended up: a device buffer the caller
/// already owns, or (when even the fallback output would not fit in a
/// single buffer) a host array the caller must stage manually.
pub enum ConversionOutput {
    Device,
    Host(Vec<f32>),
}

/// Looks up a `(operation, variant)` pair's declared workgroup size from
/// the static kernel config table, for use in dispatch-count math that
/// must match the shader's `@workgroup_size` attribute exactly.
fn workgroup_size_for(operation: &'static str, variant: &'static str) -> (u32, u32, u32) {
    KERNEL_CONFIGS
        .iter()
        .find(|c| c.operation == operation && c.variant == variant)
        .map(|c| c.workgroup_size)
        .unwrap_or((64, 1, 1))
}

pub struct KernelDispatcher {
    registry: DeviceCapabilityRegistry,
    dtypes: BufferDtypeRegistry,
    pipelines: PipelineCache,
}

impl KernelDispatcher {
    pub fn new(
        registry: DeviceCapabilityRegistry,
        source: Arc<dyn ShaderSource>,
        configs: &'static [crate::pipeline::KernelConfig],
    ) -> Self {
        let pipelines = PipelineCache::new(Arc::clone(registry.device()), source, configs);
        Self {
            registry,
            dtypes: BufferDtypeRegistry::new(),
            pipelines,
        }
    }

    pub fn capability_registry(&self) -> &DeviceCapabilityRegistry {
        &self.registry
    }

    pub fn dtype_registry(&mut self) -> &mut BufferDtypeRegistry {
        &mut self.dtypes
    }

    pub fn pipeline_cache(&mut self) -> &mut PipelineCache {
        &mut self.pipelines
    }

    pub fn prewarm(&mut self) {
        self.pipelines.prewarm_all(self.registry.capabilities());
    }

    /// The shared core of every dispatch: builds the automatic bind-group
    /// layout, creates the uniform buffer, records one compute pass, and
    /// submits immediately. Storage args are bound at ascending indices
    /// starting at 0; the uniform buffer always occupies the next index.
    fn dispatch_core(
        &mut self,
        operation: &'static str,
        variant: &'static str,
        storage_args: &[StorageArg<'_>],
        uniform_bytes: &[u8],
        workgroups: (u32, u32, u32),
    ) -> DispatchResult<()> {
        let caps = *self.registry.capabilities();
        let pipeline = self.pipelines.create_pipeline(operation, variant, &caps)?;
        let bind_group_layout = pipeline.get_bind_group_layout(0);
        let device = self.registry.device();

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("dispatch-uniforms"),
            contents: uniform_bytes,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let mut entries: Vec<wgpu::BindGroupEntry> = Vec::with_capacity(storage_args.len() + 1);
        for (i, arg) in storage_args.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: i as u32,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: arg.handle.buffer(),
                    offset: arg.offset,
                    size: arg.size.and_then(std::num::NonZeroU64::new),
                }),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: storage_args.len() as u32,
            resource: uniform_buffer.as_entire_binding(),
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(operation),
            layout: &bind_group_layout,
            entries: &entries,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(operation),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(operation),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(workgroups.0, workgroups.1, workgroups.2);
        }
        self.registry.queue().submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// The batched-path counterpart to [`Self::dispatch_core`]: builds the
    /// same automatic bind-group layout and uniform buffer, but records
    /// the compute pass into `recorder`'s encoder instead of submitting on
    /// its own. The uniform buffer is owned by `recorder`, not dropped at
    /// the end of this call.
    fn record_core(
        &mut self,
        recorder: &mut CommandRecorder,
        operation: &'static str,
        variant: &'static str,
        storage_args: &[StorageArg<'_>],
        uniform_bytes: &[u8],
        workgroups: (u32, u32, u32),
    ) -> DispatchResult<()> {
        let caps = *self.registry.capabilities();
        let pipeline = self.pipelines.create_pipeline(operation, variant, &caps)?;
        let bind_group_layout = pipeline.get_bind_group_layout(0);

        let uniform_index = recorder.create_uniform_buffer_bytes(uniform_bytes, "dispatch-uniforms");

        let mut entries: Vec<wgpu::BindGroupEntry> = Vec::with_capacity(storage_args.len() + 1);
        for (i, arg) in storage_args.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: i as u32,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: arg.handle.buffer(),
                    offset: arg.offset,
                    size: arg.size.and_then(std::num::NonZeroU64::new),
                }),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: storage_args.len() as u32,
            resource: recorder.uniform_buffer(uniform_index).as_entire_binding(),
        });

        let bind_group = self.registry.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(operation),
            layout: &bind_group_layout,
            entries: &entries,
        });

        recorder.begin_compute_pass(operation, |pass| {
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(workgroups.0, workgroups.1, workgroups.2);
        })
    }

    fn check_limits(&self, operation: &'static str, x: u32, y: u32) -> DispatchResult<()> {
        crate::kernels::check_dispatch_within_limits(
            operation,
            x,
            y,
            self.registry.limits().max_compute_workgroups_per_dimension,
        )
    }

    /// Copies `size` bytes starting at `offset` in `buffer` back to the
    /// host via a staging buffer, blocking until the mapping resolves.
    fn read_buffer_range(&self, buffer: &wgpu::Buffer, offset: u64, size: u64) -> DispatchResult<Vec<u8>> {
        let device = self.registry.device();
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cpu-fallback-staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("cpu-fallback-readback"),
        });
        encoder.copy_buffer_to_buffer(buffer, offset, &staging, 0, size);
        self.registry.queue().submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::MaintainBase::Wait);
        futures::executor::block_on(rx)
            .map_err(|e| DispatchError::Transient(e.to_string()))?
            .map_err(|e| DispatchError::Transient(e.to_string()))?;

        let bytes = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(bytes)
    }

    // --- matmul ---

    #[allow(clippy::too_many_arguments)]
    pub fn matmul(
        &mut self,
        args: &matmul::MatmulArgs,
        a_dtype: Dtype,
        b_dtype: Dtype,
        output_dtype: Dtype,
        prefer_f16: bool,
        use_vec4: bool,
        a: StorageArg<'_>,
        b: StorageArg<'_>,
        c: StorageArg<'_>,
    ) -> DispatchResult<()> {
        matmul::validate(args)?;
        let caps = *self.registry.capabilities();
        let select_input = matmul::MatmulSelectInput {
            a_dtype,
            b_dtype,
            output_dtype,
            m: args.m,
            prefer_f16,
            use_vec4,
        };
        let variant = matmul::select_variant(&select_input, &caps);
        let wg = workgroup_size_for(matmul::OPERATION, variant.as_str());
        let max_per_dim = self.registry.limits().max_compute_workgroups_per_dimension;
        let (x, y, z) = if variant == matmul::MatmulVariant::F16wF32aNaive {
            // The naive path dispatches 1-D over N; wrap into 2-D instead
            // of failing when N alone would exceed the per-dimension limit.
            let (wx, wy) = matmul::wrapped_dispatch_count(variant, args, wg, max_per_dim);
            (wx, wy, 1)
        } else {
            let (x, y, z) = matmul::dispatch_count(variant, args, wg);
            self.check_limits(matmul::OPERATION, x, y)?;
            (x, y, z)
        };
        let uniforms = matmul::uniforms(args);
        let output_id = c.handle.id();
        self.dispatch_core(
            matmul::OPERATION,
            variant.as_str(),
            &[a, b, c],
            bytemuck::bytes_of(&uniforms),
            (x, y, z),
        )?;
        self.dtypes.set_dtype(output_id, variant.output_dtype());
        Ok(())
    }

    // --- attention ---

    pub fn attention(
        &mut self,
        args: &attention::AttentionArgs,
        query: StorageArg<'_>,
        key: StorageArg<'_>,
        value: StorageArg<'_>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        attention::validate(args)?;
        let limits = *self.registry.limits();
        let caps = *self.registry.capabilities();
        attention::pre_dispatch_validate(args, &limits)?;
        let tier = attention::select_tier(args, &limits);
        let f16_kv = attention::f16_kv_selected(args, &caps);
        let variant = tier.variant_name(f16_kv);
        let x = attention::dispatch_count(tier, args);
        self.check_limits(attention::OPERATION, x, 1)?;
        let uniforms = attention::uniforms(args);
        let output_id = output.handle.id();
        self.dispatch_core(
            attention::OPERATION,
            variant,
            &[query, key, value, output],
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )?;
        // Attention always accumulates and writes back in f32, regardless
        // of the KV cache's storage precision.
        self.dtypes.set_dtype(output_id, Dtype::F32);
        Ok(())
    }

    // --- rmsnorm ---

    pub fn rmsnorm(
        &mut self,
        hidden_size: u32,
        num_tokens: u32,
        eps: f32,
        has_residual: bool,
        input: StorageArg<'_>,
        weight: StorageArg<'_>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        norm::validate_rmsnorm(hidden_size, num_tokens)?;
        let variant = norm::select_rmsnorm_variant(hidden_size, has_residual);
        let uniforms = norm::RmsNormUniforms {
            hidden_size,
            num_tokens,
            eps,
            has_residual: has_residual as u32,
        };
        let x = norm::dispatch_count_per_row(num_tokens);
        self.dispatch_core(
            norm::RMSNORM_OPERATION,
            variant.as_str(),
            &[input, weight, output],
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )
    }

    // --- softmax ---

    pub fn softmax(
        &mut self,
        inner_size: u32,
        outer_size: u32,
        temperature: f32,
        input: StorageArg<'_>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        norm::validate_softmax(inner_size, outer_size)?;
        let variant = norm::select_softmax_variant(inner_size);
        let uniforms = norm::SoftmaxUniforms {
            inner_size,
            outer_size,
            temperature,
            _pad: 0,
        };
        let x = norm::dispatch_count_per_row(outer_size);
        self.dispatch_core(
            norm::SOFTMAX_OPERATION,
            variant.as_str(),
            &[input, output],
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )
    }

    // --- rope ---

    pub fn rope(
        &mut self,
        args: &rope::RopeArgs,
        variant: rope::RopeVariant,
        data: StorageArg<'_>,
        freqs: Option<StorageArg<'_>>,
    ) -> DispatchResult<()> {
        rope::validate(args)?;
        let wg = workgroup_size_for(rope::OPERATION, variant.as_str());
        let uniforms = rope::uniforms(args);
        let x = rope::dispatch_count(args, wg.0);
        let mut storage_args = vec![data];
        if let Some(f) = freqs {
            storage_args.push(f);
        }
        self.dispatch_core(
            rope::OPERATION,
            variant.as_str(),
            &storage_args,
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )
    }

    // --- activations ---

    pub fn silu(
        &mut self,
        size: u32,
        has_gate: bool,
        input: StorageArg<'_>,
        gate: Option<StorageArg<'_>>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        self.dispatch_elementwise(activation::SILU_OPERATION, size, has_gate, input, gate, output)
    }

    pub fn gelu(
        &mut self,
        size: u32,
        has_gate: bool,
        input: StorageArg<'_>,
        gate: Option<StorageArg<'_>>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        self.dispatch_elementwise(activation::GELU_OPERATION, size, has_gate, input, gate, output)
    }

    fn dispatch_elementwise(
        &mut self,
        operation: &'static str,
        size: u32,
        has_gate: bool,
        input: StorageArg<'_>,
        gate: Option<StorageArg<'_>>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        activation::validate_elementwise(operation, size)?;
        let variant = activation::select_gated_variant(has_gate);
        let uniforms = activation::elementwise_uniforms(size, has_gate);
        let wg = workgroup_size_for(operation, variant.as_str());
        let x = activation::dispatch_count(size, wg.0);
        let mut storage_args = vec![input];
        if let Some(g) = gate {
            storage_args.push(g);
        }
        storage_args.push(output);
        self.dispatch_core(
            operation,
            variant.as_str(),
            &storage_args,
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )
    }

    pub fn residual_add(
        &mut self,
        size: u32,
        input: StorageArg<'_>,
        residual: StorageArg<'_>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        activation::validate_elementwise(activation::RESIDUAL_ADD_OPERATION, size)?;
        let uniforms = activation::elementwise_uniforms(size, false);
        let wg = workgroup_size_for(activation::RESIDUAL_ADD_OPERATION, "default");
        let x = activation::dispatch_count(size, wg.0);
        self.dispatch_core(
            activation::RESIDUAL_ADD_OPERATION,
            "default",
            &[input, residual, output],
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )
    }

    pub fn bias_add(
        &mut self,
        size: u32,
        offset: u64,
        input: StorageArg<'_>,
        bias: StorageArg<'_>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        activation::validate_elementwise(activation::BIAS_ADD_OPERATION, size)?;
        activation::validate_bias_add_offset(offset)?;
        let uniforms = activation::elementwise_uniforms(size, false);
        let wg = workgroup_size_for(activation::BIAS_ADD_OPERATION, "default");
        let x = activation::dispatch_count(size, wg.0);
        self.dispatch_core(
            activation::BIAS_ADD_OPERATION,
            "default",
            &[input, bias, output],
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )
    }

    // --- gather ---

    pub fn gather(
        &mut self,
        num_tokens: u32,
        hidden_size: u32,
        indices: StorageArg<'_>,
        embedding_table: StorageArg<'_>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        gather::validate(num_tokens, hidden_size)?;
        let variant = gather::select_variant(hidden_size);
        let wg = workgroup_size_for(gather::OPERATION, variant.as_str());
        let x = gather::dispatch_count(num_tokens, hidden_size, variant, wg.0);
        let uniforms = [num_tokens, hidden_size];
        self.dispatch_core(
            gather::OPERATION,
            variant.as_str(),
            &[indices, embedding_table, output],
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )
    }

    // --- dequantize ---

    pub fn dequant_q4k(
        &mut self,
        num_blocks: u32,
        use_vec4: bool,
        output_dtype: Dtype,
        packed: StorageArg<'_>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        quantize::validate_q4k(num_blocks)?;
        let caps = *self.registry.capabilities();
        let variant = quantize::select_q4k_variant(output_dtype, use_vec4, &caps);
        let wg = workgroup_size_for(quantize::Q4K_OPERATION, variant.as_str());
        let x = quantize::q4k_dispatch_count(variant, num_blocks, wg.0);
        let output_id = output.handle.id();
        let uniforms = [num_blocks];
        self.dispatch_core(
            quantize::Q4K_OPERATION,
            variant.as_str(),
            &[packed, output],
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )?;
        self.dtypes.set_dtype(output_id, output_dtype);
        Ok(())
    }

    /// `expert` scopes the dequant to one expert's slab of a packed
    /// `[num_experts, out_dim, num_groups, 16]` tensor (`mxfp4_expert`);
    /// `None` dequantizes the full tensor (`mxfp4`/`mxfp4_vec4`).
    pub fn dequant_mxfp4(
        &mut self,
        num_blocks: u32,
        use_vec4: bool,
        output_dtype: Dtype,
        expert: Option<quantize::Mxfp4ExpertSelect>,
        packed: StorageArg<'_>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        quantize::validate_mxfp4(num_blocks)?;
        if let Some(e) = &expert {
            quantize::validate_mxfp4_expert(e)?;
        }
        let variant = quantize::select_mxfp4_variant(expert.is_some(), use_vec4);
        let x = quantize::mxfp4_dispatch_count(num_blocks);
        let uniforms = quantize::mxfp4_uniforms(num_blocks, expert.as_ref());
        let output_id = output.handle.id();
        self.dispatch_core(
            quantize::MXFP4_OPERATION,
            variant.as_str(),
            &[packed, output],
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )?;
        self.dtypes.set_dtype(output_id, output_dtype);
        Ok(())
    }

    // --- MoE routing ---

    pub fn topk(
        &mut self,
        num_tokens: u32,
        num_experts: u32,
        k: u32,
        normalize: bool,
        logits: StorageArg<'_>,
        indices: StorageArg<'_>,
        weights: StorageArg<'_>,
    ) -> DispatchResult<()> {
        routing::validate_topk(num_tokens, num_experts, k)?;
        let variant = routing::select_topk_variant(k, num_experts);
        let wg = workgroup_size_for(routing::TOPK_OPERATION, variant.as_str());
        let x = routing::topk_dispatch_count(num_tokens, wg.0);
        let uniforms = [num_tokens, num_experts, k, normalize as u32];
        self.dispatch_core(
            routing::TOPK_OPERATION,
            variant.as_str(),
            &[logits, indices, weights],
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )
    }

    /// Fuses the softmax normalization into the top-k selection, one
    /// workgroup per token, without materializing the full softmax row.
    pub fn softmax_topk(
        &mut self,
        num_tokens: u32,
        num_experts: u32,
        k: u32,
        normalize: bool,
        logits: StorageArg<'_>,
        indices: StorageArg<'_>,
        weights: StorageArg<'_>,
    ) -> DispatchResult<()> {
        routing::validate_topk(num_tokens, num_experts, k)?;
        let wg = workgroup_size_for(routing::SOFTMAX_TOPK_OPERATION, "default");
        let x = routing::topk_dispatch_count(num_tokens, wg.0);
        let uniforms = [num_tokens, num_experts, k, normalize as u32];
        self.dispatch_core(
            routing::SOFTMAX_TOPK_OPERATION,
            "default",
            &[logits, indices, weights],
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )
    }

    /// Two-phase MoE gather: phase 1 (`count_and_map`) builds
    /// `token_counts`/`token_map`; phase 2 (`gather_tokens`/`_vec4`)
    /// reads that map to copy hidden states into expert-grouped order.
    /// Each phase constructs and submits its own bind group.
    #[allow(clippy::too_many_arguments)]
    pub fn moe_gather(
        &mut self,
        num_tokens: u32,
        num_experts: u32,
        top_k: u32,
        hidden_size: u32,
        max_per_expert: u32,
        expert_ids: StorageArg<'_>,
        token_counts: StorageArg<'_>,
        token_map: StorageArg<'_>,
        hidden_states: StorageArg<'_>,
        gathered: StorageArg<'_>,
    ) -> DispatchResult<()> {
        routing::validate_moe_gather(num_tokens, num_experts, top_k, hidden_size, max_per_expert)?;
        let uniforms = routing::MoeGatherUniforms {
            num_tokens,
            num_experts,
            top_k,
            hidden_size,
            max_per_expert,
        };

        let count_wg = workgroup_size_for(routing::MOE_GATHER_OPERATION, "count_and_map");
        let count_x = routing::count_and_map_dispatch_count(num_tokens, top_k, count_wg.0);
        self.dispatch_core(
            routing::MOE_GATHER_OPERATION,
            "count_and_map",
            &[expert_ids, token_counts, token_map],
            bytemuck::bytes_of(&uniforms),
            (count_x, 1, 1),
        )?;

        let variant = routing::select_gather_variant(hidden_size);
        let gather_wg = workgroup_size_for(routing::MOE_GATHER_OPERATION, variant.as_str());
        let gather_x = routing::gather_tokens_dispatch_count(
            num_experts,
            max_per_expert,
            hidden_size,
            variant,
            gather_wg.0,
        );
        self.dispatch_core(
            routing::MOE_GATHER_OPERATION,
            variant.as_str(),
            &[token_map, hidden_states, gathered],
            bytemuck::bytes_of(&uniforms),
            (gather_x, 1, 1),
        )
    }

    /// Scatters expert outputs back to token order, weighted by the
    /// routing weight. `token_offsets` supplies a dynamic per-expert
    /// stride table for the `dynamic` variant; it is ignored otherwise.
    #[allow(clippy::too_many_arguments)]
    pub fn moe_scatter_add(
        &mut self,
        num_tokens: u32,
        num_experts: u32,
        top_k: u32,
        hidden_size: u32,
        max_per_expert: u32,
        accumulate: bool,
        dynamic_offsets: bool,
        expert_outputs: StorageArg<'_>,
        token_map: StorageArg<'_>,
        weights: StorageArg<'_>,
        token_offsets: Option<StorageArg<'_>>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        routing::validate_moe_gather(num_tokens, num_experts, top_k, hidden_size, max_per_expert)?;
        let variant = routing::select_scatter_add_variant(hidden_size, accumulate, dynamic_offsets);
        let wg = workgroup_size_for(routing::MOE_SCATTER_ADD_OPERATION, variant.as_str());
        let x = routing::scatter_add_dispatch_count(
            num_experts,
            max_per_expert,
            hidden_size,
            variant,
            wg.0,
        );
        let uniforms = routing::MoeGatherUniforms {
            num_tokens,
            num_experts,
            top_k,
            hidden_size,
            max_per_expert,
        };
        let mut storage_args = vec![expert_outputs, token_map, weights];
        if variant == routing::ScatterAddVariant::Dynamic {
            if let Some(offsets) = token_offsets {
                storage_args.push(offsets);
            }
        }
        storage_args.push(output);
        self.dispatch_core(
            routing::MOE_SCATTER_ADD_OPERATION,
            variant.as_str(),
            &storage_args,
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )
    }

    // --- conversion ---

    pub fn convert_f32_to_f16(
        &mut self,
        num_elements: u32,
        input: StorageArg<'_>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        convert::validate_convert(convert::F32_TO_F16_OPERATION, num_elements)?;
        let limits = *self.registry.limits();
        let wg = workgroup_size_for(convert::F32_TO_F16_OPERATION, "f32_to_f16");
        let (x, y) = convert::dispatch_count(num_elements, wg.0, &limits);
        let output_id = output.handle.id();
        let uniforms = [num_elements, x];
        self.dispatch_core(
            convert::F32_TO_F16_OPERATION,
            "f32_to_f16",
            &[input, output],
            bytemuck::bytes_of(&uniforms),
            (x, y, 1),
        )?;
        self.dtypes.set_dtype(output_id, Dtype::F16);
        Ok(())
    }

    /// Converts `num_elements` `bf16` values at `input` to `f32` at
    /// `output`. When the output would exceed the device's max storage
    /// binding size, falls back to a chunked CPU conversion instead of
    /// dispatching a single GPU pass: the `bf16` bytes are read back
    /// once, converted [`convert::CPU_FALLBACK_CHUNK_ELEMENTS`] at a
    /// time, and each chunk is streamed into `output` via
    /// `queue.write_buffer`. If even `output` could never hold the
    /// result, the converted array is returned directly instead of
    /// touching the device buffer.
    pub fn convert_bf16_to_f32(
        &mut self,
        num_elements: u32,
        input: StorageArg<'_>,
        output: StorageArg<'_>,
    ) -> DispatchResult<ConversionOutput> {
        convert::validate_convert(convert::BF16_TO_F32_OPERATION, num_elements)?;
        let limits = *self.registry.limits();
        let num_elements_u64 = num_elements as u64;

        if !convert::requires_cpu_fallback(num_elements_u64, 4, &limits) {
            let wg = workgroup_size_for(convert::BF16_TO_F32_OPERATION, "bf16_to_f32");
            let (x, y) = convert::dispatch_count(num_elements, wg.0, &limits);
            let output_id = output.handle.id();
            let uniforms = [num_elements, x];
            self.dispatch_core(
                convert::BF16_TO_F32_OPERATION,
                "bf16_to_f32",
                &[input, output],
                bytemuck::bytes_of(&uniforms),
                (x, y, 1),
            )?;
            self.dtypes.set_dtype(output_id, Dtype::F32);
            return Ok(ConversionOutput::Device);
        }

        let input_bytes = self.read_buffer_range(input.handle.buffer(), input.offset, num_elements_u64 * 2)?;
        let input_bits: &[u16] = bytemuck::cast_slice(&input_bytes);

        if convert::output_exceeds_max_buffer_size(num_elements_u64, 4, &limits) {
            let mut host = vec![0f32; num_elements as usize];
            for (start, len) in convert::chunk_plan(num_elements_u64) {
                let range = start as usize..(start + len) as usize;
                convert::convert_bf16_chunk_to_f32(&input_bits[range.clone()], &mut host[range]);
            }
            return Ok(ConversionOutput::Host(host));
        }

        let queue = self.registry.queue();
        let mut chunk = vec![0f32; convert::CPU_FALLBACK_CHUNK_ELEMENTS.min(num_elements_u64) as usize];
        for (start, len) in convert::chunk_plan(num_elements_u64) {
            let range = start as usize..(start + len) as usize;
            let chunk_out = &mut chunk[..len as usize];
            convert::convert_bf16_chunk_to_f32(&input_bits[range], chunk_out);
            queue.write_buffer(
                output.handle.buffer(),
                output.offset + start * 4,
                bytemuck::cast_slice(chunk_out),
            );
        }
        let output_id = output.handle.id();
        self.dtypes.set_dtype(output_id, Dtype::F32);
        Ok(ConversionOutput::Device)
    }

    // --- batched (record) path ---
    //
    // One method per immediate operator above, mirroring its validate ->
    // select-variant -> dispatch-count -> uniforms sequence but routing
    // the actual pass through `record_core` into a caller-owned
    // `CommandRecorder` instead of submitting immediately. The CPU
    // fallback inside `convert_bf16_to_f32` has no batched counterpart:
    // it reads back and streams host-side work that cannot be folded
    // into a single command-buffer submission.

    #[allow(clippy::too_many_arguments)]
    pub fn record_matmul(
        &mut self,
        recorder: &mut CommandRecorder,
        args: &matmul::MatmulArgs,
        a_dtype: Dtype,
        b_dtype: Dtype,
        output_dtype: Dtype,
        prefer_f16: bool,
        use_vec4: bool,
        a: StorageArg<'_>,
        b: StorageArg<'_>,
        c: StorageArg<'_>,
    ) -> DispatchResult<()> {
        matmul::validate(args)?;
        let caps = *self.registry.capabilities();
        let select_input = matmul::MatmulSelectInput {
            a_dtype,
            b_dtype,
            output_dtype,
            m: args.m,
            prefer_f16,
            use_vec4,
        };
        let variant = matmul::select_variant(&select_input, &caps);
        let wg = workgroup_size_for(matmul::OPERATION, variant.as_str());
        let max_per_dim = self.registry.limits().max_compute_workgroups_per_dimension;
        let (x, y, z) = if variant == matmul::MatmulVariant::F16wF32aNaive {
            let (wx, wy) = matmul::wrapped_dispatch_count(variant, args, wg, max_per_dim);
            (wx, wy, 1)
        } else {
            let (x, y, z) = matmul::dispatch_count(variant, args, wg);
            self.check_limits(matmul::OPERATION, x, y)?;
            (x, y, z)
        };
        let uniforms = matmul::uniforms(args);
        let output_id = c.handle.id();
        self.record_core(
            recorder,
            matmul::OPERATION,
            variant.as_str(),
            &[a, b, c],
            bytemuck::bytes_of(&uniforms),
            (x, y, z),
        )?;
        self.dtypes.set_dtype(output_id, variant.output_dtype());
        Ok(())
    }

    pub fn record_attention(
        &mut self,
        recorder: &mut CommandRecorder,
        args: &attention::AttentionArgs,
        query: StorageArg<'_>,
        key: StorageArg<'_>,
        value: StorageArg<'_>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        attention::validate(args)?;
        let limits = *self.registry.limits();
        let caps = *self.registry.capabilities();
        attention::pre_dispatch_validate(args, &limits)?;
        let tier = attention::select_tier(args, &limits);
        let f16_kv = attention::f16_kv_selected(args, &caps);
        let variant = tier.variant_name(f16_kv);
        let x = attention::dispatch_count(tier, args);
        self.check_limits(attention::OPERATION, x, 1)?;
        let uniforms = attention::uniforms(args);
        let output_id = output.handle.id();
        self.record_core(
            recorder,
            attention::OPERATION,
            variant,
            &[query, key, value, output],
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )?;
        self.dtypes.set_dtype(output_id, Dtype::F32);
        Ok(())
    }

    pub fn record_rmsnorm(
        &mut self,
        recorder: &mut CommandRecorder,
        hidden_size: u32,
        num_tokens: u32,
        eps: f32,
        has_residual: bool,
        input: StorageArg<'_>,
        weight: StorageArg<'_>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        norm::validate_rmsnorm(hidden_size, num_tokens)?;
        let variant = norm::select_rmsnorm_variant(hidden_size, has_residual);
        let uniforms = norm::RmsNormUniforms {
            hidden_size,
            num_tokens,
            eps,
            has_residual: has_residual as u32,
        };
        let x = norm::dispatch_count_per_row(num_tokens);
        self.record_core(
            recorder,
            norm::RMSNORM_OPERATION,
            variant.as_str(),
            &[input, weight, output],
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )
    }

    pub fn record_softmax(
        &mut self,
        recorder: &mut CommandRecorder,
        inner_size: u32,
        outer_size: u32,
        temperature: f32,
        input: StorageArg<'_>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        norm::validate_softmax(inner_size, outer_size)?;
        let variant = norm::select_softmax_variant(inner_size);
        let uniforms = norm::SoftmaxUniforms {
            inner_size,
            outer_size,
            temperature,
            _pad: 0,
        };
        let x = norm::dispatch_count_per_row(outer_size);
        self.record_core(
            recorder,
            norm::SOFTMAX_OPERATION,
            variant.as_str(),
            &[input, output],
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )
    }

    pub fn record_rope(
        &mut self,
        recorder: &mut CommandRecorder,
        args: &rope::RopeArgs,
        variant: rope::RopeVariant,
        data: StorageArg<'_>,
        freqs: Option<StorageArg<'_>>,
    ) -> DispatchResult<()> {
        rope::validate(args)?;
        let wg = workgroup_size_for(rope::OPERATION, variant.as_str());
        let uniforms = rope::uniforms(args);
        let x = rope::dispatch_count(args, wg.0);
        let mut storage_args = vec![data];
        if let Some(f) = freqs {
            storage_args.push(f);
        }
        self.record_core(
            recorder,
            rope::OPERATION,
            variant.as_str(),
            &storage_args,
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )
    }

    pub fn record_silu(
        &mut self,
        recorder: &mut CommandRecorder,
        size: u32,
        has_gate: bool,
        input: StorageArg<'_>,
        gate: Option<StorageArg<'_>>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        self.record_elementwise(recorder, activation::SILU_OPERATION, size, has_gate, input, gate, output)
    }

    pub fn record_gelu(
        &mut self,
        recorder: &mut CommandRecorder,
        size: u32,
        has_gate: bool,
        input: StorageArg<'_>,
        gate: Option<StorageArg<'_>>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        self.record_elementwise(recorder, activation::GELU_OPERATION, size, has_gate, input, gate, output)
    }

    #[allow(clippy::too_many_arguments)]
    fn record_elementwise(
        &mut self,
        recorder: &mut CommandRecorder,
        operation: &'static str,
        size: u32,
        has_gate: bool,
        input: StorageArg<'_>,
        gate: Option<StorageArg<'_>>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        activation::validate_elementwise(operation, size)?;
        let variant = activation::select_gated_variant(has_gate);
        let uniforms = activation::elementwise_uniforms(size, has_gate);
        let wg = workgroup_size_for(operation, variant.as_str());
        let x = activation::dispatch_count(size, wg.0);
        let mut storage_args = vec![input];
        if let Some(g) = gate {
            storage_args.push(g);
        }
        storage_args.push(output);
        self.record_core(
            recorder,
            operation,
            variant.as_str(),
            &storage_args,
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )
    }

    pub fn record_residual_add(
        &mut self,
        recorder: &mut CommandRecorder,
        size: u32,
        input: StorageArg<'_>,
        residual: StorageArg<'_>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        activation::validate_elementwise(activation::RESIDUAL_ADD_OPERATION, size)?;
        let uniforms = activation::elementwise_uniforms(size, false);
        let wg = workgroup_size_for(activation::RESIDUAL_ADD_OPERATION, "default");
        let x = activation::dispatch_count(size, wg.0);
        self.record_core(
            recorder,
            activation::RESIDUAL_ADD_OPERATION,
            "default",
            &[input, residual, output],
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )
    }

    pub fn record_bias_add(
        &mut self,
        recorder: &mut CommandRecorder,
        size: u32,
        offset: u64,
        input: StorageArg<'_>,
        bias: StorageArg<'_>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        activation::validate_elementwise(activation::BIAS_ADD_OPERATION, size)?;
        activation::validate_bias_add_offset(offset)?;
        let uniforms = activation::elementwise_uniforms(size, false);
        let wg = workgroup_size_for(activation::BIAS_ADD_OPERATION, "default");
        let x = activation::dispatch_count(size, wg.0);
        self.record_core(
            recorder,
            activation::BIAS_ADD_OPERATION,
            "default",
            &[input, bias, output],
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )
    }

    pub fn record_gather(
        &mut self,
        recorder: &mut CommandRecorder,
        num_tokens: u32,
        hidden_size: u32,
        indices: StorageArg<'_>,
        embedding_table: StorageArg<'_>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        gather::validate(num_tokens, hidden_size)?;
        let variant = gather::select_variant(hidden_size);
        let wg = workgroup_size_for(gather::OPERATION, variant.as_str());
        let x = gather::dispatch_count(num_tokens, hidden_size, variant, wg.0);
        let uniforms = [num_tokens, hidden_size];
        self.record_core(
            recorder,
            gather::OPERATION,
            variant.as_str(),
            &[indices, embedding_table, output],
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )
    }

    pub fn record_dequant_q4k(
        &mut self,
        recorder: &mut CommandRecorder,
        num_blocks: u32,
        use_vec4: bool,
        output_dtype: Dtype,
        packed: StorageArg<'_>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        quantize::validate_q4k(num_blocks)?;
        let caps = *self.registry.capabilities();
        let variant = quantize::select_q4k_variant(output_dtype, use_vec4, &caps);
        let wg = workgroup_size_for(quantize::Q4K_OPERATION, variant.as_str());
        let x = quantize::q4k_dispatch_count(variant, num_blocks, wg.0);
        let output_id = output.handle.id();
        let uniforms = [num_blocks];
        self.record_core(
            recorder,
            quantize::Q4K_OPERATION,
            variant.as_str(),
            &[packed, output],
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )?;
        self.dtypes.set_dtype(output_id, output_dtype);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_dequant_mxfp4(
        &mut self,
        recorder: &mut CommandRecorder,
        num_blocks: u32,
        use_vec4: bool,
        output_dtype: Dtype,
        expert: Option<quantize::Mxfp4ExpertSelect>,
        packed: StorageArg<'_>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        quantize::validate_mxfp4(num_blocks)?;
        if let Some(e) = &expert {
            quantize::validate_mxfp4_expert(e)?;
        }
        let variant = quantize::select_mxfp4_variant(expert.is_some(), use_vec4);
        let x = quantize::mxfp4_dispatch_count(num_blocks);
        let uniforms = quantize::mxfp4_uniforms(num_blocks, expert.as_ref());
        let output_id = output.handle.id();
        self.record_core(
            recorder,
            quantize::MXFP4_OPERATION,
            variant.as_str(),
            &[packed, output],
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )?;
        self.dtypes.set_dtype(output_id, output_dtype);
        Ok(())
    }

    pub fn record_topk(
        &mut self,
        recorder: &mut CommandRecorder,
        num_tokens: u32,
        num_experts: u32,
        k: u32,
        normalize: bool,
        logits: StorageArg<'_>,
        indices: StorageArg<'_>,
        weights: StorageArg<'_>,
    ) -> DispatchResult<()> {
        routing::validate_topk(num_tokens, num_experts, k)?;
        let variant = routing::select_topk_variant(k, num_experts);
        let wg = workgroup_size_for(routing::TOPK_OPERATION, variant.as_str());
        let x = routing::topk_dispatch_count(num_tokens, wg.0);
        let uniforms = [num_tokens, num_experts, k, normalize as u32];
        self.record_core(
            recorder,
            routing::TOPK_OPERATION,
            variant.as_str(),
            &[logits, indices, weights],
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )
    }

    pub fn record_softmax_topk(
        &mut self,
        recorder: &mut CommandRecorder,
        num_tokens: u32,
        num_experts: u32,
        k: u32,
        normalize: bool,
        logits: StorageArg<'_>,
        indices: StorageArg<'_>,
        weights: StorageArg<'_>,
    ) -> DispatchResult<()> {
        routing::validate_topk(num_tokens, num_experts, k)?;
        let wg = workgroup_size_for(routing::SOFTMAX_TOPK_OPERATION, "default");
        let x = routing::topk_dispatch_count(num_tokens, wg.0);
        let uniforms = [num_tokens, num_experts, k, normalize as u32];
        self.record_core(
            recorder,
            routing::SOFTMAX_TOPK_OPERATION,
            "default",
            &[logits, indices, weights],
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_moe_gather(
        &mut self,
        recorder: &mut CommandRecorder,
        num_tokens: u32,
        num_experts: u32,
        top_k: u32,
        hidden_size: u32,
        max_per_expert: u32,
        expert_ids: StorageArg<'_>,
        token_counts: StorageArg<'_>,
        token_map: StorageArg<'_>,
        hidden_states: StorageArg<'_>,
        gathered: StorageArg<'_>,
    ) -> DispatchResult<()> {
        routing::validate_moe_gather(num_tokens, num_experts, top_k, hidden_size, max_per_expert)?;
        let uniforms = routing::MoeGatherUniforms {
            num_tokens,
            num_experts,
            top_k,
            hidden_size,
            max_per_expert,
        };

        let count_wg = workgroup_size_for(routing::MOE_GATHER_OPERATION, "count_and_map");
        let count_x = routing::count_and_map_dispatch_count(num_tokens, top_k, count_wg.0);
        self.record_core(
            recorder,
            routing::MOE_GATHER_OPERATION,
            "count_and_map",
            &[expert_ids, token_counts, token_map],
            bytemuck::bytes_of(&uniforms),
            (count_x, 1, 1),
        )?;

        let variant = routing::select_gather_variant(hidden_size);
        let gather_wg = workgroup_size_for(routing::MOE_GATHER_OPERATION, variant.as_str());
        let gather_x = routing::gather_tokens_dispatch_count(
            num_experts,
            max_per_expert,
            hidden_size,
            variant,
            gather_wg.0,
        );
        self.record_core(
            recorder,
            routing::MOE_GATHER_OPERATION,
            variant.as_str(),
            &[token_map, hidden_states, gathered],
            bytemuck::bytes_of(&uniforms),
            (gather_x, 1, 1),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_moe_scatter_add(
        &mut self,
        recorder: &mut CommandRecorder,
        num_tokens: u32,
        num_experts: u32,
        top_k: u32,
        hidden_size: u32,
        max_per_expert: u32,
        accumulate: bool,
        dynamic_offsets: bool,
        expert_outputs: StorageArg<'_>,
        token_map: StorageArg<'_>,
        weights: StorageArg<'_>,
        token_offsets: Option<StorageArg<'_>>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        routing::validate_moe_gather(num_tokens, num_experts, top_k, hidden_size, max_per_expert)?;
        let variant = routing::select_scatter_add_variant(hidden_size, accumulate, dynamic_offsets);
        let wg = workgroup_size_for(routing::MOE_SCATTER_ADD_OPERATION, variant.as_str());
        let x = routing::scatter_add_dispatch_count(
            num_experts,
            max_per_expert,
            hidden_size,
            variant,
            wg.0,
        );
        let uniforms = routing::MoeGatherUniforms {
            num_tokens,
            num_experts,
            top_k,
            hidden_size,
            max_per_expert,
        };
        let mut storage_args = vec![expert_outputs, token_map, weights];
        if variant == routing::ScatterAddVariant::Dynamic {
            if let Some(offsets) = token_offsets {
                storage_args.push(offsets);
            }
        }
        storage_args.push(output);
        self.record_core(
            recorder,
            routing::MOE_SCATTER_ADD_OPERATION,
            variant.as_str(),
            &storage_args,
            bytemuck::bytes_of(&uniforms),
            (x, 1, 1),
        )
    }

    pub fn record_convert_f32_to_f16(
        &mut self,
        recorder: &mut CommandRecorder,
        num_elements: u32,
        input: StorageArg<'_>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        convert::validate_convert(convert::F32_TO_F16_OPERATION, num_elements)?;
        let limits = *self.registry.limits();
        let wg = workgroup_size_for(convert::F32_TO_F16_OPERATION, "f32_to_f16");
        let (x, y) = convert::dispatch_count(num_elements, wg.0, &limits);
        let output_id = output.handle.id();
        let uniforms = [num_elements, x];
        self.record_core(
            recorder,
            convert::F32_TO_F16_OPERATION,
            "f32_to_f16",
            &[input, output],
            bytemuck::bytes_of(&uniforms),
            (x, y, 1),
        )?;
        self.dtypes.set_dtype(output_id, Dtype::F16);
        Ok(())
    }

    /// Batched GPU-path conversion; returns an error instead of falling
    /// back to the CPU chunked path, since that path reads back and
    /// writes host-side outside of any single command-buffer submission.
    pub fn record_convert_bf16_to_f32(
        &mut self,
        recorder: &mut CommandRecorder,
        num_elements: u32,
        input: StorageArg<'_>,
        output: StorageArg<'_>,
    ) -> DispatchResult<()> {
        convert::validate_convert(convert::BF16_TO_F32_OPERATION, num_elements)?;
        let limits = *self.registry.limits();
        if convert::requires_cpu_fallback(num_elements as u64, 4, &limits) {
            return Err(DispatchError::LimitExceeded {
                operator: convert::BF16_TO_F32_OPERATION,
                detail: "output exceeds max_storage_buffer_binding_size".to_string(),
                hint: "batch only the direct GPU path; run the CPU fallback outside a recorder",
            });
        }
        let wg = workgroup_size_for(convert::BF16_TO_F32_OPERATION, "bf16_to_f32");
        let (x, y) = convert::dispatch_count(num_elements, wg.0, &limits);
        let output_id = output.handle.id();
        let uniforms = [num_elements, x];
        self.record_core(
            recorder,
            convert::BF16_TO_F32_OPERATION,
            "bf16_to_f32",
            &[input, output],
            bytemuck::bytes_of(&uniforms),
            (x, y, 1),
        )?;
        self.dtypes.set_dtype(output_id, Dtype::F32);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_binding_alignment_matches_shared_constant() {
        assert_eq!(STORAGE_BINDING_ALIGNMENT, 256);
    }

    #[test]
    fn workgroup_size_lookup_finds_configured_entries() {
        assert_eq!(workgroup_size_for("matmul", "f32"), (16, 16, 1));
        assert_eq!(workgroup_size_for("gather", "vec4"), (64, 1, 1));
        assert_eq!(workgroup_size_for("bogus", "bogus"), (64, 1, 1));
    }

    #[test]
    fn conversion_output_host_variant_carries_the_converted_array() {
        // Pure branch check, no device needed: a Host result means the
        // fallback never touched a device buffer for this call.
        let out = ConversionOutput::Host(vec![1.0, 2.0, 3.0]);
        match out {
            ConversionOutput::Host(values) => assert_eq!(values, vec![1.0, 2.0, 3.0]),
            ConversionOutput::Device => panic!("expected Host"),
        }
    }
}
