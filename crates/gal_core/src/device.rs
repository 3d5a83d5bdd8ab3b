//! Device collaborator interfaces.
//!
//! The binding core never talks to a graphics API directly. It consumes two
//! traits instead:
//!
//! - [`Device`]: create / destroy / describe every object kind.
//! - [`DescriptorBackend`]: native descriptor pools and sets, for backends
//!   with explicit descriptor sets. Flat-slot backends never touch it.
//!
//! Both are object safe and shared as `Arc<dyn …>` across worker threads.

use std::sync::Arc;

use crate::Result;
use crate::descriptors::{
    BindGroupDesc, BindGroupLayoutDesc, BufferDesc, SamplerDesc, ShaderDesc, TextureDesc,
};
use crate::handles::{
    BindGroupHandle, BindGroupLayoutHandle, BufferHandle, ComputePipelineHandle,
    DescriptorPoolHandle, DescriptorSetHandle, GraphicsPipelineHandle, SamplerHandle,
    ShaderHandle, TextureHandle,
};
use crate::pipeline_desc::{ComputePipelineDesc, GraphicsPipelineDesc};
use crate::types::ShaderResourceType;

/// Optional features reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceCapabilities {
    /// 4x multisampled textures can be sampled.
    pub msaa4x: bool,
    /// Samplers can be baked into bind group layouts.
    pub immutable_samplers: bool,
}

pub trait Device: Send + Sync {
    fn capabilities(&self) -> DeviceCapabilities;

    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferHandle>;
    fn destroy_buffer(&self, handle: BufferHandle);
    fn buffer_desc(&self, handle: BufferHandle) -> Option<BufferDesc>;

    fn create_texture(&self, desc: &TextureDesc) -> Result<TextureHandle>;
    fn destroy_texture(&self, handle: TextureHandle);
    fn texture_desc(&self, handle: TextureHandle) -> Option<TextureDesc>;

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<SamplerHandle>;
    fn destroy_sampler(&self, handle: SamplerHandle);
    fn sampler_desc(&self, handle: SamplerHandle) -> Option<SamplerDesc>;

    fn create_shader(&self, desc: &ShaderDesc) -> Result<ShaderHandle>;
    fn destroy_shader(&self, handle: ShaderHandle);
    fn shader_desc(&self, handle: ShaderHandle) -> Option<ShaderDesc>;

    fn create_bind_group_layout(&self, desc: &BindGroupLayoutDesc)
    -> Result<BindGroupLayoutHandle>;
    fn destroy_bind_group_layout(&self, handle: BindGroupLayoutHandle);
    fn bind_group_layout_desc(
        &self,
        handle: BindGroupLayoutHandle,
    ) -> Option<Arc<BindGroupLayoutDesc>>;

    fn create_bind_group(&self, desc: &BindGroupDesc) -> Result<BindGroupHandle>;
    fn destroy_bind_group(&self, handle: BindGroupHandle);

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc)
    -> Result<GraphicsPipelineHandle>;
    fn destroy_graphics_pipeline(&self, handle: GraphicsPipelineHandle);

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc)
    -> Result<ComputePipelineHandle>;
    fn destroy_compute_pipeline(&self, handle: ComputePipelineHandle);
}

/// Capacity of one descriptor type within a native pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorPoolSize {
    pub resource_type: ShaderResourceType,
    pub count: u32,
}

pub trait DescriptorBackend: Send + Sync {
    fn create_descriptor_pool(
        &self,
        sizes: &[DescriptorPoolSize],
        max_sets: u32,
    ) -> Result<DescriptorPoolHandle>;
    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle);

    /// Allocates one set shaped like `layout` from `pool`.
    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        layout: BindGroupLayoutHandle,
    ) -> Result<DescriptorSetHandle>;
    fn free_descriptor_sets(&self, pool: DescriptorPoolHandle, sets: &[DescriptorSetHandle]);
}
