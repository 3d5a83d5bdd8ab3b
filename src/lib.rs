//! # GAL
//!
//! Resource-binding and pipeline-caching core of a render hardware
//! interface. This crate re-exports the member crates:
//!
//! - [`core`] (`gal_core`): handles, descriptions, device traits, errors
//! - [`foundation`] (`gal_foundation`): dependency tracker, pipeline cache,
//!   descriptor-set pools, bind group store, [`GalContext`]
//! - [`render`] (`gal_render`): [`BindGroupBuilder`]
//!
//! ```rust,ignore
//! let ctx = GalContext::initialize(device, Some(backend), GalSettings::default())?;
//!
//! let mut builder = BindGroupBuilder::new();
//! builder.reset_bound_resources(&ctx);
//! builder.bind_texture("Albedo", albedo, TextureRange::whole(), None);
//! let bind_group = ctx.create_bind_group(&builder.create_bind_group(layout)?)?;
//!
//! let pipeline = ctx.pipeline_cache()?.get_graphics_pipeline(&desc)?;
//! ```

pub use gal_core as core;
pub use gal_foundation as foundation;
pub use gal_render as render;

pub use gal_core::{
    BindGroupDesc, BindGroupHandle, BindGroupItem, BindGroupItemFlags, BindGroupItemKind,
    BindGroupLayoutDesc, BindGroupLayoutHandle, BufferDesc, BufferHandle, BufferRange,
    ComputePipelineDesc, ComputePipelineHandle, DescriptorBackend, Device, DeviceCapabilities,
    GalError, GalSettings, GraphicsPipelineDesc, GraphicsPipelineHandle, HandleKind,
    HashedComputePipelineDesc, HashedGraphicsPipelineDesc, ResourceId, Result, SamplerDesc, SamplerHandle, ShaderDesc, ShaderHandle, ShaderResourceBinding,
    ShaderResourceType, ShaderTextureType, TextureDesc, TextureHandle, TextureRange,
};
pub use gal_foundation::{
    BindGroupStore, DependencyTracker, DescriptorSetPools, FallbackResources, GalContext,
    ImmutableSamplers, PipelineCache,
};
pub use gal_render::{BindGroupBuilder, BuilderStats};
