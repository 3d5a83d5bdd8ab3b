//! # GAL Core
//!
//! Foundational types shared by every layer of the binding core:
//!
//! - [`handles`]: `slotmap` keys for every device object
//! - [`name`]: hashed slot names
//! - [`types`]: resource kinds, stage and usage flags, sub-resource ranges
//! - [`descriptors`]: creation descriptions for buffers, textures, samplers,
//!   shaders, bind group layouts and bind groups
//! - [`pipeline_desc`]: hashable graphics and compute pipeline descriptors
//! - [`device`]: the `Device` and `DescriptorBackend` collaborator traits
//! - [`error`]: [`GalError`] and the [`Result`] alias
//! - [`settings`]: [`GalSettings`]

pub mod descriptors;
pub mod device;
pub mod error;
pub mod handles;
pub mod name;
pub mod pipeline_desc;
pub mod settings;
pub mod types;

pub use descriptors::{
    BindGroupDesc, BindGroupItem, BindGroupItemFlags, BindGroupItemKind, BindGroupLayoutDesc,
    BufferDesc, ConstantBufferLayout, ConstantBufferMember, SamplerDesc, ShaderDesc,
    ShaderResourceBinding, TextureDesc, fx_hash_key,
};
pub use device::{DescriptorBackend, DescriptorPoolSize, Device, DeviceCapabilities};
pub use error::{GalError, Result};
pub use handles::{
    BindGroupHandle, BindGroupLayoutHandle, BufferHandle, ComputePipelineHandle,
    DescriptorPoolHandle, DescriptorSetHandle, GraphicsPipelineHandle, HandleKind, ResourceId,
    SamplerHandle, ShaderHandle, TextureHandle,
};
pub use name::{HashedName, TempHashedName, hash_name};
pub use pipeline_desc::{
    BlendComponentDesc, BlendDesc, ComputePipelineDesc, DepthStencilDesc, GraphicsPipelineDesc,
    HashedComputePipelineDesc, HashedGraphicsPipelineDesc, HashedPipelineDesc, MAX_RENDER_TARGETS, RasterizerDesc, RenderTargetFormats, StencilFaceDesc, TargetBlendDesc,
    VertexAttributeDesc, VertexLayoutDesc,
};
pub use settings::{DescriptorPoolSettings, FallbackSettings, GalSettings};
pub use types::{
    BufferRange, BufferUsageFlags, ShaderResourceType, ShaderStageFlags, ShaderTextureType,
    TextureRange, TextureType,
};

pub use slotmap::Key;
