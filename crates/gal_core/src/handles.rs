//! Opaque GPU object handles.
//!
//! Every object the device hands out is addressed through a `slotmap` key.
//! Keys are `Copy`, hashable and carry a generation, so a handle to a
//! destroyed object never aliases a newer one. The null key is the
//! "invalid handle": [`Key::is_null`] returns `true` and
//! `Default::default()` produces it.

use slotmap::{Key, new_key_type};

new_key_type! {
    /// Handle to a GPU buffer.
    pub struct BufferHandle;
    /// Handle to a GPU texture.
    pub struct TextureHandle;
    /// Handle to a sampler state object.
    pub struct SamplerHandle;
    /// Handle to a compiled shader (all stages).
    pub struct ShaderHandle;
    /// Handle to a bind group layout.
    pub struct BindGroupLayoutHandle;
    /// Handle to a bind group.
    pub struct BindGroupHandle;
    /// Handle to a graphics pipeline object.
    pub struct GraphicsPipelineHandle;
    /// Handle to a compute pipeline object.
    pub struct ComputePipelineHandle;
    /// Handle to a backend-native descriptor pool.
    pub struct DescriptorPoolHandle;
    /// Handle to a backend-native descriptor set.
    pub struct DescriptorSetHandle;
}

/// Name of a handle family, used in errors and log messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Buffer,
    Texture,
    Sampler,
    Shader,
    BindGroupLayout,
    BindGroup,
    GraphicsPipeline,
    ComputePipeline,
    DescriptorPool,
    DescriptorSet,
}

impl std::fmt::Display for HandleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Buffer => "buffer",
            Self::Texture => "texture",
            Self::Sampler => "sampler",
            Self::Shader => "shader",
            Self::BindGroupLayout => "bind group layout",
            Self::BindGroup => "bind group",
            Self::GraphicsPipeline => "graphics pipeline",
            Self::ComputePipeline => "compute pipeline",
            Self::DescriptorPool => "descriptor pool",
            Self::DescriptorSet => "descriptor set",
        };
        f.write_str(name)
    }
}

/// A GPU object that other objects can depend on.
///
/// Used as the dependency key when bind groups and pipelines register
/// the objects they reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceId {
    Buffer(BufferHandle),
    Texture(TextureHandle),
    Sampler(SamplerHandle),
    Shader(ShaderHandle),
}

impl ResourceId {
    /// Returns `true` if the wrapped handle is the null handle.
    #[inline]
    #[must_use]
    pub fn is_null(self) -> bool {
        match self {
            Self::Buffer(h) => h.is_null(),
            Self::Texture(h) => h.is_null(),
            Self::Sampler(h) => h.is_null(),
            Self::Shader(h) => h.is_null(),
        }
    }
}

impl From<BufferHandle> for ResourceId {
    fn from(h: BufferHandle) -> Self {
        Self::Buffer(h)
    }
}

impl From<TextureHandle> for ResourceId {
    fn from(h: TextureHandle) -> Self {
        Self::Texture(h)
    }
}

impl From<SamplerHandle> for ResourceId {
    fn from(h: SamplerHandle) -> Self {
        Self::Sampler(h)
    }
}

impl From<ShaderHandle> for ResourceId {
    fn from(h: ShaderHandle) -> Self {
        Self::Shader(h)
    }
}
