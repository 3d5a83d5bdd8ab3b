//! Shared enumerations and sub-resource ranges.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

// ─── Resource Kinds ───────────────────────────────────────────────────────────

/// The kind of resource a shader binding expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum ShaderResourceType {
    #[default]
    Unknown = 0,
    PushConstants,
    Sampler,
    ConstantBuffer,
    Texture,
    /// Combined image sampler.
    TextureAndSampler,
    TexelBuffer,
    StructuredBuffer,
    ByteAddressBuffer,
    TextureRW,
    TexelBufferRW,
    StructuredBufferRW,
    ByteAddressBufferRW,
}

impl ShaderResourceType {
    /// Number of variants, including `Unknown`.
    pub const COUNT: usize = 13;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Unknown,
        Self::PushConstants,
        Self::Sampler,
        Self::ConstantBuffer,
        Self::Texture,
        Self::TextureAndSampler,
        Self::TexelBuffer,
        Self::StructuredBuffer,
        Self::ByteAddressBuffer,
        Self::TextureRW,
        Self::TexelBufferRW,
        Self::StructuredBufferRW,
        Self::ByteAddressBufferRW,
    ];

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Bindings that resolve to a texture view.
    #[must_use]
    pub const fn is_texture(self) -> bool {
        matches!(
            self,
            Self::Texture | Self::TextureAndSampler | Self::TextureRW
        )
    }

    /// Bindings that resolve to a buffer (or a view into one).
    #[must_use]
    pub const fn is_buffer(self) -> bool {
        matches!(
            self,
            Self::ConstantBuffer
                | Self::TexelBuffer
                | Self::StructuredBuffer
                | Self::ByteAddressBuffer
                | Self::TexelBufferRW
                | Self::StructuredBufferRW
                | Self::ByteAddressBufferRW
        )
    }

    /// Buffers viewed through a typed format.
    #[must_use]
    pub const fn is_texel_buffer(self) -> bool {
        matches!(self, Self::TexelBuffer | Self::TexelBufferRW)
    }
}

/// The dimensionality a shader declares for a texture binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShaderTextureType {
    #[default]
    Unknown,
    Texture1D,
    Texture1DArray,
    Texture2D,
    Texture2DArray,
    Texture2DMS,
    Texture2DMSArray,
    Texture3D,
    TextureCube,
    TextureCubeArray,
}

impl ShaderTextureType {
    #[must_use]
    pub const fn is_array(self) -> bool {
        matches!(
            self,
            Self::Texture1DArray
                | Self::Texture2DArray
                | Self::Texture2DMSArray
                | Self::TextureCubeArray
        )
    }

    #[must_use]
    pub const fn is_cube(self) -> bool {
        matches!(self, Self::TextureCube | Self::TextureCubeArray)
    }
}

/// Shape of a texture resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureType {
    #[default]
    Texture2D,
    TextureCube,
    Texture3D,
}

// ─── Flags ────────────────────────────────────────────────────────────────────

bitflags! {
    /// Shader stages a binding is visible to.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStageFlags: u8 {
        const VERTEX   = 1 << 0;
        const HULL     = 1 << 1;
        const DOMAIN   = 1 << 2;
        const GEOMETRY = 1 << 3;
        const PIXEL    = 1 << 4;
        const COMPUTE  = 1 << 5;
    }
}

impl ShaderStageFlags {
    /// All graphics stages.
    pub const GRAPHICS: Self = Self::VERTEX
        .union(Self::HULL)
        .union(Self::DOMAIN)
        .union(Self::GEOMETRY)
        .union(Self::PIXEL);
}

bitflags! {
    /// Ways a buffer may be bound.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsageFlags: u16 {
        const VERTEX_BUFFER      = 1 << 0;
        const INDEX_BUFFER       = 1 << 1;
        const CONSTANT_BUFFER    = 1 << 2;
        const TEXEL_BUFFER       = 1 << 3;
        const STRUCTURED_BUFFER  = 1 << 4;
        const BYTE_ADDRESS       = 1 << 5;
        const SHADER_RESOURCE    = 1 << 6;
        const UNORDERED_ACCESS   = 1 << 7;
        const DRAW_INDIRECT      = 1 << 8;
        const COPY_SRC           = 1 << 9;
        const COPY_DST           = 1 << 10;
    }
}

// ─── Ranges ───────────────────────────────────────────────────────────────────

/// Sub-resource range of a texture view.
///
/// `u32::MAX` counts mean "everything from the base onwards" and are
/// resolved by [`TextureDesc::clamp_range`](crate::descriptors::TextureDesc::clamp_range).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureRange {
    pub base_mip_level: u32,
    pub mip_level_count: u32,
    pub base_array_slice: u32,
    pub array_slice_count: u32,
}

impl TextureRange {
    pub const ALL: u32 = u32::MAX;

    #[must_use]
    pub const fn whole() -> Self {
        Self {
            base_mip_level: 0,
            mip_level_count: Self::ALL,
            base_array_slice: 0,
            array_slice_count: Self::ALL,
        }
    }

    #[must_use]
    pub const fn mip(level: u32) -> Self {
        Self {
            base_mip_level: level,
            mip_level_count: 1,
            base_array_slice: 0,
            array_slice_count: Self::ALL,
        }
    }
}

impl Default for TextureRange {
    fn default() -> Self {
        Self::whole()
    }
}

/// Byte range of a buffer view. `size == u64::MAX` means "to the end".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferRange {
    pub offset: u64,
    pub size: u64,
}

impl BufferRange {
    pub const WHOLE_SIZE: u64 = u64::MAX;

    #[must_use]
    pub const fn whole() -> Self {
        Self {
            offset: 0,
            size: Self::WHOLE_SIZE,
        }
    }

    #[must_use]
    pub const fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }
}

impl Default for BufferRange {
    fn default() -> Self {
        Self::whole()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_type_table_matches_discriminants() {
        for (i, ty) in ShaderResourceType::ALL.iter().enumerate() {
            assert_eq!(ty.index(), i);
        }
    }

    #[test]
    fn array_texture_types() {
        assert!(ShaderTextureType::TextureCubeArray.is_array());
        assert!(ShaderTextureType::Texture2DMSArray.is_array());
        assert!(!ShaderTextureType::TextureCube.is_array());
        assert!(!ShaderTextureType::Texture3D.is_array());
    }

    #[test]
    fn resource_categories_do_not_overlap() {
        for ty in ShaderResourceType::ALL {
            assert!(!(ty.is_texture() && ty.is_buffer()), "{ty:?}");
        }
        assert!(ShaderResourceType::TexelBufferRW.is_texel_buffer());
        assert!(!ShaderResourceType::Sampler.is_buffer());
    }
}
