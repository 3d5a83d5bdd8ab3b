//! Creation descriptions for device objects and bind groups.
//!
//! Every description is a plain value type. The ones used as cache keys
//! (`BindGroupLayoutDesc`, `BindGroupDesc`) derive `Eq + Hash` and expose a
//! `calculate_hash()` that produces a stable 64-bit content hash.
//!
//! # Design
//!
//! A bind group is described by one [`BindGroupItem`] per layout binding, in
//! the layout's order. Items carry a small tag ([`BindGroupItemKind`]) plus
//! meta flags ([`BindGroupItemFlags`]) that record whether a fallback
//! resource was substituted for an empty slot.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use bitflags::bitflags;
use rustc_hash::{FxHashSet, FxHasher};
use slotmap::Key;
use smallvec::SmallVec;

use crate::handles::{
    BindGroupLayoutHandle, BufferHandle, ResourceId, SamplerHandle, TextureHandle,
};
use crate::name::HashedName;
use crate::types::{
    BufferRange, BufferUsageFlags, ShaderResourceType, ShaderStageFlags, ShaderTextureType,
    TextureRange, TextureType,
};
use crate::{GalError, Result};

/// Hashes any `Hash` value with `FxHasher`.
#[inline]
#[must_use]
pub fn fx_hash_key<K: Hash + ?Sized>(key: &K) -> u64 {
    let mut hasher = FxHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}

// ─── Buffers & Textures ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferDesc {
    pub total_size: u64,
    /// Element size for structured and texel buffers. Zero for raw buffers.
    pub struct_size: u32,
    pub usage: BufferUsageFlags,
    /// Default view format of texel buffers.
    pub texel_format: Option<wgpu::TextureFormat>,
}

impl BufferDesc {
    #[must_use]
    pub fn constant(size: u64) -> Self {
        Self {
            total_size: size,
            struct_size: 0,
            usage: BufferUsageFlags::CONSTANT_BUFFER,
            texel_format: None,
        }
    }

    #[must_use]
    pub fn structured(struct_size: u32, element_count: u32, read_write: bool) -> Self {
        let mut usage = BufferUsageFlags::STRUCTURED_BUFFER | BufferUsageFlags::SHADER_RESOURCE;
        usage.set(BufferUsageFlags::UNORDERED_ACCESS, read_write);
        Self {
            total_size: u64::from(struct_size) * u64::from(element_count),
            struct_size,
            usage,
            texel_format: None,
        }
    }

    #[must_use]
    pub fn texel(size: u64, format: wgpu::TextureFormat, read_write: bool) -> Self {
        let mut usage = BufferUsageFlags::TEXEL_BUFFER | BufferUsageFlags::SHADER_RESOURCE;
        usage.set(BufferUsageFlags::UNORDERED_ACCESS, read_write);
        Self {
            total_size: size,
            struct_size: 0,
            usage,
            texel_format: Some(format),
        }
    }

    #[must_use]
    pub fn byte_address(size: u64, read_write: bool) -> Self {
        let mut usage = BufferUsageFlags::BYTE_ADDRESS | BufferUsageFlags::SHADER_RESOURCE;
        usage.set(BufferUsageFlags::UNORDERED_ACCESS, read_write);
        Self {
            total_size: size,
            struct_size: 0,
            usage,
            texel_format: None,
        }
    }

    /// Resolves the "to the end" sentinel and clamps the range to the buffer.
    #[must_use]
    pub fn clamp_range(&self, mut range: BufferRange) -> BufferRange {
        let offset = range.offset.min(self.total_size);
        debug_assert!(
            range.offset <= self.total_size,
            "buffer range offset {} exceeds buffer size {}",
            range.offset,
            self.total_size
        );
        let available = self.total_size - offset;
        range.offset = offset;
        range.size = if range.size == BufferRange::WHOLE_SIZE {
            available
        } else {
            debug_assert!(
                range.size <= available,
                "buffer range {}+{} exceeds buffer size {}",
                offset,
                range.size,
                self.total_size
            );
            range.size.min(available)
        };
        range
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_level_count: u32,
    /// Number of array layers. For cube textures, the number of cubes.
    pub array_size: u32,
    pub sample_count: u32,
    pub format: wgpu::TextureFormat,
    pub texture_type: TextureType,
    pub allow_shader_resource_view: bool,
    pub allow_unordered_access_view: bool,
    pub is_render_target: bool,
}

impl TextureDesc {
    #[must_use]
    pub fn new_2d(width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        Self {
            width,
            height,
            depth: 1,
            mip_level_count: 1,
            array_size: 1,
            sample_count: 1,
            format,
            texture_type: TextureType::Texture2D,
            allow_shader_resource_view: true,
            allow_unordered_access_view: false,
            is_render_target: false,
        }
    }

    #[must_use]
    pub fn new_cube(size: u32, format: wgpu::TextureFormat) -> Self {
        Self {
            texture_type: TextureType::TextureCube,
            ..Self::new_2d(size, size, format)
        }
    }

    #[must_use]
    pub fn new_3d(width: u32, height: u32, depth: u32, format: wgpu::TextureFormat) -> Self {
        Self {
            depth,
            texture_type: TextureType::Texture3D,
            ..Self::new_2d(width, height, format)
        }
    }

    /// Total number of addressable array slices (6 per cube).
    #[must_use]
    pub fn slice_count(&self) -> u32 {
        match self.texture_type {
            TextureType::TextureCube => self.array_size * 6,
            _ => self.array_size,
        }
    }

    /// Resolves the "all" sentinels of `range` against this texture.
    #[must_use]
    pub fn clamp_range(&self, mut range: TextureRange) -> TextureRange {
        let slices = self.slice_count();
        let mips = self.mip_level_count;

        if range.array_slice_count == TextureRange::ALL {
            range.array_slice_count = slices.saturating_sub(range.base_array_slice);
        }
        if range.mip_level_count == TextureRange::ALL {
            range.mip_level_count = mips.saturating_sub(range.base_mip_level);
        }
        debug_assert!(
            range.base_array_slice + range.array_slice_count <= slices,
            "invalid texture range: base slice {} + {} slices exceeds {}",
            range.base_array_slice,
            range.array_slice_count,
            slices
        );
        debug_assert!(
            range.base_mip_level + range.mip_level_count <= mips,
            "invalid texture range: base mip {} + {} mips exceeds {}",
            range.base_mip_level,
            range.mip_level_count,
            mips
        );
        range
    }
}

/// Sampler state. Floats are stored as bit patterns so the type can be hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    pub mip_filter: wgpu::FilterMode,
    pub address_u: wgpu::AddressMode,
    pub address_v: wgpu::AddressMode,
    pub address_w: wgpu::AddressMode,
    pub lod_min_clamp_bits: u32,
    pub lod_max_clamp_bits: u32,
    pub max_anisotropy: u16,
    pub compare: Option<wgpu::CompareFunction>,
}

impl SamplerDesc {
    #[must_use]
    pub fn new(filter: wgpu::FilterMode, address: wgpu::AddressMode) -> Self {
        Self {
            mag_filter: filter,
            min_filter: filter,
            mip_filter: filter,
            address_u: address,
            address_v: address,
            address_w: address,
            lod_min_clamp_bits: 0.0f32.to_bits(),
            lod_max_clamp_bits: 32.0f32.to_bits(),
            max_anisotropy: 1,
            compare: None,
        }
    }

    #[must_use]
    pub fn lod_min_clamp(&self) -> f32 {
        f32::from_bits(self.lod_min_clamp_bits)
    }

    #[must_use]
    pub fn lod_max_clamp(&self) -> f32 {
        f32::from_bits(self.lod_max_clamp_bits)
    }
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self::new(wgpu::FilterMode::Linear, wgpu::AddressMode::Repeat)
    }
}

// ─── Shaders & Layouts ────────────────────────────────────────────────────────

/// One member of a constant buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstantBufferMember {
    pub name: HashedName,
    pub offset: u32,
    pub size: u32,
    pub array_elements: u32,
}

/// Reflected layout of a constant buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ConstantBufferLayout {
    pub total_size: u32,
    pub members: Vec<ConstantBufferMember>,
}

/// One slot of a bind group layout, as reflected from a shader.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderResourceBinding {
    pub name: HashedName,
    pub resource_type: ShaderResourceType,
    pub texture_type: ShaderTextureType,
    pub stages: ShaderStageFlags,
    pub set: u32,
    pub slot: u32,
    pub array_size: u32,
    pub layout: Option<Arc<ConstantBufferLayout>>,
}

impl ShaderResourceBinding {
    #[must_use]
    pub fn new(name: &str, resource_type: ShaderResourceType, set: u32, slot: u32) -> Self {
        Self {
            name: HashedName::new(name),
            resource_type,
            texture_type: ShaderTextureType::Unknown,
            stages: ShaderStageFlags::GRAPHICS,
            set,
            slot,
            array_size: 1,
            layout: None,
        }
    }

    #[must_use]
    pub fn with_texture_type(mut self, texture_type: ShaderTextureType) -> Self {
        self.texture_type = texture_type;
        self
    }

    #[must_use]
    pub fn with_stages(mut self, stages: ShaderStageFlags) -> Self {
        self.stages = stages;
        self
    }

    #[must_use]
    pub fn with_array_size(mut self, array_size: u32) -> Self {
        self.array_size = array_size;
        self
    }

    #[must_use]
    pub fn with_layout(mut self, layout: Arc<ConstantBufferLayout>) -> Self {
        self.layout = Some(layout);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ShaderDesc {
    pub name: String,
    pub stages: ShaderStageFlags,
    /// Bind group layouts the shader was reflected into, indexed by set.
    pub bind_group_layouts: SmallVec<[BindGroupLayoutHandle; 4]>,
}

/// Ordered slot declarations of a single bind group (set).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BindGroupLayoutDesc {
    /// Sorted by slot. All bindings share one set index.
    pub bindings: Vec<ShaderResourceBinding>,
    /// Sampler bindings baked into the layout; they receive no bind group item.
    pub immutable_samplers: Vec<ShaderResourceBinding>,
}

impl BindGroupLayoutDesc {
    #[must_use]
    pub fn new(bindings: Vec<ShaderResourceBinding>) -> Self {
        Self {
            bindings,
            immutable_samplers: Vec::new(),
        }
    }

    /// Set index shared by all bindings, if there are any.
    #[must_use]
    pub fn set_index(&self) -> Option<u32> {
        self.bindings
            .first()
            .or_else(|| self.immutable_samplers.first())
            .map(|b| b.set)
    }

    /// Checks the structural invariants of a layout.
    ///
    /// Bindings must share a single set index, be sorted by slot with no
    /// duplicate slot, and must not use `Unknown` or `PushConstants`.
    pub fn validate(&self) -> Result<()> {
        let Some(set) = self.set_index() else {
            return Ok(());
        };

        let mut slots = FxHashSet::default();
        let mut previous: Option<u32> = None;
        for binding in self.bindings.iter().chain(&self.immutable_samplers) {
            if binding.set != set {
                return Err(GalError::LayoutViolation(format!(
                    "binding '{}' uses set {} but the layout is for set {set}",
                    binding.name, binding.set
                )));
            }
            if !slots.insert(binding.slot) {
                return Err(GalError::LayoutViolation(format!(
                    "slot {} of set {set} is declared twice ('{}')",
                    binding.slot, binding.name
                )));
            }
            if matches!(
                binding.resource_type,
                ShaderResourceType::Unknown | ShaderResourceType::PushConstants
            ) {
                return Err(GalError::LayoutViolation(format!(
                    "binding '{}' has resource type {:?}, which cannot be part of a bind group",
                    binding.name, binding.resource_type
                )));
            }
        }

        for binding in &self.bindings {
            if previous.is_some_and(|p| binding.slot < p) {
                return Err(GalError::LayoutViolation(format!(
                    "bindings of set {set} are not sorted by slot ('{}' at slot {})",
                    binding.name, binding.slot
                )));
            }
            previous = Some(binding.slot);
        }
        Ok(())
    }

    #[must_use]
    pub fn calculate_hash(&self) -> u64 {
        fx_hash_key(self)
    }
}

// ─── Bind Groups ──────────────────────────────────────────────────────────────

bitflags! {
    /// Meta information attached to a [`BindGroupItem`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct BindGroupItemFlags: u8 {
        /// The slot was empty and got a fallback resource.
        const FALLBACK          = 1 << 0;
        /// The bound resource is itself a stand-in (e.g. still streaming in).
        const FALLBACK_RESOURCE = 1 << 1;
        /// The bound resource is only partially loaded.
        const PARTIALLY_LOADED  = 1 << 2;
    }
}

/// Payload of a bind group item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindGroupItemKind {
    Sampler {
        sampler: SamplerHandle,
    },
    Texture {
        texture: TextureHandle,
        /// Only set for `TextureAndSampler` slots.
        sampler: SamplerHandle,
        range: TextureRange,
        view_format: Option<wgpu::TextureFormat>,
    },
    Buffer {
        buffer: BufferHandle,
        range: BufferRange,
        texel_format: Option<wgpu::TextureFormat>,
    },
}

/// The resource bound to one layout slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupItem {
    pub kind: BindGroupItemKind,
    pub flags: BindGroupItemFlags,
}

impl BindGroupItem {
    #[must_use]
    pub fn sampler(sampler: SamplerHandle) -> Self {
        Self {
            kind: BindGroupItemKind::Sampler { sampler },
            flags: BindGroupItemFlags::empty(),
        }
    }

    #[must_use]
    pub fn texture(
        texture: TextureHandle,
        range: TextureRange,
        view_format: Option<wgpu::TextureFormat>,
    ) -> Self {
        Self {
            kind: BindGroupItemKind::Texture {
                texture,
                sampler: SamplerHandle::null(),
                range,
                view_format,
            },
            flags: BindGroupItemFlags::empty(),
        }
    }

    #[must_use]
    pub fn buffer(
        buffer: BufferHandle,
        range: BufferRange,
        texel_format: Option<wgpu::TextureFormat>,
    ) -> Self {
        Self {
            kind: BindGroupItemKind::Buffer {
                buffer,
                range,
                texel_format,
            },
            flags: BindGroupItemFlags::empty(),
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: BindGroupItemFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// `true` if the slot was filled with a fallback resource.
    #[inline]
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.flags.contains(BindGroupItemFlags::FALLBACK)
    }

    /// Every non-null device object this item references.
    pub fn resources(&self) -> impl Iterator<Item = ResourceId> {
        let ids: [Option<ResourceId>; 2] = match self.kind {
            BindGroupItemKind::Sampler { sampler } => [Some(sampler.into()), None],
            BindGroupItemKind::Texture {
                texture, sampler, ..
            } => [Some(texture.into()), Some(sampler.into())],
            BindGroupItemKind::Buffer { buffer, .. } => [Some(buffer.into()), None],
        };
        ids.into_iter().flatten().filter(|id| !id.is_null())
    }
}

/// A fully resolved bind group: one item per layout binding, in layout order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BindGroupDesc {
    pub layout: BindGroupLayoutHandle,
    pub items: Vec<BindGroupItem>,
}

impl BindGroupDesc {
    #[must_use]
    pub fn calculate_hash(&self) -> u64 {
        fx_hash_key(self)
    }

    /// The distinct device objects referenced by the items, in first-use order.
    #[must_use]
    pub fn referenced_resources(&self) -> SmallVec<[ResourceId; 8]> {
        let mut out: SmallVec<[ResourceId; 8]> = SmallVec::new();
        for id in self.items.iter().flat_map(BindGroupItem::resources) {
            if !out.contains(&id) {
                out.push(id);
            }
        }
        out
    }

    /// Checks the items against the layout they were built for.
    ///
    /// Verifies the item count, that every item's payload matches the
    /// binding's resource type and that constant buffers are bound whole.
    pub fn validate(
        &self,
        layout: &BindGroupLayoutDesc,
        buffer_size: impl Fn(BufferHandle) -> Option<u64>,
    ) -> Result<()> {
        if layout.bindings.len() != self.items.len() {
            return Err(GalError::LayoutViolation(format!(
                "layout has {} bindings but the bind group has {} items",
                layout.bindings.len(),
                self.items.len()
            )));
        }

        for (binding, item) in layout.bindings.iter().zip(&self.items) {
            let ty = binding.resource_type;
            let matches = match item.kind {
                BindGroupItemKind::Sampler { sampler } => {
                    ty == ShaderResourceType::Sampler && !sampler.is_null()
                }
                BindGroupItemKind::Texture {
                    texture, sampler, ..
                } => {
                    ty.is_texture()
                        && !texture.is_null()
                        && (ty != ShaderResourceType::TextureAndSampler || !sampler.is_null())
                }
                BindGroupItemKind::Buffer {
                    buffer,
                    range,
                    texel_format,
                } => {
                    if !ty.is_buffer() || buffer.is_null() {
                        false
                    } else if ty == ShaderResourceType::ConstantBuffer {
                        texel_format.is_none()
                            && range.offset == 0
                            && buffer_size(buffer).is_some_and(|size| size == range.size)
                    } else {
                        true
                    }
                }
            };
            if !matches {
                return Err(GalError::LayoutViolation(format!(
                    "item for '{}' does not satisfy a {ty:?} binding: {:?}",
                    binding.name, item.kind
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(bindings: Vec<ShaderResourceBinding>) -> BindGroupLayoutDesc {
        BindGroupLayoutDesc::new(bindings)
    }

    #[test]
    fn validate_accepts_sorted_unique_layout() {
        let desc = layout(vec![
            ShaderResourceBinding::new("Albedo", ShaderResourceType::Texture, 2, 0)
                .with_texture_type(ShaderTextureType::Texture2D),
            ShaderResourceBinding::new("AlbedoSampler", ShaderResourceType::Sampler, 2, 1),
            ShaderResourceBinding::new("Material", ShaderResourceType::ConstantBuffer, 2, 4),
        ]);
        assert!(desc.validate().is_ok());
        assert_eq!(desc.set_index(), Some(2));
    }

    #[test]
    fn validate_rejects_duplicate_slot() {
        let desc = layout(vec![
            ShaderResourceBinding::new("A", ShaderResourceType::Texture, 0, 1),
            ShaderResourceBinding::new("B", ShaderResourceType::Sampler, 0, 1),
        ]);
        assert!(matches!(desc.validate(), Err(GalError::LayoutViolation(_))));
    }

    #[test]
    fn validate_rejects_mixed_sets_and_push_constants() {
        let mixed = layout(vec![
            ShaderResourceBinding::new("A", ShaderResourceType::Texture, 0, 0),
            ShaderResourceBinding::new("B", ShaderResourceType::Sampler, 1, 1),
        ]);
        assert!(mixed.validate().is_err());

        let push = layout(vec![ShaderResourceBinding::new(
            "Push",
            ShaderResourceType::PushConstants,
            0,
            0,
        )]);
        assert!(push.validate().is_err());
    }

    #[test]
    fn validate_rejects_unsorted_slots() {
        let desc = layout(vec![
            ShaderResourceBinding::new("A", ShaderResourceType::Texture, 0, 3),
            ShaderResourceBinding::new("B", ShaderResourceType::Sampler, 0, 1),
        ]);
        assert!(desc.validate().is_err());
    }

    #[test]
    fn layout_hash_depends_on_content() {
        let a = layout(vec![ShaderResourceBinding::new(
            "A",
            ShaderResourceType::Texture,
            0,
            0,
        )]);
        let mut b = a.clone();
        assert_eq!(a.calculate_hash(), b.calculate_hash());
        b.bindings[0].stages = ShaderStageFlags::COMPUTE;
        assert_ne!(a.calculate_hash(), b.calculate_hash());
    }

    #[test]
    fn texture_clamp_range_resolves_sentinels() {
        let mut desc = TextureDesc::new_cube(16, wgpu::TextureFormat::Rgba8Unorm);
        desc.mip_level_count = 5;
        let range = desc.clamp_range(TextureRange::whole());
        assert_eq!(range.array_slice_count, 6);
        assert_eq!(range.mip_level_count, 5);

        let range = desc.clamp_range(TextureRange::mip(2));
        assert_eq!(range.mip_level_count, 1);
        assert_eq!(range.base_mip_level, 2);
    }

    #[test]
    fn buffer_clamp_range_resolves_whole_size() {
        let desc = BufferDesc::structured(16, 8, false);
        assert_eq!(
            desc.clamp_range(BufferRange::whole()),
            BufferRange::new(0, 128)
        );
        assert_eq!(
            desc.clamp_range(BufferRange::new(32, BufferRange::WHOLE_SIZE)),
            BufferRange::new(32, 96)
        );
    }

    #[test]
    fn referenced_resources_are_distinct_and_skip_null() {
        let mut textures: slotmap::SlotMap<TextureHandle, ()> = slotmap::SlotMap::with_key();
        let mut samplers: slotmap::SlotMap<SamplerHandle, ()> = slotmap::SlotMap::with_key();
        let tex = textures.insert(());
        let smp = samplers.insert(());

        let desc = BindGroupDesc {
            layout: BindGroupLayoutHandle::null(),
            items: vec![
                BindGroupItem::texture(tex, TextureRange::whole(), None),
                BindGroupItem::sampler(smp),
                BindGroupItem::sampler(smp),
            ],
        };
        let ids = desc.referenced_resources();
        assert_eq!(ids.as_slice(), &[ResourceId::Texture(tex), ResourceId::Sampler(smp)]);
    }

    #[test]
    fn bind_group_validate_checks_types() {
        let mut samplers: slotmap::SlotMap<SamplerHandle, ()> = slotmap::SlotMap::with_key();
        let smp = samplers.insert(());
        let layout = layout(vec![ShaderResourceBinding::new(
            "S",
            ShaderResourceType::Sampler,
            0,
            0,
        )]);

        let ok = BindGroupDesc {
            layout: BindGroupLayoutHandle::null(),
            items: vec![BindGroupItem::sampler(smp)],
        };
        assert!(ok.validate(&layout, |_| None).is_ok());

        let wrong = BindGroupDesc {
            layout: BindGroupLayoutHandle::null(),
            items: vec![BindGroupItem::buffer(
                BufferHandle::null(),
                BufferRange::whole(),
                None,
            )],
        };
        assert!(wrong.validate(&layout, |_| None).is_err());

        let short = BindGroupDesc::default();
        assert!(short.validate(&layout, |_| None).is_err());
    }
}
