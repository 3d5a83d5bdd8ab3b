//! Hashable pipeline descriptors.
//!
//! `wgpu` state types (`ColorTargetState`, `DepthStencilState`, …) do not
//! implement `Hash` / `Eq`. The descriptors here mirror the fields relevant
//! for pipeline identity, store floats as bit patterns and derive the trait
//! impls, so a full [`GraphicsPipelineDesc`] or [`ComputePipelineDesc`] can be
//! used directly as a cache key.
//!
//! Hashing a full graphics descriptor walks every mirror type. Callers that
//! look the same descriptor up every frame wrap it in a [`HashedPipelineDesc`]
//! once, so cache lookups reuse the stored hash.

use std::hash::{Hash, Hasher};
use std::ops::Deref;

use smallvec::SmallVec;

use crate::descriptors::fx_hash_key;
use crate::handles::ShaderHandle;

/// Maximum number of simultaneously bound colour targets.
pub const MAX_RENDER_TARGETS: usize = 8;

// ─── Hashable Mirror Types ────────────────────────────────────────────────────

/// Hashable mirror of `wgpu::BlendComponent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendComponentDesc {
    pub src_factor: wgpu::BlendFactor,
    pub dst_factor: wgpu::BlendFactor,
    pub operation: wgpu::BlendOperation,
}

impl From<wgpu::BlendComponent> for BlendComponentDesc {
    fn from(b: wgpu::BlendComponent) -> Self {
        Self {
            src_factor: b.src_factor,
            dst_factor: b.dst_factor,
            operation: b.operation,
        }
    }
}

impl From<BlendComponentDesc> for wgpu::BlendComponent {
    fn from(b: BlendComponentDesc) -> Self {
        Self {
            src_factor: b.src_factor,
            dst_factor: b.dst_factor,
            operation: b.operation,
        }
    }
}

/// Blend state of a single render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetBlendDesc {
    /// `None` disables blending for the target.
    pub blend: Option<(BlendComponentDesc, BlendComponentDesc)>,
    pub write_mask: u32,
}

impl Default for TargetBlendDesc {
    fn default() -> Self {
        Self {
            blend: None,
            write_mask: wgpu::ColorWrites::ALL.bits(),
        }
    }
}

impl From<wgpu::ColorTargetState> for TargetBlendDesc {
    fn from(c: wgpu::ColorTargetState) -> Self {
        Self {
            blend: c.blend.map(|b| (b.color.into(), b.alpha.into())),
            write_mask: c.write_mask.bits(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BlendDesc {
    pub alpha_to_coverage: bool,
    /// When `false`, every target uses `targets[0]`.
    pub independent_blend: bool,
    pub targets: SmallVec<[TargetBlendDesc; MAX_RENDER_TARGETS]>,
}

impl BlendDesc {
    /// Blend state for target `index`, honouring `independent_blend`.
    #[must_use]
    pub fn target(&self, index: usize) -> TargetBlendDesc {
        let index = if self.independent_blend { index } else { 0 };
        self.targets.get(index).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterizerDesc {
    pub cull_mode: Option<wgpu::Face>,
    pub front_face: wgpu::FrontFace,
    pub polygon_mode: wgpu::PolygonMode,
    pub depth_bias: i32,
    pub depth_bias_slope_scale_bits: u32,
    pub depth_bias_clamp_bits: u32,
    pub conservative: bool,
}

impl Default for RasterizerDesc {
    fn default() -> Self {
        Self {
            cull_mode: Some(wgpu::Face::Back),
            front_face: wgpu::FrontFace::Ccw,
            polygon_mode: wgpu::PolygonMode::Fill,
            depth_bias: 0,
            depth_bias_slope_scale_bits: 0.0f32.to_bits(),
            depth_bias_clamp_bits: 0.0f32.to_bits(),
            conservative: false,
        }
    }
}

/// Hashable mirror of `wgpu::StencilFaceState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFaceDesc {
    pub compare: wgpu::CompareFunction,
    pub fail_op: wgpu::StencilOperation,
    pub depth_fail_op: wgpu::StencilOperation,
    pub pass_op: wgpu::StencilOperation,
}

impl Default for StencilFaceDesc {
    fn default() -> Self {
        Self::from(wgpu::StencilFaceState::IGNORE)
    }
}

impl From<wgpu::StencilFaceState> for StencilFaceDesc {
    fn from(s: wgpu::StencilFaceState) -> Self {
        Self {
            compare: s.compare,
            fail_op: s.fail_op,
            depth_fail_op: s.depth_fail_op,
            pass_op: s.pass_op,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilDesc {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: wgpu::CompareFunction,
    pub stencil_test: bool,
    pub stencil_read_mask: u32,
    pub stencil_write_mask: u32,
    pub front: StencilFaceDesc,
    pub back: StencilFaceDesc,
}

impl Default for DepthStencilDesc {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil_test: false,
            stencil_read_mask: 0xff,
            stencil_write_mask: 0xff,
            front: StencilFaceDesc::default(),
            back: StencilFaceDesc::default(),
        }
    }
}

/// One vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttributeDesc {
    pub format: wgpu::VertexFormat,
    pub offset: u64,
    pub shader_location: u32,
    pub buffer_slot: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexLayoutDesc {
    pub attributes: SmallVec<[VertexAttributeDesc; 8]>,
    /// Stride of each vertex buffer slot.
    pub strides: SmallVec<[u64; 2]>,
}

/// Formats of the attachments a pipeline renders into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderTargetFormats {
    pub color: SmallVec<[wgpu::TextureFormat; MAX_RENDER_TARGETS]>,
    pub depth: Option<wgpu::TextureFormat>,
    pub sample_count: u32,
}

impl Default for RenderTargetFormats {
    fn default() -> Self {
        Self {
            color: SmallVec::new(),
            depth: None,
            sample_count: 1,
        }
    }
}

// ─── Pipeline Descriptors ─────────────────────────────────────────────────────

/// Everything that identifies a graphics pipeline except bound resources and
/// dynamic state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphicsPipelineDesc {
    pub shader: ShaderHandle,
    pub vertex_layout: VertexLayoutDesc,
    pub rasterizer: RasterizerDesc,
    pub blend: BlendDesc,
    pub depth_stencil: DepthStencilDesc,
    pub topology: wgpu::PrimitiveTopology,
    pub targets: RenderTargetFormats,
}

impl GraphicsPipelineDesc {
    #[must_use]
    pub fn new(shader: ShaderHandle) -> Self {
        Self {
            shader,
            vertex_layout: VertexLayoutDesc::default(),
            rasterizer: RasterizerDesc::default(),
            blend: BlendDesc::default(),
            depth_stencil: DepthStencilDesc::default(),
            topology: wgpu::PrimitiveTopology::TriangleList,
            targets: RenderTargetFormats::default(),
        }
    }

    #[must_use]
    pub fn calculate_hash(&self) -> u64 {
        fx_hash_key(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputePipelineDesc {
    pub shader: ShaderHandle,
}

impl ComputePipelineDesc {
    #[must_use]
    pub fn new(shader: ShaderHandle) -> Self {
        Self { shader }
    }

    #[must_use]
    pub fn calculate_hash(&self) -> u64 {
        fx_hash_key(self)
    }
}

// ─── Hashed Descriptors ───────────────────────────────────────────────────────

/// A pipeline descriptor frozen together with its content hash.
///
/// There is no mutable access to the inner descriptor, so the hash can't go
/// stale. Use [`into_inner`](Self::into_inner) to edit and re-wrap.
#[derive(Debug, Clone)]
pub struct HashedPipelineDesc<D> {
    desc: D,
    hash: u64,
}

pub type HashedGraphicsPipelineDesc = HashedPipelineDesc<GraphicsPipelineDesc>;
pub type HashedComputePipelineDesc = HashedPipelineDesc<ComputePipelineDesc>;

impl<D: Hash> HashedPipelineDesc<D> {
    #[must_use]
    pub fn new(desc: D) -> Self {
        let hash = fx_hash_key(&desc);
        Self { desc, hash }
    }
}

impl<D> HashedPipelineDesc<D> {
    /// The content hash computed at construction.
    #[inline]
    #[must_use]
    pub fn hash_value(&self) -> u64 {
        self.hash
    }

    #[inline]
    #[must_use]
    pub fn desc(&self) -> &D {
        &self.desc
    }

    #[must_use]
    pub fn into_inner(self) -> D {
        self.desc
    }
}

impl<D: Hash> From<D> for HashedPipelineDesc<D> {
    fn from(desc: D) -> Self {
        Self::new(desc)
    }
}

impl<D> Deref for HashedPipelineDesc<D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.desc
    }
}

impl<D: PartialEq> PartialEq for HashedPipelineDesc<D> {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.desc == other.desc
    }
}

impl<D: Eq> Eq for HashedPipelineDesc<D> {}

impl<D> Hash for HashedPipelineDesc<D> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn equal_descriptors_hash_equal() {
        let mut shaders: SlotMap<ShaderHandle, ()> = SlotMap::with_key();
        let shader = shaders.insert(());

        let mut a = GraphicsPipelineDesc::new(shader);
        a.targets.color.push(wgpu::TextureFormat::Rgba16Float);
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(a.calculate_hash(), b.calculate_hash());

        let mut c = a.clone();
        c.rasterizer.cull_mode = None;
        assert_ne!(a, c);
        assert_ne!(a.calculate_hash(), c.calculate_hash());
    }

    #[test]
    fn hashed_desc_keeps_the_content_hash() {
        let mut shaders: SlotMap<ShaderHandle, ()> = SlotMap::with_key();
        let shader = shaders.insert(());

        let mut desc = GraphicsPipelineDesc::new(shader);
        desc.vertex_layout.strides.push(32);
        let hashed = HashedGraphicsPipelineDesc::new(desc.clone());
        assert_eq!(hashed.hash_value(), desc.calculate_hash());
        assert_eq!(hashed.shader, shader);

        let mut edited = hashed.clone().into_inner();
        edited.topology = wgpu::PrimitiveTopology::LineList;
        let rehashed = HashedPipelineDesc::new(edited);
        assert_ne!(rehashed, hashed);
        assert_ne!(rehashed.hash_value(), hashed.hash_value());
    }

    #[test]
    fn shared_blend_state_uses_first_target() {
        let mut blend = BlendDesc::default();
        blend.targets.push(TargetBlendDesc::from(wgpu::ColorTargetState {
            format: wgpu::TextureFormat::Rgba8Unorm,
            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            write_mask: wgpu::ColorWrites::ALL,
        }));

        assert!(blend.target(3).blend.is_some());
        blend.independent_blend = true;
        assert!(blend.target(3).blend.is_none());
    }
}
