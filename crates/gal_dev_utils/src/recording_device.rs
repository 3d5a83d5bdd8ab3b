//! In-memory device that records every call.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use gal_core::{
    BindGroupDesc, BindGroupHandle, BindGroupLayoutDesc, BindGroupLayoutHandle, BufferDesc,
    BufferHandle, ComputePipelineDesc, ComputePipelineHandle, DescriptorBackend,
    DescriptorPoolHandle, DescriptorPoolSize, DescriptorSetHandle, Device, DeviceCapabilities,
    GalError, GraphicsPipelineDesc, GraphicsPipelineHandle, HandleKind, Result, SamplerDesc,
    SamplerHandle, ShaderDesc, ShaderHandle, TextureDesc, TextureHandle,
};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::storage::ObjectStorage;

const KIND_COUNT: usize = 10;

const fn kind_index(kind: HandleKind) -> usize {
    match kind {
        HandleKind::Buffer => 0,
        HandleKind::Texture => 1,
        HandleKind::Sampler => 2,
        HandleKind::Shader => 3,
        HandleKind::BindGroupLayout => 4,
        HandleKind::BindGroup => 5,
        HandleKind::GraphicsPipeline => 6,
        HandleKind::ComputePipeline => 7,
        HandleKind::DescriptorPool => 8,
        HandleKind::DescriptorSet => 9,
    }
}

/// Create / destroy counters for one object kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallCounts {
    pub created: usize,
    pub destroyed: usize,
    pub failed: usize,
}

impl CallCounts {
    #[must_use]
    pub fn live(&self) -> usize {
        self.created - self.destroyed
    }
}

#[derive(Default)]
struct Counter {
    created: AtomicUsize,
    destroyed: AtomicUsize,
    failed: AtomicUsize,
}

struct PoolRecord {
    max_sets: u32,
    sizes: Vec<DescriptorPoolSize>,
    sets: Mutex<FxHashSet<DescriptorSetHandle>>,
}

struct SetRecord {
    pool: DescriptorPoolHandle,
    _layout: BindGroupLayoutHandle,
}

/// A [`Device`] + [`DescriptorBackend`] backed by slot maps.
///
/// Objects are never touched by a GPU; the device only stores their
/// descriptions, so tests can check what the binding core created and
/// destroyed. Creation of any kind can be made to fail, and pipeline
/// creation can be slowed down to widen race windows.
pub struct RecordingDevice {
    capabilities: DeviceCapabilities,

    buffers: ObjectStorage<BufferHandle, BufferDesc>,
    textures: ObjectStorage<TextureHandle, TextureDesc>,
    samplers: ObjectStorage<SamplerHandle, SamplerDesc>,
    shaders: ObjectStorage<ShaderHandle, ShaderDesc>,
    layouts: ObjectStorage<BindGroupLayoutHandle, Arc<BindGroupLayoutDesc>>,
    bind_groups: ObjectStorage<BindGroupHandle, BindGroupDesc>,
    graphics_pipelines: ObjectStorage<GraphicsPipelineHandle, GraphicsPipelineDesc>,
    compute_pipelines: ObjectStorage<ComputePipelineHandle, ComputePipelineDesc>,
    descriptor_pools: ObjectStorage<DescriptorPoolHandle, PoolRecord>,
    descriptor_sets: ObjectStorage<DescriptorSetHandle, SetRecord>,

    counters: [Counter; KIND_COUNT],
    failing: Mutex<FxHashSet<HandleKind>>,
    failing_shaders: Mutex<FxHashSet<ShaderHandle>>,
    pipeline_delay: Mutex<Duration>,
    pipeline_creates_by_hash: Mutex<FxHashMap<u64, usize>>,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingDevice {
    /// A device that supports MSAA 4x and immutable samplers.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capabilities(DeviceCapabilities {
            msaa4x: true,
            immutable_samplers: true,
        })
    }

    #[must_use]
    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            buffers: ObjectStorage::new(),
            textures: ObjectStorage::new(),
            samplers: ObjectStorage::new(),
            shaders: ObjectStorage::new(),
            layouts: ObjectStorage::new(),
            bind_groups: ObjectStorage::new(),
            graphics_pipelines: ObjectStorage::new(),
            compute_pipelines: ObjectStorage::new(),
            descriptor_pools: ObjectStorage::new(),
            descriptor_sets: ObjectStorage::new(),
            counters: Default::default(),
            failing: Mutex::new(FxHashSet::default()),
            failing_shaders: Mutex::new(FxHashSet::default()),
            pipeline_delay: Mutex::new(Duration::ZERO),
            pipeline_creates_by_hash: Mutex::new(FxHashMap::default()),
        }
    }

    // ─── Test Controls ───────────────────────────────────────────────────────

    /// Makes every creation of `kind` fail until reset.
    pub fn set_failing(&self, kind: HandleKind, failing: bool) {
        let mut set = self.failing.lock();
        if failing {
            set.insert(kind);
        } else {
            set.remove(&kind);
        }
    }

    /// Makes pipeline creation fail for pipelines built from `shader`.
    pub fn set_shader_broken(&self, shader: ShaderHandle, broken: bool) {
        let mut set = self.failing_shaders.lock();
        if broken {
            set.insert(shader);
        } else {
            set.remove(&shader);
        }
    }

    /// Sleeps this long inside every pipeline creation call.
    pub fn set_pipeline_creation_delay(&self, delay: Duration) {
        *self.pipeline_delay.lock() = delay;
    }

    // ─── Inspection ──────────────────────────────────────────────────────────

    #[must_use]
    pub fn counts(&self, kind: HandleKind) -> CallCounts {
        let c = &self.counters[kind_index(kind)];
        CallCounts {
            created: c.created.load(Ordering::SeqCst),
            destroyed: c.destroyed.load(Ordering::SeqCst),
            failed: c.failed.load(Ordering::SeqCst),
        }
    }

    /// Number of successful pipeline creations for a descriptor hash.
    #[must_use]
    pub fn pipeline_creations_for(&self, hash: u64) -> usize {
        self.pipeline_creates_by_hash
            .lock()
            .get(&hash)
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn bind_group(&self, handle: BindGroupHandle) -> Option<BindGroupDesc> {
        self.bind_groups.get(handle).map(|d| (*d).clone())
    }

    #[must_use]
    pub fn is_graphics_pipeline_alive(&self, handle: GraphicsPipelineHandle) -> bool {
        self.graphics_pipelines.contains(handle)
    }

    #[must_use]
    pub fn is_compute_pipeline_alive(&self, handle: ComputePipelineHandle) -> bool {
        self.compute_pipelines.contains(handle)
    }

    #[must_use]
    pub fn is_descriptor_set_alive(&self, handle: DescriptorSetHandle) -> bool {
        self.descriptor_sets.contains(handle)
    }

    /// Capacity and per-type sizes a native pool was created with.
    #[must_use]
    pub fn descriptor_pool_info(
        &self,
        pool: DescriptorPoolHandle,
    ) -> Option<(u32, Vec<DescriptorPoolSize>)> {
        self.descriptor_pools
            .get(pool)
            .map(|p| (p.max_sets, p.sizes.clone()))
    }

    #[must_use]
    pub fn live_descriptor_pools(&self) -> Vec<DescriptorPoolHandle> {
        self.descriptor_pools.handles()
    }

    #[must_use]
    pub fn live_descriptor_sets(&self) -> usize {
        self.descriptor_sets.len()
    }

    #[must_use]
    pub fn live_textures(&self) -> Vec<TextureHandle> {
        self.textures.handles()
    }

    #[must_use]
    pub fn live_buffers(&self) -> Vec<BufferHandle> {
        self.buffers.handles()
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    fn begin_create(&self, kind: HandleKind) -> Result<()> {
        if self.failing.lock().contains(&kind) {
            self.counters[kind_index(kind)]
                .failed
                .fetch_add(1, Ordering::SeqCst);
            log::debug!("RecordingDevice: injected {kind} creation failure");
            return Err(GalError::creation_failed(kind, "injected failure"));
        }
        Ok(())
    }

    fn created<H>(&self, kind: HandleKind, handle: H) -> H {
        self.counters[kind_index(kind)]
            .created
            .fetch_add(1, Ordering::SeqCst);
        handle
    }

    fn destroyed<T>(&self, kind: HandleKind, removed: Option<T>) {
        if removed.is_some() {
            self.counters[kind_index(kind)]
                .destroyed
                .fetch_add(1, Ordering::SeqCst);
        } else {
            log::warn!("RecordingDevice: destroy called with a dead {kind} handle");
        }
    }

    fn pipeline_gate(&self, kind: HandleKind, shader: ShaderHandle) -> Result<()> {
        self.begin_create(kind)?;
        if !self.shaders.contains(shader) {
            self.counters[kind_index(kind)]
                .failed
                .fetch_add(1, Ordering::SeqCst);
            return Err(GalError::InvalidHandle {
                kind: HandleKind::Shader,
            });
        }
        if self.failing_shaders.lock().contains(&shader) {
            self.counters[kind_index(kind)]
                .failed
                .fetch_add(1, Ordering::SeqCst);
            return Err(GalError::creation_failed(kind, "shader failed to link"));
        }
        let delay = *self.pipeline_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        Ok(())
    }

    fn record_pipeline_hash(&self, hash: u64) {
        *self.pipeline_creates_by_hash.lock().entry(hash).or_insert(0) += 1;
    }
}

impl Device for RecordingDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferHandle> {
        self.begin_create(HandleKind::Buffer)?;
        Ok(self.created(HandleKind::Buffer, self.buffers.insert(desc.clone())))
    }

    fn destroy_buffer(&self, handle: BufferHandle) {
        self.destroyed(HandleKind::Buffer, self.buffers.remove(handle));
    }

    fn buffer_desc(&self, handle: BufferHandle) -> Option<BufferDesc> {
        self.buffers.get(handle).map(|d| (*d).clone())
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<TextureHandle> {
        self.begin_create(HandleKind::Texture)?;
        Ok(self.created(HandleKind::Texture, self.textures.insert(desc.clone())))
    }

    fn destroy_texture(&self, handle: TextureHandle) {
        self.destroyed(HandleKind::Texture, self.textures.remove(handle));
    }

    fn texture_desc(&self, handle: TextureHandle) -> Option<TextureDesc> {
        self.textures.get(handle).map(|d| (*d).clone())
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<SamplerHandle> {
        self.begin_create(HandleKind::Sampler)?;
        Ok(self.created(HandleKind::Sampler, self.samplers.insert(*desc)))
    }

    fn destroy_sampler(&self, handle: SamplerHandle) {
        self.destroyed(HandleKind::Sampler, self.samplers.remove(handle));
    }

    fn sampler_desc(&self, handle: SamplerHandle) -> Option<SamplerDesc> {
        self.samplers.get(handle).map(|d| *d)
    }

    fn create_shader(&self, desc: &ShaderDesc) -> Result<ShaderHandle> {
        self.begin_create(HandleKind::Shader)?;
        Ok(self.created(HandleKind::Shader, self.shaders.insert(desc.clone())))
    }

    fn destroy_shader(&self, handle: ShaderHandle) {
        self.failing_shaders.lock().remove(&handle);
        self.destroyed(HandleKind::Shader, self.shaders.remove(handle));
    }

    fn shader_desc(&self, handle: ShaderHandle) -> Option<ShaderDesc> {
        self.shaders.get(handle).map(|d| (*d).clone())
    }

    fn create_bind_group_layout(
        &self,
        desc: &BindGroupLayoutDesc,
    ) -> Result<BindGroupLayoutHandle> {
        self.begin_create(HandleKind::BindGroupLayout)?;
        desc.validate()?;
        let handle = self.layouts.insert(Arc::new(desc.clone()));
        Ok(self.created(HandleKind::BindGroupLayout, handle))
    }

    fn destroy_bind_group_layout(&self, handle: BindGroupLayoutHandle) {
        self.destroyed(HandleKind::BindGroupLayout, self.layouts.remove(handle));
    }

    fn bind_group_layout_desc(
        &self,
        handle: BindGroupLayoutHandle,
    ) -> Option<Arc<BindGroupLayoutDesc>> {
        self.layouts.get(handle).map(|d| Arc::clone(&*d))
    }

    fn create_bind_group(&self, desc: &BindGroupDesc) -> Result<BindGroupHandle> {
        self.begin_create(HandleKind::BindGroup)?;
        let layout = self
            .layouts
            .get(desc.layout)
            .ok_or(GalError::UnknownBindGroupLayout)?;
        desc.validate(&layout, |buffer| {
            self.buffers.get(buffer).map(|b| b.total_size)
        })?;
        Ok(self.created(HandleKind::BindGroup, self.bind_groups.insert(desc.clone())))
    }

    fn destroy_bind_group(&self, handle: BindGroupHandle) {
        self.destroyed(HandleKind::BindGroup, self.bind_groups.remove(handle));
    }

    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc,
    ) -> Result<GraphicsPipelineHandle> {
        self.pipeline_gate(HandleKind::GraphicsPipeline, desc.shader)?;
        self.record_pipeline_hash(desc.calculate_hash());
        let handle = self.graphics_pipelines.insert(desc.clone());
        Ok(self.created(HandleKind::GraphicsPipeline, handle))
    }

    fn destroy_graphics_pipeline(&self, handle: GraphicsPipelineHandle) {
        self.destroyed(
            HandleKind::GraphicsPipeline,
            self.graphics_pipelines.remove(handle),
        );
    }

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<ComputePipelineHandle> {
        self.pipeline_gate(HandleKind::ComputePipeline, desc.shader)?;
        self.record_pipeline_hash(desc.calculate_hash());
        let handle = self.compute_pipelines.insert(*desc);
        Ok(self.created(HandleKind::ComputePipeline, handle))
    }

    fn destroy_compute_pipeline(&self, handle: ComputePipelineHandle) {
        self.destroyed(
            HandleKind::ComputePipeline,
            self.compute_pipelines.remove(handle),
        );
    }
}

impl DescriptorBackend for RecordingDevice {
    fn create_descriptor_pool(
        &self,
        sizes: &[DescriptorPoolSize],
        max_sets: u32,
    ) -> Result<DescriptorPoolHandle> {
        self.begin_create(HandleKind::DescriptorPool)?;
        let handle = self.descriptor_pools.insert(PoolRecord {
            max_sets,
            sizes: sizes.to_vec(),
            sets: Mutex::new(FxHashSet::default()),
        });
        Ok(self.created(HandleKind::DescriptorPool, handle))
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle) {
        let removed = self.descriptor_pools.remove(pool);
        if let Some(record) = &removed {
            // Destroying a native pool frees every set allocated from it.
            for set in record.sets.lock().drain() {
                self.destroyed(HandleKind::DescriptorSet, self.descriptor_sets.remove(set));
            }
        }
        self.destroyed(HandleKind::DescriptorPool, removed);
    }

    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        layout: BindGroupLayoutHandle,
    ) -> Result<DescriptorSetHandle> {
        self.begin_create(HandleKind::DescriptorSet)?;
        let record = self.descriptor_pools.get(pool).ok_or(GalError::InvalidHandle {
            kind: HandleKind::DescriptorPool,
        })?;
        if !self.layouts.contains(layout) {
            return Err(GalError::UnknownBindGroupLayout);
        }

        let mut sets = record.sets.lock();
        if sets.len() >= record.max_sets as usize {
            self.counters[kind_index(HandleKind::DescriptorSet)]
                .failed
                .fetch_add(1, Ordering::SeqCst);
            return Err(GalError::DescriptorAllocationFailed(format!(
                "native pool exhausted ({} sets)",
                record.max_sets
            )));
        }
        let set = self.descriptor_sets.insert(SetRecord {
            pool,
            _layout: layout,
        });
        sets.insert(set);
        Ok(self.created(HandleKind::DescriptorSet, set))
    }

    fn free_descriptor_sets(&self, pool: DescriptorPoolHandle, sets: &[DescriptorSetHandle]) {
        let Some(record) = self.descriptor_pools.get(pool) else {
            log::warn!("RecordingDevice: freeing sets of a dead descriptor pool");
            return;
        };
        let mut owned = record.sets.lock();
        for &set in sets {
            debug_assert!(
                self.descriptor_sets.get(set).is_none_or(|s| s.pool == pool),
                "descriptor set freed through the wrong pool"
            );
            owned.remove(&set);
            self.destroyed(HandleKind::DescriptorSet, self.descriptor_sets.remove(set));
        }
    }
}
