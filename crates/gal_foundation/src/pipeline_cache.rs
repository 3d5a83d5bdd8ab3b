//! Pipeline Cache
//!
//! Content-addressed owner of every graphics and compute pipeline object.
//! A pipeline is created at most once per distinct descriptor and stays
//! alive until [`PipelineCache::clear`] or until the shader it was built
//! from is destroyed ([`PipelineCache::shader_destroyed`]).
//!
//! # Locking
//!
//! Each pipeline kind has its own table behind its own mutex. The mutex is
//! held for lookups and inserts only, never across a device creation call:
//!
//! 1. lookup under the lock, return on hit;
//! 2. create the device object with the lock released;
//! 3. re-lock and insert. If another thread inserted the same descriptor in
//!    the meantime, our object is destroyed and the winner's handle is
//!    returned.
//!
//! So at most one live pipeline exists per descriptor, even when several
//! threads miss at once. Creation failures are returned to the caller and
//! never cached.
//!
//! # Lock Order
//!
//! `table → tracker`. The shader tracker's lock is released before the cache
//! evicts anything, so eviction never nests the two.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use gal_core::{
    ComputePipelineDesc, ComputePipelineHandle, Device, GraphicsPipelineDesc,
    GraphicsPipelineHandle, HandleKind, HashedComputePipelineDesc, HashedGraphicsPipelineDesc,
    Result, ShaderHandle,
};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::dependency_tracker::DependencyTracker;

/// A pipeline owned by the cache, as registered with the shader tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachedPipeline {
    Graphics(GraphicsPipelineHandle),
    Compute(ComputePipelineHandle),
}

// ─── Pipeline Kinds ──────────────────────────────────────────────────────────

trait PipelineKind {
    type Desc: Clone + Eq;
    type Handle: Copy + Eq + Hash + Debug;

    const KIND: HandleKind;

    fn shader(desc: &Self::Desc) -> ShaderHandle;
    fn create(device: &dyn Device, desc: &Self::Desc) -> Result<Self::Handle>;
    fn destroy(device: &dyn Device, handle: Self::Handle);
    fn wrap(handle: Self::Handle) -> CachedPipeline;
}

struct Graphics;

impl PipelineKind for Graphics {
    type Desc = GraphicsPipelineDesc;
    type Handle = GraphicsPipelineHandle;

    const KIND: HandleKind = HandleKind::GraphicsPipeline;

    fn shader(desc: &Self::Desc) -> ShaderHandle {
        desc.shader
    }

    fn create(device: &dyn Device, desc: &Self::Desc) -> Result<Self::Handle> {
        device.create_graphics_pipeline(desc)
    }

    fn destroy(device: &dyn Device, handle: Self::Handle) {
        device.destroy_graphics_pipeline(handle);
    }

    fn wrap(handle: Self::Handle) -> CachedPipeline {
        CachedPipeline::Graphics(handle)
    }
}

struct Compute;

impl PipelineKind for Compute {
    type Desc = ComputePipelineDesc;
    type Handle = ComputePipelineHandle;

    const KIND: HandleKind = HandleKind::ComputePipeline;

    fn shader(desc: &Self::Desc) -> ShaderHandle {
        desc.shader
    }

    fn create(device: &dyn Device, desc: &Self::Desc) -> Result<Self::Handle> {
        device.create_compute_pipeline(desc)
    }

    fn destroy(device: &dyn Device, handle: Self::Handle) {
        device.destroy_compute_pipeline(handle);
    }

    fn wrap(handle: Self::Handle) -> CachedPipeline {
        CachedPipeline::Compute(handle)
    }
}

// ─── Tables ──────────────────────────────────────────────────────────────────

/// Descriptor hash → descriptors sharing that hash. The full descriptor is
/// compared on lookup, so hash collisions never alias two pipelines.
struct PipelineTable<K: PipelineKind> {
    buckets: FxHashMap<u64, SmallVec<[(K::Desc, K::Handle); 1]>>,
    hash_of: FxHashMap<K::Handle, u64>,
}

impl<K: PipelineKind> PipelineTable<K> {
    fn new() -> Self {
        Self {
            buckets: FxHashMap::default(),
            hash_of: FxHashMap::default(),
        }
    }

    fn find(&self, hash: u64, desc: &K::Desc) -> Option<K::Handle> {
        self.buckets
            .get(&hash)?
            .iter()
            .find(|(existing, _)| existing == desc)
            .map(|(_, handle)| *handle)
    }

    fn insert(&mut self, hash: u64, desc: K::Desc, handle: K::Handle) {
        self.buckets.entry(hash).or_default().push((desc, handle));
        self.hash_of.insert(handle, hash);
    }

    fn remove(&mut self, handle: K::Handle) -> bool {
        let Some(hash) = self.hash_of.remove(&handle) else {
            return false;
        };
        if let Some(bucket) = self.buckets.get_mut(&hash) {
            bucket.retain(|(_, existing)| *existing != handle);
            if bucket.is_empty() {
                self.buckets.remove(&hash);
            }
        }
        true
    }

    fn len(&self) -> usize {
        self.hash_of.len()
    }

    fn drain_handles(&mut self) -> Vec<K::Handle> {
        self.buckets.clear();
        self.hash_of.drain().map(|(handle, _)| handle).collect()
    }
}

/// Lookup counters, for profiling overlays and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineCacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Misses that lost the insertion race and discarded their object.
    pub races_lost: u64,
    pub creation_failures: u64,
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    races_lost: AtomicU64,
    creation_failures: AtomicU64,
}

// ─── Pipeline Cache ──────────────────────────────────────────────────────────

pub struct PipelineCache {
    device: Arc<dyn Device>,
    graphics: Mutex<PipelineTable<Graphics>>,
    compute: Mutex<PipelineTable<Compute>>,
    shader_links: DependencyTracker<CachedPipeline, ShaderHandle>,
    stats: AtomicStats,
}

impl PipelineCache {
    #[must_use]
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self {
            device,
            graphics: Mutex::new(PipelineTable::new()),
            compute: Mutex::new(PipelineTable::new()),
            shader_links: DependencyTracker::new(),
            stats: AtomicStats::default(),
        }
    }

    /// Returns the graphics pipeline for `desc`, creating it on first use.
    ///
    /// Hashes `desc` on every call; see
    /// [`get_graphics_pipeline_hashed`](Self::get_graphics_pipeline_hashed).
    pub fn get_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc,
    ) -> Result<GraphicsPipelineHandle> {
        self.get_or_create::<Graphics>(&self.graphics, desc.calculate_hash(), desc)
    }

    /// Same as [`get_graphics_pipeline`](Self::get_graphics_pipeline), with
    /// the hash computed when `desc` was wrapped.
    pub fn get_graphics_pipeline_hashed(
        &self,
        desc: &HashedGraphicsPipelineDesc,
    ) -> Result<GraphicsPipelineHandle> {
        self.get_or_create::<Graphics>(&self.graphics, desc.hash_value(), desc.desc())
    }

    /// Returns the compute pipeline for `desc`, creating it on first use.
    pub fn get_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<ComputePipelineHandle> {
        self.get_or_create::<Compute>(&self.compute, desc.calculate_hash(), desc)
    }

    pub fn get_compute_pipeline_hashed(
        &self,
        desc: &HashedComputePipelineDesc,
    ) -> Result<ComputePipelineHandle> {
        self.get_or_create::<Compute>(&self.compute, desc.hash_value(), desc.desc())
    }

    fn get_or_create<K: PipelineKind>(
        &self,
        table: &Mutex<PipelineTable<K>>,
        hash: u64,
        desc: &K::Desc,
    ) -> Result<K::Handle> {
        if let Some(handle) = table.lock().find(hash, desc) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(handle);
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        // Creation can take milliseconds; keep the table unlocked meanwhile.
        let created = match K::create(self.device.as_ref(), desc) {
            Ok(handle) => handle,
            Err(err) => {
                self.stats.creation_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("PipelineCache: {} creation failed: {err}", K::KIND);
                return Err(err);
            }
        };

        let winner = {
            let mut table = table.lock();
            match table.find(hash, desc) {
                Some(existing) => Some(existing),
                None => {
                    table.insert(hash, desc.clone(), created);
                    self.shader_links
                        .add_resource(K::wrap(created), [K::shader(desc)]);
                    None
                }
            }
        };

        if let Some(existing) = winner {
            self.stats.races_lost.fetch_add(1, Ordering::Relaxed);
            log::debug!(
                "PipelineCache: lost {} insertion race (hash {hash:#018x}), discarding duplicate",
                K::KIND
            );
            K::destroy(self.device.as_ref(), created);
            return Ok(existing);
        }
        Ok(created)
    }

    /// Evicts and destroys every pipeline built from `shader`.
    ///
    /// Returns the number of pipelines destroyed.
    pub fn shader_destroyed(&self, shader: ShaderHandle) -> usize {
        let evicted = self.shader_links.dependency_destroyed(shader);
        for &pipeline in &evicted {
            self.shader_links.remove_resource(pipeline);
            match pipeline {
                CachedPipeline::Graphics(handle) => {
                    if self.graphics.lock().remove(handle) {
                        self.device.destroy_graphics_pipeline(handle);
                    }
                }
                CachedPipeline::Compute(handle) => {
                    if self.compute.lock().remove(handle) {
                        self.device.destroy_compute_pipeline(handle);
                    }
                }
            }
        }
        if !evicted.is_empty() {
            log::info!(
                "PipelineCache: evicted {} pipeline(s) built from {shader:?}",
                evicted.len()
            );
        }
        evicted.len()
    }

    /// Destroys every cached pipeline and empties both tables.
    pub fn clear(&self) {
        let graphics = self.graphics.lock().drain_handles();
        let compute = self.compute.lock().drain_handles();

        for &handle in &graphics {
            self.shader_links
                .remove_resource(CachedPipeline::Graphics(handle));
            self.device.destroy_graphics_pipeline(handle);
        }
        for &handle in &compute {
            self.shader_links
                .remove_resource(CachedPipeline::Compute(handle));
            self.device.destroy_compute_pipeline(handle);
        }
        if !graphics.is_empty() || !compute.is_empty() {
            log::info!(
                "PipelineCache: cleared {} graphics and {} compute pipeline(s)",
                graphics.len(),
                compute.len()
            );
        }
    }

    #[must_use]
    pub fn graphics_pipeline_count(&self) -> usize {
        self.graphics.lock().len()
    }

    #[must_use]
    pub fn compute_pipeline_count(&self) -> usize {
        self.compute.lock().len()
    }

    #[must_use]
    pub fn stats(&self) -> PipelineCacheStats {
        PipelineCacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            races_lost: self.stats.races_lost.load(Ordering::Relaxed),
            creation_failures: self.stats.creation_failures.load(Ordering::Relaxed),
        }
    }
}
