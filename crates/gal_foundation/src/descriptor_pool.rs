//! Descriptor Set Pools
//!
//! Growable pools of native descriptor sets for backends with explicit
//! descriptor sets.
//!
//! # Design
//!
//! Layouts are grouped by their [`ResourceUsage`]: the number of descriptors
//! of each resource type they need. All layouts with the same usage share
//! one [`DescriptorSetPool`], so a native sub-pool sized for that shape can
//! never run out of one descriptor type while another sits idle.
//!
//! A pool is a list of native sub-pools. The first one holds
//! `base_size` sets, each new one twice as many as the previous. Allocation
//! prefers the most recently created (active) sub-pool, then scans the
//! older ones from newest to oldest, and only creates a new sub-pool when
//! none has room.
//!
//! Sets are never freed immediately. Reclaimed sets are queued on their
//! sub-pool, which is marked dirty; the sweep in
//! [`DescriptorSetPools::begin_frame`] frees the queued sets through the
//! backend in one batch per sub-pool.
//!
//! # Lock Order
//!
//! `registry → pool`. A pool never calls back into the registry while its
//! own lock is held.

use std::sync::Arc;

use gal_core::{
    BindGroupLayoutDesc, BindGroupLayoutHandle, DescriptorBackend, DescriptorPoolHandle,
    DescriptorPoolSettings, DescriptorPoolSize, DescriptorSetHandle, Result, ShaderResourceType,
};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Number of descriptors per resource type needed by one set of a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ResourceUsage([u32; ShaderResourceType::COUNT]);

impl ResourceUsage {
    /// Counts the descriptors of `layout`. Array bindings contribute their
    /// element count; baked immutable samplers are not counted.
    #[must_use]
    pub fn from_layout(layout: &BindGroupLayoutDesc) -> Self {
        let mut usage = Self::default();
        for binding in &layout.bindings {
            let slot = &mut usage.0[binding.resource_type.index()];
            *slot = slot.saturating_add(binding.array_size.max(1));
        }
        usage
    }

    #[inline]
    #[must_use]
    pub fn count(&self, resource_type: ShaderResourceType) -> u32 {
        self.0[resource_type.index()]
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&c| c == 0)
    }

    /// Native pool sizes for a sub-pool holding `sets` sets.
    #[must_use]
    pub fn pool_sizes(&self, sets: u32) -> Vec<DescriptorPoolSize> {
        ShaderResourceType::ALL
            .iter()
            .filter(|ty| self.count(**ty) > 0)
            .map(|&resource_type| DescriptorPoolSize {
                resource_type,
                count: self.count(resource_type).saturating_mul(sets),
            })
            .collect()
    }
}

/// Which sub-pool a set was allocated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorSetAllocation {
    pub pool_index: u32,
}

/// Lifecycle state of a sub-pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubPoolState {
    /// Has room and takes allocations.
    Active,
    /// Every set is handed out.
    Full,
    /// Has sets queued for the next sweep.
    Dirty,
    /// Holds no sets and is not the active sub-pool. Kept until shutdown.
    Empty,
}

/// Snapshot of one sub-pool, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubPoolInfo {
    pub capacity: u32,
    /// Sets handed out and not yet swept, including queued ones.
    pub allocated: u32,
    /// Sets queued for the next sweep.
    pub pending_reclaim: u32,
    pub active: bool,
}

impl SubPoolInfo {
    #[must_use]
    pub fn state(&self) -> SubPoolState {
        if self.pending_reclaim > 0 {
            SubPoolState::Dirty
        } else if self.allocated >= self.capacity {
            SubPoolState::Full
        } else if self.allocated == 0 && !self.active {
            SubPoolState::Empty
        } else {
            SubPoolState::Active
        }
    }
}

struct SubPool {
    native: DescriptorPoolHandle,
    capacity: u32,
    allocated: u32,
    reclaim: Vec<DescriptorSetHandle>,
}

impl SubPool {
    #[inline]
    fn has_room(&self) -> bool {
        self.allocated < self.capacity
    }
}

struct PoolInner {
    sub_pools: Vec<SubPool>,
    active: Option<usize>,
    next_size: u32,
    total_allocations: u32,
    dirty: Vec<usize>,
}

#[inline]
fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

// ─── DescriptorSetPool ───────────────────────────────────────────────────────

/// All descriptor sets of one [`ResourceUsage`].
pub struct DescriptorSetPool {
    usage: ResourceUsage,
    backend: Arc<dyn DescriptorBackend>,
    inner: Mutex<PoolInner>,
}

impl DescriptorSetPool {
    #[must_use]
    pub fn new(
        usage: ResourceUsage,
        backend: Arc<dyn DescriptorBackend>,
        settings: &DescriptorPoolSettings,
    ) -> Self {
        Self {
            usage,
            backend,
            inner: Mutex::new(PoolInner {
                sub_pools: Vec::new(),
                active: None,
                next_size: settings.base_size.max(1),
                total_allocations: 0,
                dirty: Vec::new(),
            }),
        }
    }

    #[must_use]
    pub fn usage(&self) -> ResourceUsage {
        self.usage
    }

    /// Allocates one set for `layout`, growing the pool if every sub-pool
    /// is full.
    pub fn create_descriptor_set(
        &self,
        layout: BindGroupLayoutHandle,
    ) -> Result<(DescriptorSetHandle, DescriptorSetAllocation)> {
        let mut inner = self.inner.lock();
        let index = self.free_sub_pool(&mut inner)?;

        let sub_pool = &mut inner.sub_pools[index];
        let set = self.backend.allocate_descriptor_set(sub_pool.native, layout)?;
        sub_pool.allocated += 1;
        inner.total_allocations += 1;

        Ok((
            set,
            DescriptorSetAllocation {
                pool_index: to_u32(index),
            },
        ))
    }

    fn free_sub_pool(&self, inner: &mut PoolInner) -> Result<usize> {
        if let Some(active) = inner.active
            && inner.sub_pools[active].has_room()
        {
            return Ok(active);
        }
        if let Some(index) = inner.sub_pools.iter().rposition(SubPool::has_room) {
            return Ok(index);
        }

        let size = inner.next_size;
        let native = self
            .backend
            .create_descriptor_pool(&self.usage.pool_sizes(size), size)?;
        inner.sub_pools.push(SubPool {
            native,
            capacity: size,
            allocated: 0,
            reclaim: Vec::new(),
        });
        let index = inner.sub_pools.len() - 1;
        inner.active = Some(index);
        inner.next_size = size.saturating_mul(2);

        log::info!(
            "DescriptorSetPool: created sub-pool #{index} with {size} sets ({} sub-pools)",
            inner.sub_pools.len()
        );
        Ok(index)
    }

    /// Queues `set` for release at the next sweep.
    ///
    /// Returns `true` if this made a clean sub-pool dirty, i.e. the pool
    /// has to be registered for the sweep.
    pub fn reclaim_descriptor_set(
        &self,
        set: DescriptorSetHandle,
        allocation: DescriptorSetAllocation,
    ) -> bool {
        let mut inner = self.inner.lock();
        let index = allocation.pool_index as usize;
        let Some(sub_pool) = inner.sub_pools.get_mut(index) else {
            debug_assert!(false, "descriptor set reclaimed into unknown sub-pool {index}");
            log::error!("DescriptorSetPool: sub-pool {index} does not exist, set leaked");
            return false;
        };

        if sub_pool.reclaim.contains(&set) {
            debug_assert!(false, "descriptor set reclaimed twice in one frame");
            log::error!("DescriptorSetPool: descriptor set already queued for release");
            return false;
        }

        let was_clean = sub_pool.reclaim.is_empty();
        sub_pool.reclaim.push(set);
        if was_clean && !inner.dirty.contains(&index) {
            inner.dirty.push(index);
            return true;
        }
        false
    }

    /// Frees every queued set. Returns `true` if the pool holds no sets
    /// afterwards.
    pub fn reclaim_resources(&self) -> bool {
        let mut inner = self.inner.lock();
        let dirty = std::mem::take(&mut inner.dirty);
        let mut freed = 0u32;
        for index in dirty {
            let sub_pool = &mut inner.sub_pools[index];
            if sub_pool.reclaim.is_empty() {
                continue;
            }
            self.backend
                .free_descriptor_sets(sub_pool.native, &sub_pool.reclaim);
            let count = to_u32(sub_pool.reclaim.len());
            debug_assert!(
                count <= sub_pool.allocated,
                "more descriptor sets reclaimed than allocated"
            );
            sub_pool.allocated = sub_pool.allocated.saturating_sub(count);
            sub_pool.reclaim.clear();
            freed += count;
        }
        if freed > inner.total_allocations {
            log::error!("DescriptorSetPool: freed more descriptor sets than were allocated");
        }
        inner.total_allocations = inner.total_allocations.saturating_sub(freed);
        if freed > 0 {
            log::trace!("DescriptorSetPool: freed {freed} descriptor sets");
        }
        inner.total_allocations == 0
    }

    #[must_use]
    pub fn total_allocations(&self) -> u32 {
        self.inner.lock().total_allocations
    }

    #[must_use]
    pub fn sub_pool_count(&self) -> usize {
        self.inner.lock().sub_pools.len()
    }

    #[must_use]
    pub fn sub_pools(&self) -> Vec<SubPoolInfo> {
        let inner = self.inner.lock();
        inner
            .sub_pools
            .iter()
            .enumerate()
            .map(|(index, sub_pool)| SubPoolInfo {
                capacity: sub_pool.capacity,
                allocated: sub_pool.allocated,
                pending_reclaim: to_u32(sub_pool.reclaim.len()),
                active: inner.active == Some(index),
            })
            .collect()
    }

    /// Sweeps, checks for leaked sets and destroys every native sub-pool.
    fn destroy(&self) -> u32 {
        self.reclaim_resources();
        let mut inner = self.inner.lock();
        let leaked = inner.total_allocations;
        for sub_pool in inner.sub_pools.drain(..) {
            self.backend.destroy_descriptor_pool(sub_pool.native);
        }
        inner.active = None;
        inner.total_allocations = 0;
        leaked
    }
}

impl Drop for DescriptorSetPool {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        for sub_pool in inner.sub_pools.drain(..) {
            self.backend.destroy_descriptor_pool(sub_pool.native);
        }
    }
}

// ─── DescriptorSetPools ──────────────────────────────────────────────────────

#[derive(Default)]
struct Registry {
    pools: FxHashMap<ResourceUsage, Arc<DescriptorSetPool>>,
    dirty: Vec<Arc<DescriptorSetPool>>,
}

/// Registry of [`DescriptorSetPool`]s keyed by [`ResourceUsage`].
pub struct DescriptorSetPools {
    backend: Arc<dyn DescriptorBackend>,
    settings: DescriptorPoolSettings,
    registry: Mutex<Registry>,
}

impl DescriptorSetPools {
    #[must_use]
    pub fn new(backend: Arc<dyn DescriptorBackend>, settings: DescriptorPoolSettings) -> Self {
        Self {
            backend,
            settings,
            registry: Mutex::new(Registry::default()),
        }
    }

    /// The pool serving every layout shaped like `layout`.
    pub fn pool_for_layout(&self, layout: &BindGroupLayoutDesc) -> Arc<DescriptorSetPool> {
        self.pool_for_usage(ResourceUsage::from_layout(layout))
    }

    pub fn pool_for_usage(&self, usage: ResourceUsage) -> Arc<DescriptorSetPool> {
        let mut registry = self.registry.lock();
        Arc::clone(registry.pools.entry(usage).or_insert_with(|| {
            log::debug!("DescriptorSetPools: new pool for usage {usage:?}");
            Arc::new(DescriptorSetPool::new(
                usage,
                Arc::clone(&self.backend),
                &self.settings,
            ))
        }))
    }

    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.registry.lock().pools.len()
    }

    /// Queues `set` on its pool and registers the pool for the next sweep.
    pub fn reclaim_descriptor_set(
        &self,
        pool: &Arc<DescriptorSetPool>,
        set: DescriptorSetHandle,
        allocation: DescriptorSetAllocation,
    ) {
        if pool.reclaim_descriptor_set(set, allocation) {
            self.mark_pool_dirty(pool);
        }
    }

    fn mark_pool_dirty(&self, pool: &Arc<DescriptorSetPool>) {
        let mut registry = self.registry.lock();
        if !registry.dirty.iter().any(|p| Arc::ptr_eq(p, pool)) {
            registry.dirty.push(Arc::clone(pool));
        }
    }

    #[must_use]
    pub fn dirty_pool_count(&self) -> usize {
        self.registry.lock().dirty.len()
    }

    /// Sweeps every dirty pool. Returns the number of pools swept.
    pub fn begin_frame(&self) -> usize {
        let dirty = std::mem::take(&mut self.registry.lock().dirty);
        for pool in &dirty {
            pool.reclaim_resources();
        }
        dirty.len()
    }

    /// Sweeps and destroys every pool. Returns the number of sets that were
    /// still allocated, which is a leak in the caller.
    pub fn shutdown(&self) -> u32 {
        let mut registry = self.registry.lock();
        registry.dirty.clear();
        let mut leaked = 0;
        for (usage, pool) in registry.pools.drain() {
            let pool_leaks = pool.destroy();
            if pool_leaks > 0 {
                log::error!(
                    "DescriptorSetPools: {pool_leaks} descriptor sets leaked from pool {usage:?}"
                );
            }
            leaked += pool_leaks;
        }
        debug_assert!(leaked == 0, "{leaked} descriptor sets were never reclaimed");
        leaked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gal_core::{Device, ShaderResourceBinding};
    use gal_dev_utils::RecordingDevice;

    fn layout_desc() -> BindGroupLayoutDesc {
        BindGroupLayoutDesc::new(vec![
            ShaderResourceBinding::new("Albedo", ShaderResourceType::Texture, 0, 0),
            ShaderResourceBinding::new("Lights", ShaderResourceType::StructuredBuffer, 0, 1)
                .with_array_size(3),
            ShaderResourceBinding::new("Material", ShaderResourceType::ConstantBuffer, 0, 2),
        ])
    }

    fn setup(base_size: u32) -> (Arc<RecordingDevice>, DescriptorSetPool, BindGroupLayoutHandle) {
        let device = Arc::new(RecordingDevice::new());
        let layout = device
            .create_bind_group_layout(&layout_desc())
            .expect("layout");
        let pool = DescriptorSetPool::new(
            ResourceUsage::from_layout(&layout_desc()),
            device.clone(),
            &DescriptorPoolSettings { base_size },
        );
        (device, pool, layout)
    }

    #[test]
    fn usage_counts_array_elements() {
        let usage = ResourceUsage::from_layout(&layout_desc());
        assert_eq!(usage.count(ShaderResourceType::Texture), 1);
        assert_eq!(usage.count(ShaderResourceType::StructuredBuffer), 3);
        assert_eq!(usage.count(ShaderResourceType::Sampler), 0);

        let sizes = usage.pool_sizes(8);
        assert_eq!(sizes.len(), 3);
        assert!(sizes.contains(&DescriptorPoolSize {
            resource_type: ShaderResourceType::StructuredBuffer,
            count: 24,
        }));
    }

    #[test]
    fn first_allocation_creates_base_sized_sub_pool() {
        let (device, pool, layout) = setup(4);
        let (_, allocation) = pool.create_descriptor_set(layout).expect("set");
        assert_eq!(allocation.pool_index, 0);

        let infos = pool.sub_pools();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].capacity, 4);
        assert!(infos[0].active);
        assert_eq!(device.counts(gal_core::HandleKind::DescriptorPool).live(), 1);
    }

    #[test]
    fn full_pool_grows_by_doubling() {
        let (_device, pool, layout) = setup(2);
        let mut indices = Vec::new();
        for _ in 0..7 {
            indices.push(pool.create_descriptor_set(layout).expect("set").1.pool_index);
        }
        assert_eq!(indices, vec![0, 0, 1, 1, 1, 1, 2]);
        let capacities: Vec<_> = pool.sub_pools().iter().map(|p| p.capacity).collect();
        assert_eq!(capacities, vec![2, 4, 8]);
        assert_eq!(pool.total_allocations(), 7);
        let states: Vec<_> = pool.sub_pools().iter().map(SubPoolInfo::state).collect();
        assert_eq!(
            states,
            vec![SubPoolState::Full, SubPoolState::Full, SubPoolState::Active]
        );
    }

    #[test]
    fn reclaimed_space_is_reused_after_sweep() {
        let (device, pool, layout) = setup(2);
        let a = pool.create_descriptor_set(layout).expect("a");
        let _b = pool.create_descriptor_set(layout).expect("b");
        let _c = pool.create_descriptor_set(layout).expect("c");

        assert!(pool.reclaim_descriptor_set(a.0, a.1));
        // Queued, not yet freed.
        assert!(device.is_descriptor_set_alive(a.0));
        assert_eq!(pool.sub_pools()[0].state(), SubPoolState::Dirty);
        assert_eq!(pool.sub_pools()[1].state(), SubPoolState::Active);

        assert!(!pool.reclaim_resources());
        assert!(!device.is_descriptor_set_alive(a.0));
        assert_eq!(pool.total_allocations(), 2);

        // Active sub-pool #1 (capacity 4) is preferred until it is full.
        for _ in 0..3 {
            let (_, allocation) = pool.create_descriptor_set(layout).expect("set");
            assert_eq!(allocation.pool_index, 1);
        }
        // Then the scan finds the hole in sub-pool #0.
        let (_, g) = pool.create_descriptor_set(layout).expect("g");
        assert_eq!(g.pool_index, 0);
        assert_eq!(pool.sub_pool_count(), 2);
    }

    #[test]
    fn only_first_reclaim_marks_sub_pool_dirty() {
        let (_device, pool, layout) = setup(4);
        let a = pool.create_descriptor_set(layout).expect("a");
        let b = pool.create_descriptor_set(layout).expect("b");
        assert!(pool.reclaim_descriptor_set(a.0, a.1));
        assert!(!pool.reclaim_descriptor_set(b.0, b.1));
        assert!(pool.reclaim_resources());
        assert_eq!(pool.sub_pools()[0].state(), SubPoolState::Active);
    }

    #[test]
    fn failed_native_allocation_is_reported() {
        let (device, pool, layout) = setup(4);
        device.set_failing(gal_core::HandleKind::DescriptorSet, true);
        assert!(pool.create_descriptor_set(layout).is_err());
        assert_eq!(pool.total_allocations(), 0);
    }

    #[test]
    fn registry_shares_pools_by_usage_and_sweeps_dirty_pools() {
        let device = Arc::new(RecordingDevice::new());
        let desc = layout_desc();
        let layout = device.create_bind_group_layout(&desc).expect("layout");
        let pools = DescriptorSetPools::new(device.clone(), DescriptorPoolSettings::default());

        let pool = pools.pool_for_layout(&desc);
        let mut renamed = desc.clone();
        renamed.bindings[0] =
            ShaderResourceBinding::new("Normal", ShaderResourceType::Texture, 0, 0);
        assert!(Arc::ptr_eq(&pool, &pools.pool_for_layout(&renamed)));
        assert_eq!(pools.pool_count(), 1);

        let (set, allocation) = pool.create_descriptor_set(layout).expect("set");
        pools.reclaim_descriptor_set(&pool, set, allocation);
        assert_eq!(pools.dirty_pool_count(), 1);
        assert_eq!(pools.begin_frame(), 1);
        assert_eq!(pools.dirty_pool_count(), 0);
        assert!(!device.is_descriptor_set_alive(set));

        assert_eq!(pools.shutdown(), 0);
        assert_eq!(device.counts(gal_core::HandleKind::DescriptorPool).live(), 0);
    }
}
