//! Bind Group Store
//!
//! Owns every bind group created through the binding core and keeps them
//! consistent with the objects they reference.
//!
//! # Design
//!
//! - **Creation**: the layout description is fetched from the device, a
//!   native descriptor set is allocated from the pool of the layout's usage
//!   shape (explicit-set backends only) and the device object is created.
//!   The bind group is then tracked against every buffer, texture and
//!   sampler it references.
//! - **Invalidation**: when one of those objects is destroyed
//!   ([`BindGroupStore::resource_destroyed`]) every dependent bind group is
//!   destroyed on the device and marked invalidated. Its handle stays known
//!   to the store until [`BindGroupStore::destroy_bind_group`] so render code
//!   can tell "stale" from "never existed".
//! - **Deferred reclaim**: descriptor sets may still be read by in-flight
//!   frames. They are retired with the current frame index and only handed
//!   back to their pool by [`BindGroupStore::frame_completed`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use gal_core::{
    BindGroupDesc, BindGroupHandle, DescriptorSetHandle, Device, GalError, HandleKind, Result,
    ResourceId,
};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::dependency_tracker::DependencyTracker;
use crate::descriptor_pool::{DescriptorSetAllocation, DescriptorSetPool, DescriptorSetPools};

struct NativeSet {
    pool: Arc<DescriptorSetPool>,
    set: DescriptorSetHandle,
    allocation: DescriptorSetAllocation,
}

struct Record {
    hash: u64,
    native: Option<NativeSet>,
    invalidated: bool,
}

struct Retired {
    frame: u64,
    native: NativeSet,
}

pub struct BindGroupStore {
    device: Arc<dyn Device>,
    pools: Option<Arc<DescriptorSetPools>>,
    validate: bool,

    records: Mutex<FxHashMap<BindGroupHandle, Record>>,
    tracker: DependencyTracker<BindGroupHandle, ResourceId>,
    retired: Mutex<VecDeque<Retired>>,
    frame: AtomicU64,
}

impl BindGroupStore {
    /// `pools` is `None` on flat-slot backends, which have no native
    /// descriptor sets.
    #[must_use]
    pub fn new(
        device: Arc<dyn Device>,
        pools: Option<Arc<DescriptorSetPools>>,
        validate: bool,
    ) -> Self {
        Self {
            device,
            pools,
            validate,
            records: Mutex::new(FxHashMap::default()),
            tracker: DependencyTracker::new(),
            retired: Mutex::new(VecDeque::new()),
            frame: AtomicU64::new(0),
        }
    }

    /// Creates the device bind group for `desc` and starts tracking it.
    pub fn create_bind_group(&self, desc: &BindGroupDesc) -> Result<BindGroupHandle> {
        let layout = self
            .device
            .bind_group_layout_desc(desc.layout)
            .ok_or(GalError::UnknownBindGroupLayout)?;

        if self.validate {
            desc.validate(&layout, |buffer| {
                self.device.buffer_desc(buffer).map(|d| d.total_size)
            })?;
        }

        let native = match &self.pools {
            Some(pools) => {
                let pool = pools.pool_for_layout(&layout);
                let (set, allocation) = pool.create_descriptor_set(desc.layout)?;
                Some(NativeSet {
                    pool,
                    set,
                    allocation,
                })
            }
            None => None,
        };

        let handle = match self.device.create_bind_group(desc) {
            Ok(handle) => handle,
            Err(err) => {
                log::warn!("BindGroupStore: device failed to create bind group: {err}");
                // Never handed out, so nothing can be reading it.
                if let (Some(pools), Some(native)) = (&self.pools, native) {
                    pools.reclaim_descriptor_set(&native.pool, native.set, native.allocation);
                }
                return Err(err);
            }
        };

        self.tracker
            .add_resource(handle, desc.referenced_resources());
        self.records.lock().insert(
            handle,
            Record {
                hash: desc.calculate_hash(),
                native,
                invalidated: false,
            },
        );
        Ok(handle)
    }

    /// Destroys a bind group created by this store.
    ///
    /// Unknown handles are ignored. For an invalidated bind group this only
    /// forgets the handle; its device object is already gone.
    pub fn destroy_bind_group(&self, handle: BindGroupHandle) {
        let Some(record) = self.records.lock().remove(&handle) else {
            log::warn!("BindGroupStore: destroy of unknown bind group {handle:?}");
            return;
        };
        if record.invalidated {
            return;
        }
        self.tracker.remove_resource(handle);
        self.release(handle, record.native);
    }

    /// Reports the destruction of a buffer, texture, sampler or shader.
    ///
    /// Returns the bind groups that were invalidated by this call.
    pub fn resource_destroyed(&self, resource: impl Into<ResourceId>) -> Vec<BindGroupHandle> {
        let dependents = self.tracker.dependency_destroyed(resource.into());
        let mut invalidated = Vec::with_capacity(dependents.len());
        for handle in dependents {
            // Whoever flips the record under the lock owns the teardown. A
            // concurrent destroy_bind_group may have removed it already.
            let native = {
                let mut records = self.records.lock();
                match records.get_mut(&handle) {
                    Some(record) if !record.invalidated => {
                        record.invalidated = true;
                        record.native.take()
                    }
                    _ => continue,
                }
            };
            self.tracker.remove_resource(handle);
            self.release(handle, native);
            invalidated.push(handle);
        }
        invalidated
    }

    fn release(&self, handle: BindGroupHandle, native: Option<NativeSet>) {
        self.device.destroy_bind_group(handle);
        if let Some(native) = native {
            // The frame index only advances under this lock, so the queue
            // stays sorted by frame.
            let mut retired = self.retired.lock();
            let frame = self.frame.load(Ordering::Acquire);
            retired.push_back(Retired { frame, native });
        }
    }

    /// `true` while `handle` refers to a bind group that lost one of its
    /// resources and has not been destroyed by the caller yet.
    #[must_use]
    pub fn is_invalidated(&self, handle: BindGroupHandle) -> bool {
        self.records
            .lock()
            .get(&handle)
            .is_some_and(|r| r.invalidated)
    }

    /// `true` if `handle` is usable for rendering.
    #[must_use]
    pub fn is_valid(&self, handle: BindGroupHandle) -> bool {
        self.records
            .lock()
            .get(&handle)
            .is_some_and(|r| !r.invalidated)
    }

    /// Content hash of the description `handle` was created from.
    #[must_use]
    pub fn desc_hash(&self, handle: BindGroupHandle) -> Option<u64> {
        self.records
            .lock()
            .get(&handle)
            .filter(|r| !r.invalidated)
            .map(|r| r.hash)
    }

    /// Resources `handle` is tracked against.
    #[must_use]
    pub fn dependencies_of(&self, handle: BindGroupHandle) -> Vec<ResourceId> {
        self.tracker.dependencies_of(handle)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    // ─── Frame Protocol ──────────────────────────────────────────────────────

    /// Index of the frame being recorded. Sets retired now are tagged with it.
    #[must_use]
    pub fn current_frame(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }

    /// The GPU finished every frame up to and including `frame`: queue the
    /// descriptor sets retired in those frames on their pools.
    ///
    /// Returns the number of sets handed back.
    pub fn frame_completed(&self, frame: u64) -> usize {
        let ready: Vec<Retired> = {
            let mut retired = self.retired.lock();
            debug_assert!(
                retired
                    .iter()
                    .zip(retired.iter().skip(1))
                    .all(|(a, b)| a.frame <= b.frame),
                "retired descriptor sets out of frame order"
            );
            let split = retired.partition_point(|r| r.frame <= frame);
            retired.drain(..split).collect()
        };
        if let Some(pools) = &self.pools {
            for Retired { native, .. } in &ready {
                pools.reclaim_descriptor_set(&native.pool, native.set, native.allocation);
            }
        }
        ready.len()
    }

    /// Starts the next frame: advances the frame index and sweeps the pools.
    /// Returns the new frame index.
    pub fn begin_frame(&self) -> u64 {
        if let Some(pools) = &self.pools {
            pools.begin_frame();
        }
        let _retired = self.retired.lock();
        self.frame.fetch_add(1, Ordering::AcqRel) + 1
    }

    #[must_use]
    pub fn pending_reclaim_count(&self) -> usize {
        self.retired.lock().len()
    }

    /// Destroys every live bind group and releases every retired set,
    /// regardless of frame.
    pub fn shutdown(&self) {
        let records: Vec<(BindGroupHandle, Record)> = self.records.lock().drain().collect();
        let mut destroyed = 0usize;
        for (handle, record) in records {
            if record.invalidated {
                continue;
            }
            self.tracker.remove_resource(handle);
            self.release(handle, record.native);
            destroyed += 1;
        }
        let released = self.frame_completed(u64::MAX);
        if let Some(pools) = &self.pools {
            pools.begin_frame();
        }
        if destroyed > 0 {
            log::debug!(
                "BindGroupStore: shutdown destroyed {destroyed} {}s, released {released} sets",
                HandleKind::BindGroup
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gal_core::{
        BindGroupItem, BindGroupLayoutDesc, BufferDesc, BufferRange, DescriptorPoolSettings,
        SamplerDesc, ShaderResourceBinding, ShaderResourceType, TextureDesc, TextureRange,
    };
    use gal_dev_utils::RecordingDevice;

    struct Fixture {
        device: Arc<RecordingDevice>,
        store: BindGroupStore,
        desc: BindGroupDesc,
        texture: gal_core::TextureHandle,
        buffer: gal_core::BufferHandle,
    }

    fn fixture() -> Fixture {
        let device = Arc::new(RecordingDevice::new());
        let layout = device
            .create_bind_group_layout(&BindGroupLayoutDesc::new(vec![
                ShaderResourceBinding::new("Albedo", ShaderResourceType::Texture, 0, 0),
                ShaderResourceBinding::new("AlbedoSampler", ShaderResourceType::Sampler, 0, 1),
                ShaderResourceBinding::new("Material", ShaderResourceType::ConstantBuffer, 0, 2),
            ]))
            .expect("layout");
        let texture = device
            .create_texture(&TextureDesc::new_2d(
                16,
                16,
                wgpu::TextureFormat::Rgba8Unorm,
            ))
            .expect("texture");
        let sampler = device
            .create_sampler(&SamplerDesc::default())
            .expect("sampler");
        let buffer = device
            .create_buffer(&BufferDesc::constant(64))
            .expect("buffer");

        let desc = BindGroupDesc {
            layout,
            items: vec![
                BindGroupItem::texture(texture, TextureRange::whole(), None),
                BindGroupItem::sampler(sampler),
                BindGroupItem::buffer(buffer, BufferRange::new(0, 64), None),
            ],
        };
        let pools = Arc::new(DescriptorSetPools::new(
            device.clone(),
            DescriptorPoolSettings { base_size: 4 },
        ));
        let store = BindGroupStore::new(device.clone(), Some(pools), true);
        Fixture {
            device,
            store,
            desc,
            texture,
            buffer,
        }
    }

    #[test]
    fn create_tracks_every_referenced_resource() {
        let f = fixture();
        let handle = f.store.create_bind_group(&f.desc).expect("bind group");
        assert!(f.store.is_valid(handle));
        assert_eq!(f.store.dependencies_of(handle).len(), 3);
        assert_eq!(f.device.live_descriptor_sets(), 1);
    }

    #[test]
    fn destroyed_texture_invalidates_bind_group() {
        let f = fixture();
        let handle = f.store.create_bind_group(&f.desc).expect("bind group");

        let invalidated = f.store.resource_destroyed(f.texture);
        assert_eq!(invalidated, vec![handle]);
        assert!(f.store.is_invalidated(handle));
        assert!(f.device.bind_group(handle).is_none());

        // Already untracked: the buffer going away reports nothing.
        assert!(f.store.resource_destroyed(f.buffer).is_empty());

        f.store.destroy_bind_group(handle);
        assert!(!f.store.is_invalidated(handle));
        assert!(f.store.is_empty());
    }

    #[test]
    fn descriptor_sets_wait_for_frame_completion() {
        let f = fixture();
        let handle = f.store.create_bind_group(&f.desc).expect("bind group");
        let frame = f.store.current_frame();
        f.store.destroy_bind_group(handle);

        assert_eq!(f.store.pending_reclaim_count(), 1);
        f.store.begin_frame();
        assert_eq!(f.device.live_descriptor_sets(), 1);

        assert_eq!(f.store.frame_completed(frame), 1);
        f.store.begin_frame();
        assert_eq!(f.device.live_descriptor_sets(), 0);
    }

    #[test]
    fn frame_completed_keeps_later_frames() {
        let f = fixture();
        let a = f.store.create_bind_group(&f.desc).expect("a");
        let b = f.store.create_bind_group(&f.desc).expect("b");
        f.store.destroy_bind_group(a);
        let first = f.store.current_frame();
        f.store.begin_frame();
        f.store.destroy_bind_group(b);

        assert_eq!(f.store.frame_completed(first), 1);
        assert_eq!(f.store.pending_reclaim_count(), 1);
    }

    #[test]
    fn second_dependency_does_not_invalidate_twice() {
        let f = fixture();
        let handle = f.store.create_bind_group(&f.desc).expect("bind group");
        // Re-track by hand, as if the buffer's invalidation raced the texture's.
        assert_eq!(f.store.resource_destroyed(f.texture), vec![handle]);
        f.store.tracker.add_resource(handle, [ResourceId::from(f.buffer)]);

        assert!(f.store.resource_destroyed(f.buffer).is_empty());
        assert_eq!(f.device.counts(HandleKind::BindGroup).destroyed, 1);
        assert_eq!(f.store.pending_reclaim_count(), 1);
        f.store.tracker.remove_resource(handle);
        f.store.destroy_bind_group(handle);
    }

    #[test]
    fn retired_sets_stay_in_frame_order_across_threads() {
        let f = Arc::new(fixture());
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let f = Arc::clone(&f);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let handle = f.store.create_bind_group(&f.desc).expect("bind group");
                        f.store.destroy_bind_group(handle);
                    }
                })
            })
            .collect();
        for _ in 0..50 {
            f.store.begin_frame();
        }
        for worker in workers {
            worker.join().expect("worker panicked");
        }

        let frames: Vec<u64> = f.store.retired.lock().iter().map(|r| r.frame).collect();
        assert_eq!(frames.len(), 200);
        assert!(frames.windows(2).all(|w| w[0] <= w[1]));

        let last = f.store.current_frame() - 1;
        let expected = frames.iter().filter(|&&frame| frame <= last).count();
        assert_eq!(f.store.frame_completed(last), expected);
        assert!(
            f.store
                .retired
                .lock()
                .iter()
                .all(|r| r.frame > last)
        );
    }

    #[test]
    fn concurrent_destroy_and_invalidation_release_once() {
        let f = Arc::new(fixture());
        let handles: Vec<_> = (0..32)
            .map(|_| f.store.create_bind_group(&f.desc).expect("bind group"))
            .collect();

        let destroyer = {
            let f = Arc::clone(&f);
            std::thread::spawn(move || {
                for handle in handles {
                    f.store.destroy_bind_group(handle);
                }
            })
        };
        let invalidated = f.store.resource_destroyed(f.texture);
        destroyer.join().expect("destroyer panicked");

        let counts = f.device.counts(HandleKind::BindGroup);
        assert_eq!(counts.live(), 0);
        assert_eq!(counts.destroyed, 32);
        assert_eq!(f.store.pending_reclaim_count(), 32);
        // Invalidated handles the destroyer had not reached yet were still
        // forgotten by it afterwards.
        assert!(invalidated.len() <= 32);
        assert!(f.store.is_empty());
    }

    #[test]
    fn invalid_description_is_rejected_before_allocation() {
        let f = fixture();
        let mut desc = f.desc.clone();
        desc.items.pop();
        assert!(matches!(
            f.store.create_bind_group(&desc),
            Err(GalError::LayoutViolation(_))
        ));
        assert_eq!(f.device.live_descriptor_sets(), 0);
    }

    #[test]
    fn device_failure_returns_the_allocated_set() {
        let f = fixture();
        f.device.set_failing(HandleKind::BindGroup, true);
        assert!(f.store.create_bind_group(&f.desc).is_err());
        f.store.begin_frame();
        assert_eq!(f.device.live_descriptor_sets(), 0);
    }

    #[test]
    fn shutdown_releases_everything() {
        let f = fixture();
        f.store.create_bind_group(&f.desc).expect("a");
        f.store.create_bind_group(&f.desc).expect("b");
        f.store.shutdown();
        assert!(f.store.is_empty());
        assert_eq!(f.device.counts(HandleKind::BindGroup).live(), 0);
        assert_eq!(f.device.live_descriptor_sets(), 0);
    }
}
