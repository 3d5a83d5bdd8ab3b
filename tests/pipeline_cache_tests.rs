//! Pipeline Cache Tests
//!
//! Tests for:
//! - Dedup: repeated lookups return the same handle with one device creation
//! - Pre-hashed descriptors share entries with plain lookups
//! - Concurrent misses: at most one live pipeline per descriptor
//! - Failures: returned to the caller, never cached, retried on next lookup
//! - Shader eviction: only pipelines built from the destroyed shader go away
//! - clear(): destroys everything

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use rustc_hash::FxHashSet;

use gal::{
    ComputePipelineDesc, Device, GalError, GraphicsPipelineDesc, HandleKind,
    HashedComputePipelineDesc, HashedGraphicsPipelineDesc, PipelineCache, ShaderDesc,
    ShaderHandle,
};
use gal_dev_utils::{RecordingDevice, init_test_logging};

fn setup() -> (Arc<RecordingDevice>, Arc<PipelineCache>) {
    init_test_logging();
    let device = Arc::new(RecordingDevice::new());
    let cache = Arc::new(PipelineCache::new(device.clone()));
    (device, cache)
}

fn shader(device: &RecordingDevice, name: &str) -> ShaderHandle {
    device
        .create_shader(&ShaderDesc {
            name: name.to_owned(),
            ..ShaderDesc::default()
        })
        .expect("shader")
}

// ============================================================================
// Dedup
// ============================================================================

#[test]
fn repeated_lookups_create_once() -> anyhow::Result<()> {
    let (device, cache) = setup();
    let desc = GraphicsPipelineDesc::new(shader(&device, "lit"));

    let first = cache.get_graphics_pipeline(&desc)?;
    for _ in 0..10 {
        assert_eq!(cache.get_graphics_pipeline(&desc)?, first);
    }

    assert_eq!(device.pipeline_creations_for(desc.calculate_hash()), 1);
    assert_eq!(device.counts(HandleKind::GraphicsPipeline).created, 1);
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 10);
    Ok(())
}

#[test]
fn distinct_state_creates_distinct_pipelines() -> anyhow::Result<()> {
    let (device, cache) = setup();
    let base = GraphicsPipelineDesc::new(shader(&device, "lit"));
    let mut wireframe = base.clone();
    wireframe.rasterizer.polygon_mode = wgpu::PolygonMode::Line;

    let a = cache.get_graphics_pipeline(&base)?;
    let b = cache.get_graphics_pipeline(&wireframe)?;
    assert_ne!(a, b);
    assert_eq!(cache.graphics_pipeline_count(), 2);
    Ok(())
}

#[test]
fn hashed_and_plain_lookups_share_entries() -> anyhow::Result<()> {
    let (device, cache) = setup();
    let mut desc = GraphicsPipelineDesc::new(shader(&device, "skinned"));
    desc.targets.color.push(wgpu::TextureFormat::Rgba16Float);
    let hashed = HashedGraphicsPipelineDesc::new(desc.clone());

    let first = cache.get_graphics_pipeline_hashed(&hashed)?;
    assert_eq!(cache.get_graphics_pipeline(&desc)?, first);
    assert_eq!(cache.get_graphics_pipeline_hashed(&hashed)?, first);

    let compute = HashedComputePipelineDesc::new(ComputePipelineDesc::new(desc.shader));
    let dispatch = cache.get_compute_pipeline_hashed(&compute)?;
    assert_eq!(cache.get_compute_pipeline(compute.desc())?, dispatch);

    assert_eq!(device.counts(HandleKind::GraphicsPipeline).created, 1);
    assert_eq!(device.counts(HandleKind::ComputePipeline).created, 1);
    assert_eq!(cache.stats().hits, 3);
    Ok(())
}

#[test]
fn graphics_and_compute_tables_are_separate() -> anyhow::Result<()> {
    let (device, cache) = setup();
    let s = shader(&device, "shared");
    cache.get_graphics_pipeline(&GraphicsPipelineDesc::new(s))?;
    cache.get_compute_pipeline(&ComputePipelineDesc::new(s))?;
    assert_eq!(cache.graphics_pipeline_count(), 1);
    assert_eq!(cache.compute_pipeline_count(), 1);
    Ok(())
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn concurrent_misses_leave_one_live_pipeline() {
    let (device, cache) = setup();
    device.set_pipeline_creation_delay(Duration::from_millis(20));
    let desc = GraphicsPipelineDesc::new(shader(&device, "contended"));

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let workers: Vec<_> = (0..threads)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            let desc = desc.clone();
            thread::spawn(move || {
                barrier.wait();
                cache.get_graphics_pipeline(&desc).expect("pipeline")
            })
        })
        .collect();

    let handles: FxHashSet<_> = workers
        .into_iter()
        .map(|w| w.join().expect("worker panicked"))
        .collect();

    assert_eq!(handles.len(), 1, "every caller must see the same handle");
    assert_eq!(device.counts(HandleKind::GraphicsPipeline).live(), 1);
    assert_eq!(cache.graphics_pipeline_count(), 1);

    let counts = device.counts(HandleKind::GraphicsPipeline);
    let stats = cache.stats();
    assert_eq!(stats.races_lost as usize, counts.destroyed);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn failure_is_not_cached() {
    let (device, cache) = setup();
    let s = shader(&device, "broken");
    let desc = ComputePipelineDesc::new(s);

    device.set_shader_broken(s, true);
    assert!(matches!(
        cache.get_compute_pipeline(&desc),
        Err(GalError::DeviceCreationFailed { .. })
    ));
    assert_eq!(cache.compute_pipeline_count(), 0);

    // Hot reload fixed the shader.
    device.set_shader_broken(s, false);
    assert!(cache.get_compute_pipeline(&desc).is_ok());
    assert_eq!(cache.stats().creation_failures, 1);
}

// ============================================================================
// Eviction
// ============================================================================

#[test]
fn shader_destruction_evicts_only_its_pipelines() -> anyhow::Result<()> {
    let (device, cache) = setup();
    let old = shader(&device, "old");
    let other = shader(&device, "other");

    let a = cache.get_graphics_pipeline(&GraphicsPipelineDesc::new(old))?;
    let b = cache.get_compute_pipeline(&ComputePipelineDesc::new(old))?;
    let c = cache.get_graphics_pipeline(&GraphicsPipelineDesc::new(other))?;

    assert_eq!(cache.shader_destroyed(old), 2);
    assert!(!device.is_graphics_pipeline_alive(a));
    assert!(!device.is_compute_pipeline_alive(b));
    assert!(device.is_graphics_pipeline_alive(c));
    assert_eq!(cache.shader_destroyed(old), 0);
    Ok(())
}

#[test]
fn clear_destroys_everything() -> anyhow::Result<()> {
    let (device, cache) = setup();
    let s = shader(&device, "s");
    cache.get_graphics_pipeline(&GraphicsPipelineDesc::new(s))?;
    cache.get_compute_pipeline(&ComputePipelineDesc::new(s))?;

    cache.clear();
    assert_eq!(device.counts(HandleKind::GraphicsPipeline).live(), 0);
    assert_eq!(device.counts(HandleKind::ComputePipeline).live(), 0);
    assert_eq!(cache.shader_destroyed(s), 0);
    Ok(())
}
