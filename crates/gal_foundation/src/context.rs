//! Binding Core Context
//!
//! [`GalContext`] ties the per-device registries to one device's lifetime.
//! It is created right after the device and shut down right before it:
//!
//! ```text
//! initialize: immutable samplers → fallback resources → pipeline cache
//!             → descriptor pools → bind group store
//! shutdown:   the same in reverse
//! ```
//!
//! Every registry is an owned object, so several devices (or repeated test
//! setups) can coexist. After [`GalContext::shutdown`] every accessor returns
//! [`GalError::NotInitialized`].
//!
//! Render code destroys buffers, textures, samplers and shaders through the
//! context instead of the device, so dependent bind groups and pipelines are
//! invalidated before the object disappears.

use std::sync::Arc;

use gal_core::{
    BindGroupDesc, BindGroupHandle, BindGroupLayoutDesc, BindGroupLayoutHandle, BufferHandle,
    DescriptorBackend, Device, GalError, GalSettings, Result, SamplerDesc, SamplerHandle,
    ShaderHandle, TextureHandle,
};
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};

use crate::bind_group_store::BindGroupStore;
use crate::descriptor_pool::DescriptorSetPools;
use crate::fallback_resources::FallbackResources;
use crate::immutable_samplers::ImmutableSamplers;
use crate::pipeline_cache::PipelineCache;

const NAME: &str = "GalContext";

struct ContextState {
    samplers: ImmutableSamplers,
    fallbacks: FallbackResources,
    pipelines: Arc<PipelineCache>,
    pools: Option<Arc<DescriptorSetPools>>,
    bind_groups: Arc<BindGroupStore>,
}

pub struct GalContext {
    device: Arc<dyn Device>,
    settings: GalSettings,
    state: RwLock<Option<ContextState>>,
}

impl GalContext {
    /// Creates every registry for `device`.
    ///
    /// `backend` is `None` on flat-slot backends. On failure everything
    /// created so far is destroyed again.
    pub fn initialize(
        device: Arc<dyn Device>,
        backend: Option<Arc<dyn DescriptorBackend>>,
        settings: GalSettings,
    ) -> Result<Arc<Self>> {
        let mut samplers = ImmutableSamplers::initialize(device.as_ref())?;
        let fallbacks = match FallbackResources::initialize(device.as_ref(), &settings.fallback) {
            Ok(fallbacks) => fallbacks,
            Err(err) => {
                samplers.shutdown(device.as_ref());
                return Err(err);
            }
        };

        let pipelines = Arc::new(PipelineCache::new(Arc::clone(&device)));
        let pools = backend.map(|backend| {
            Arc::new(DescriptorSetPools::new(
                backend,
                settings.descriptor_pool.clone(),
            ))
        });
        let bind_groups = Arc::new(BindGroupStore::new(
            Arc::clone(&device),
            pools.clone(),
            settings.validate_bindings,
        ));

        log::info!(
            "GalContext: initialized ({} immutable samplers, {} fallback textures, {} fallback buffers)",
            samplers.len(),
            fallbacks.texture_count(),
            fallbacks.buffer_count()
        );

        Ok(Arc::new(Self {
            device,
            settings,
            state: RwLock::new(Some(ContextState {
                samplers,
                fallbacks,
                pipelines,
                pools,
                bind_groups,
            })),
        }))
    }

    /// Tears every registry down. Calling it again is a no-op.
    pub fn shutdown(&self) {
        let Some(mut state) = self.state.write().take() else {
            return;
        };
        let device = self.device.as_ref();

        state.bind_groups.shutdown();
        if let Some(pools) = &state.pools {
            let leaked = pools.shutdown();
            if leaked > 0 {
                log::error!("GalContext: {leaked} descriptor sets leaked at shutdown");
            }
        }
        state.pipelines.clear();
        state.fallbacks.shutdown(device);
        state.samplers.shutdown(device);
        log::info!("GalContext: shut down");
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.read().is_some()
    }

    #[inline]
    #[must_use]
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &GalSettings {
        &self.settings
    }

    // ─── Registries ──────────────────────────────────────────────────────────

    fn read<T: ?Sized>(
        &self,
        f: impl FnOnce(&ContextState) -> &T,
    ) -> Result<MappedRwLockReadGuard<'_, T>> {
        RwLockReadGuard::try_map(self.state.read(), |state| state.as_ref().map(f))
            .map_err(|_| GalError::NotInitialized(NAME))
    }

    pub fn fallback_resources(&self) -> Result<MappedRwLockReadGuard<'_, FallbackResources>> {
        self.read(|state| &state.fallbacks)
    }

    pub fn immutable_samplers(&self) -> Result<MappedRwLockReadGuard<'_, ImmutableSamplers>> {
        self.read(|state| &state.samplers)
    }

    pub fn pipeline_cache(&self) -> Result<Arc<PipelineCache>> {
        self.read(|state| &state.pipelines).map(|p| Arc::clone(&*p))
    }

    pub fn bind_group_store(&self) -> Result<Arc<BindGroupStore>> {
        self.read(|state| &state.bind_groups).map(|s| Arc::clone(&*s))
    }

    /// `Ok(None)` on flat-slot backends.
    pub fn descriptor_pools(&self) -> Result<Option<Arc<DescriptorSetPools>>> {
        self.read(|state| &state.pools).map(|p| (*p).clone())
    }

    /// Registers an additional immutable sampler. Layouts created afterwards
    /// bake it like the built-in ones.
    pub fn register_immutable_sampler(
        &self,
        name: &str,
        desc: SamplerDesc,
    ) -> Result<SamplerHandle> {
        let mut guard = self.state.write();
        let state = guard.as_mut().ok_or(GalError::NotInitialized(NAME))?;
        state.samplers.register(self.device.as_ref(), name, desc)
    }

    // ─── Device Façade ───────────────────────────────────────────────────────

    /// Creates a bind group layout, baking reserved sampler bindings into it
    /// when the device supports immutable samplers.
    pub fn create_bind_group_layout(
        &self,
        mut desc: BindGroupLayoutDesc,
    ) -> Result<BindGroupLayoutHandle> {
        self.immutable_samplers()?
            .apply_to_layout(&mut desc, self.device.capabilities());
        desc.validate()?;
        self.device.create_bind_group_layout(&desc)
    }

    pub fn create_bind_group(&self, desc: &BindGroupDesc) -> Result<BindGroupHandle> {
        self.bind_group_store()?.create_bind_group(desc)
    }

    pub fn destroy_bind_group(&self, handle: BindGroupHandle) {
        if let Ok(store) = self.bind_group_store() {
            store.destroy_bind_group(handle);
        }
    }

    pub fn destroy_buffer(&self, handle: BufferHandle) {
        self.invalidate_dependents(handle.into());
        self.device.destroy_buffer(handle);
    }

    pub fn destroy_texture(&self, handle: TextureHandle) {
        self.invalidate_dependents(handle.into());
        self.device.destroy_texture(handle);
    }

    pub fn destroy_sampler(&self, handle: SamplerHandle) {
        self.invalidate_dependents(handle.into());
        self.device.destroy_sampler(handle);
    }

    /// Evicts every pipeline built from `handle`, then destroys the shader.
    pub fn destroy_shader(&self, handle: ShaderHandle) {
        if let Ok(pipelines) = self.pipeline_cache() {
            pipelines.shader_destroyed(handle);
        }
        self.device.destroy_shader(handle);
    }

    fn invalidate_dependents(&self, resource: gal_core::ResourceId) {
        if let Ok(store) = self.bind_group_store() {
            let invalidated = store.resource_destroyed(resource);
            if !invalidated.is_empty() {
                log::debug!(
                    "GalContext: {resource:?} destroyed, {} bind groups invalidated",
                    invalidated.len()
                );
            }
        }
    }

    // ─── Frame Protocol ──────────────────────────────────────────────────────

    /// Sweeps descriptor pools and advances the frame index.
    pub fn begin_frame(&self) -> Result<u64> {
        Ok(self.bind_group_store()?.begin_frame())
    }

    /// The GPU finished `frame`: its retired descriptor sets become reusable
    /// at the next [`begin_frame`](Self::begin_frame).
    pub fn frame_completed(&self, frame: u64) -> Result<usize> {
        Ok(self.bind_group_store()?.frame_completed(frame))
    }
}

impl Drop for GalContext {
    fn drop(&mut self) {
        if self.state.get_mut().is_some() {
            log::warn!("GalContext: dropped without shutdown");
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gal_core::{HandleKind, ShaderResourceBinding, ShaderResourceType};
    use gal_dev_utils::RecordingDevice;

    fn context(device: &Arc<RecordingDevice>) -> Arc<GalContext> {
        GalContext::initialize(
            device.clone(),
            Some(device.clone()),
            GalSettings::default(),
        )
        .expect("context")
    }

    #[test]
    fn shutdown_is_idempotent_and_releases_everything() {
        let device = Arc::new(RecordingDevice::new());
        let ctx = context(&device);
        assert!(device.counts(HandleKind::Texture).live() > 0);

        ctx.shutdown();
        ctx.shutdown();
        assert!(!ctx.is_initialized());
        assert_eq!(device.counts(HandleKind::Texture).live(), 0);
        assert_eq!(device.counts(HandleKind::Buffer).live(), 0);
        assert_eq!(device.counts(HandleKind::Sampler).live(), 0);
    }

    #[test]
    fn accessors_fail_after_shutdown() {
        let device = Arc::new(RecordingDevice::new());
        let ctx = context(&device);
        ctx.shutdown();
        assert!(matches!(
            ctx.pipeline_cache(),
            Err(GalError::NotInitialized(_))
        ));
        assert!(ctx.fallback_resources().is_err());
        assert!(ctx.begin_frame().is_err());
    }

    #[test]
    fn failed_initialization_cleans_up() {
        let device = Arc::new(RecordingDevice::new());
        device.set_failing(HandleKind::Buffer, true);
        assert!(GalContext::initialize(device.clone(), None, GalSettings::default()).is_err());
        assert_eq!(device.counts(HandleKind::Sampler).live(), 0);
        assert_eq!(device.counts(HandleKind::Texture).live(), 0);
    }

    #[test]
    fn layouts_bake_reserved_samplers() {
        let device = Arc::new(RecordingDevice::new());
        let ctx = context(&device);
        let layout = ctx
            .create_bind_group_layout(BindGroupLayoutDesc::new(vec![
                ShaderResourceBinding::new("Albedo", ShaderResourceType::Texture, 0, 0),
                ShaderResourceBinding::new("PointSampler", ShaderResourceType::Sampler, 0, 1),
            ]))
            .expect("layout");
        let desc = device.bind_group_layout_desc(layout).expect("desc");
        assert_eq!(desc.bindings.len(), 1);
        assert_eq!(desc.immutable_samplers.len(), 1);
        ctx.shutdown();
    }

    #[test]
    fn flat_slot_backend_has_no_pools() {
        let device = Arc::new(RecordingDevice::new());
        let ctx =
            GalContext::initialize(device.clone(), None, GalSettings::default()).expect("ctx");
        assert!(ctx.descriptor_pools().expect("initialized").is_none());
        ctx.shutdown();
    }
}
