//! Immutable Samplers
//!
//! A small registry of named sampler states created with the device. On
//! backends that support it, sampler bindings with one of these names are
//! baked into the bind group layout and never appear as bind group items.
//! Elsewhere the bind group builder pre-binds them by name every frame.
//!
//! The names are reserved: render code must not bind a sampler under any of
//! them manually.

use gal_core::{
    BindGroupLayoutDesc, Device, DeviceCapabilities, GalError, HashedName, Result, SamplerDesc,
    SamplerHandle, ShaderResourceType, TempHashedName,
};
use rustc_hash::FxHashMap;

pub const LINEAR_SAMPLER: &str = "LinearSampler";
pub const LINEAR_CLAMP_SAMPLER: &str = "LinearClampSampler";
pub const POINT_SAMPLER: &str = "PointSampler";
pub const POINT_CLAMP_SAMPLER: &str = "PointClampSampler";

struct Entry {
    name: HashedName,
    desc: SamplerDesc,
    handle: SamplerHandle,
}

#[derive(Default)]
pub struct ImmutableSamplers {
    entries: Vec<Entry>,
    by_name: FxHashMap<TempHashedName, usize>,
}

impl ImmutableSamplers {
    /// Creates the four built-in samplers on `device`.
    pub fn initialize(device: &dyn Device) -> Result<Self> {
        use wgpu::{AddressMode, FilterMode};

        let mut samplers = Self::default();
        let defaults = [
            (LINEAR_SAMPLER, FilterMode::Linear, AddressMode::Repeat),
            (LINEAR_CLAMP_SAMPLER, FilterMode::Linear, AddressMode::ClampToEdge),
            (POINT_SAMPLER, FilterMode::Nearest, AddressMode::Repeat),
            (POINT_CLAMP_SAMPLER, FilterMode::Nearest, AddressMode::ClampToEdge),
        ];
        for (name, filter, address) in defaults {
            if let Err(err) = samplers.register(device, name, SamplerDesc::new(filter, address)) {
                samplers.shutdown(device);
                return Err(err);
            }
        }
        Ok(samplers)
    }

    /// Creates and registers an additional named sampler.
    pub fn register(
        &mut self,
        device: &dyn Device,
        name: &str,
        desc: SamplerDesc,
    ) -> Result<SamplerHandle> {
        let key = TempHashedName::new(name);
        if self.by_name.contains_key(&key) {
            return Err(GalError::LayoutViolation(format!(
                "immutable sampler '{name}' is already registered"
            )));
        }
        let handle = device.create_sampler(&desc)?;
        self.by_name.insert(key, self.entries.len());
        self.entries.push(Entry {
            name: HashedName::new(name),
            desc,
            handle,
        });
        Ok(handle)
    }

    #[must_use]
    pub fn get(&self, name: impl Into<TempHashedName>) -> Option<SamplerHandle> {
        self.by_name
            .get(&name.into())
            .map(|&index| self.entries[index].handle)
    }

    #[must_use]
    pub fn desc(&self, name: impl Into<TempHashedName>) -> Option<SamplerDesc> {
        self.by_name
            .get(&name.into())
            .map(|&index| self.entries[index].desc)
    }

    #[inline]
    #[must_use]
    pub fn is_reserved(&self, name: impl Into<TempHashedName>) -> bool {
        self.by_name.contains_key(&name.into())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HashedName, SamplerHandle)> {
        self.entries.iter().map(|e| (&e.name, e.handle))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Moves sampler bindings named after an immutable sampler out of
    /// `layout.bindings` into `layout.immutable_samplers`.
    ///
    /// Does nothing when the device cannot bake samplers into layouts.
    pub fn apply_to_layout(&self, layout: &mut BindGroupLayoutDesc, caps: DeviceCapabilities) {
        if !caps.immutable_samplers {
            return;
        }
        let bindings = std::mem::take(&mut layout.bindings);
        let (baked, kept): (Vec<_>, Vec<_>) = bindings.into_iter().partition(|binding| {
            binding.resource_type == ShaderResourceType::Sampler && self.is_reserved(&binding.name)
        });
        layout.bindings = kept;
        layout.immutable_samplers.extend(baked);
    }

    pub fn shutdown(&mut self, device: &dyn Device) {
        for entry in self.entries.drain(..) {
            device.destroy_sampler(entry.handle);
        }
        self.by_name.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gal_core::{HandleKind, ShaderResourceBinding};
    use gal_dev_utils::RecordingDevice;

    #[test]
    fn initialize_creates_four_reserved_samplers() {
        let device = RecordingDevice::new();
        let mut samplers = ImmutableSamplers::initialize(&device).expect("samplers");

        assert_eq!(samplers.len(), 4);
        assert!(samplers.is_reserved(LINEAR_CLAMP_SAMPLER));
        assert!(!samplers.is_reserved("AlbedoSampler"));
        assert_eq!(
            samplers.desc(POINT_SAMPLER).map(|d| d.min_filter),
            Some(wgpu::FilterMode::Nearest)
        );

        samplers.shutdown(&device);
        assert_eq!(device.counts(HandleKind::Sampler).live(), 0);
    }

    #[test]
    fn apply_to_layout_moves_reserved_samplers() {
        let device = RecordingDevice::new();
        let samplers = ImmutableSamplers::initialize(&device).expect("samplers");
        let mut layout = BindGroupLayoutDesc::new(vec![
            ShaderResourceBinding::new("Albedo", ShaderResourceType::Texture, 0, 0),
            ShaderResourceBinding::new(LINEAR_SAMPLER, ShaderResourceType::Sampler, 0, 1),
            ShaderResourceBinding::new("Custom", ShaderResourceType::Sampler, 0, 2),
        ]);

        samplers.apply_to_layout(
            &mut layout,
            DeviceCapabilities {
                immutable_samplers: false,
                ..Default::default()
            },
        );
        assert_eq!(layout.bindings.len(), 3);

        samplers.apply_to_layout(&mut layout, device.capabilities());
        assert_eq!(layout.bindings.len(), 2);
        assert_eq!(layout.immutable_samplers.len(), 1);
        assert_eq!(layout.immutable_samplers[0].slot, 1);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let device = RecordingDevice::new();
        let mut samplers = ImmutableSamplers::initialize(&device).expect("samplers");
        let result = samplers.register(&device, POINT_SAMPLER, SamplerDesc::default());
        assert!(matches!(result, Err(GalError::LayoutViolation(_))));
        assert_eq!(device.counts(HandleKind::Sampler).created, 4);
    }
}
