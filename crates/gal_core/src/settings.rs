//! Binding Core Settings
//!
//! [`GalSettings`] is handed to `GalContext::initialize` and stays fixed for
//! the lifetime of the context. Every field has a default, so partial
//! configurations deserialize cleanly:
//!
//! ```rust,ignore
//! let settings: GalSettings = serde_json::from_str(r#"{
//!     "descriptor_pool": { "base_size": 32 }
//! }"#)?;
//! ```

use serde::{Deserialize, Serialize};

/// Sizing of descriptor-set pools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorPoolSettings {
    /// Capacity (in sets) of the first sub-pool of every pool. Later
    /// sub-pools double in size.
    pub base_size: u32,
}

impl Default for DescriptorPoolSettings {
    fn default() -> Self {
        Self { base_size: 64 }
    }
}

/// Dimensions of the placeholder resources bound to empty slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackSettings {
    /// Edge length of every fallback texture.
    pub texture_size: u32,
    pub constant_buffer_size: u64,
    pub structured_buffer_stride: u32,
    pub structured_buffer_elements: u32,
    pub texel_buffer_size: u64,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            texture_size: 4,
            constant_buffer_size: 128,
            structured_buffer_stride: 128,
            structured_buffer_elements: 10,
            texel_buffer_size: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GalSettings {
    pub descriptor_pool: DescriptorPoolSettings,
    pub fallback: FallbackSettings,
    /// Check handles against the device on every bind call.
    pub validate_bindings: bool,
}

impl Default for GalSettings {
    fn default() -> Self {
        Self {
            descriptor_pool: DescriptorPoolSettings::default(),
            fallback: FallbackSettings::default(),
            validate_bindings: cfg!(debug_assertions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let settings: GalSettings =
            serde_json::from_str(r#"{ "descriptor_pool": { "base_size": 32 } }"#)
                .expect("valid settings json");
        assert_eq!(settings.descriptor_pool.base_size, 32);
        assert_eq!(settings.fallback, FallbackSettings::default());
    }

    #[test]
    fn defaults() {
        let settings = GalSettings::default();
        assert_eq!(settings.descriptor_pool.base_size, 64);
        assert_eq!(settings.fallback.texture_size, 4);
        assert_eq!(settings.fallback.constant_buffer_size, 128);
    }
}
