//! Fallback Resources
//!
//! Placeholder textures and buffers bound to layout slots the render code
//! left empty. One device object usually serves several binding shapes,
//! e.g. the colour 2D texture also backs `Texture2DArray` slots.
//!
//! | Binding shape                              | Object                          |
//! |--------------------------------------------|---------------------------------|
//! | 2D / 2D array (colour)                     | 2D, `Bgra8UnormSrgb`            |
//! | 2D / 2D array (depth)                      | 2D, `Depth16Unorm`              |
//! | 2D MS / 2D MS array                        | 2D, 4x MSAA (if supported)      |
//! | Cube / cube array                          | Cube, `Bgra8UnormSrgb`          |
//! | 3D                                         | 3D, `Bgra8UnormSrgb`            |
//! | RW 2D / RW 2D array                        | 2D, `Rgba16Float`, UAV          |
//! | Constant / structured / texel / raw buffer | one buffer per resource type    |

use gal_core::{
    BufferDesc, BufferHandle, Device, FallbackSettings, Result, ShaderResourceType,
    ShaderTextureType, TextureDesc, TextureHandle, TextureType,
};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FallbackTextureKey {
    pub resource_type: ShaderResourceType,
    pub texture_type: ShaderTextureType,
    pub depth: bool,
}

#[derive(Default)]
pub struct FallbackResources {
    textures: FxHashMap<FallbackTextureKey, TextureHandle>,
    buffers: FxHashMap<ShaderResourceType, BufferHandle>,
    owned_textures: Vec<TextureHandle>,
    owned_buffers: Vec<BufferHandle>,
}

impl FallbackResources {
    /// Creates every fallback object on `device`.
    ///
    /// On failure the objects created so far are destroyed again.
    pub fn initialize(device: &dyn Device, settings: &FallbackSettings) -> Result<Self> {
        let mut resources = Self::default();
        if let Err(err) = resources.create_all(device, settings) {
            log::error!("FallbackResources: initialization failed: {err}");
            resources.shutdown(device);
            return Err(err);
        }
        log::debug!(
            "FallbackResources: created {} textures and {} buffers",
            resources.owned_textures.len(),
            resources.owned_buffers.len()
        );
        Ok(resources)
    }

    fn create_all(&mut self, device: &dyn Device, settings: &FallbackSettings) -> Result<()> {
        use ShaderResourceType as R;
        use ShaderTextureType as T;

        let size = settings.texture_size;
        let sampled = [R::Texture, R::TextureAndSampler];

        let colour = self.texture(
            device,
            TextureDesc::new_2d(size, size, wgpu::TextureFormat::Bgra8UnormSrgb),
        )?;
        self.map_textures(&sampled, &[T::Texture2D, T::Texture2DArray], false, colour);

        let depth = self.texture(
            device,
            TextureDesc {
                is_render_target: true,
                ..TextureDesc::new_2d(size, size, wgpu::TextureFormat::Depth16Unorm)
            },
        )?;
        self.map_textures(&sampled, &[T::Texture2D, T::Texture2DArray], true, depth);

        if device.capabilities().msaa4x {
            let msaa = self.texture(
                device,
                TextureDesc {
                    sample_count: 4,
                    ..TextureDesc::new_2d(size, size, wgpu::TextureFormat::Bgra8UnormSrgb)
                },
            )?;
            self.map_textures(&sampled, &[T::Texture2DMS, T::Texture2DMSArray], false, msaa);
        }

        let cube = self.texture(
            device,
            TextureDesc::new_cube(size, wgpu::TextureFormat::Bgra8UnormSrgb),
        )?;
        self.map_textures(&sampled, &[T::TextureCube, T::TextureCubeArray], false, cube);

        let volume = self.texture(
            device,
            TextureDesc::new_3d(size, size, size, wgpu::TextureFormat::Bgra8UnormSrgb),
        )?;
        self.map_textures(&sampled, &[T::Texture3D], false, volume);

        let storage = self.texture(
            device,
            TextureDesc {
                allow_unordered_access_view: true,
                ..TextureDesc::new_2d(size, size, wgpu::TextureFormat::Rgba16Float)
            },
        )?;
        self.map_textures(&[R::TextureRW], &[T::Texture2D, T::Texture2DArray], false, storage);

        let stride = settings.structured_buffer_stride;
        let elements = settings.structured_buffer_elements;
        let texel_size = settings.texel_buffer_size;
        let buffers = [
            (
                R::ConstantBuffer,
                BufferDesc::constant(settings.constant_buffer_size),
            ),
            (R::StructuredBuffer, BufferDesc::structured(stride, elements, false)),
            (R::StructuredBufferRW, BufferDesc::structured(stride, elements, true)),
            (
                R::TexelBuffer,
                BufferDesc::texel(texel_size, wgpu::TextureFormat::R32Uint, false),
            ),
            (
                R::TexelBufferRW,
                BufferDesc::texel(texel_size, wgpu::TextureFormat::R32Uint, true),
            ),
            (R::ByteAddressBuffer, BufferDesc::byte_address(texel_size, false)),
            (R::ByteAddressBufferRW, BufferDesc::byte_address(texel_size, true)),
        ];
        for (resource_type, desc) in buffers {
            let handle = device.create_buffer(&desc)?;
            self.owned_buffers.push(handle);
            self.buffers.insert(resource_type, handle);
        }
        Ok(())
    }

    fn texture(&mut self, device: &dyn Device, desc: TextureDesc) -> Result<TextureHandle> {
        debug_assert!(desc.texture_type == TextureType::Texture3D || desc.depth == 1);
        let handle = device.create_texture(&desc)?;
        self.owned_textures.push(handle);
        Ok(handle)
    }

    fn map_textures(
        &mut self,
        resource_types: &[ShaderResourceType],
        texture_types: &[ShaderTextureType],
        depth: bool,
        handle: TextureHandle,
    ) {
        for &resource_type in resource_types {
            for &texture_type in texture_types {
                self.textures.insert(
                    FallbackTextureKey {
                        resource_type,
                        texture_type,
                        depth,
                    },
                    handle,
                );
            }
        }
    }

    /// Fallback buffer for a buffer-typed binding.
    #[must_use]
    pub fn fallback_buffer(&self, resource_type: ShaderResourceType) -> Option<BufferHandle> {
        self.buffers.get(&resource_type).copied()
    }

    /// Fallback texture for a texture-typed binding.
    ///
    /// `None` for shapes the device cannot provide (e.g. MSAA without
    /// 4x support) and for non-texture resource types.
    #[must_use]
    pub fn fallback_texture(
        &self,
        resource_type: ShaderResourceType,
        texture_type: ShaderTextureType,
        depth: bool,
    ) -> Option<TextureHandle> {
        self.textures
            .get(&FallbackTextureKey {
                resource_type,
                texture_type,
                depth,
            })
            .copied()
    }

    /// `true` if `texture` is one of the fallback textures.
    #[must_use]
    pub fn owns_texture(&self, texture: TextureHandle) -> bool {
        self.owned_textures.contains(&texture)
    }

    #[must_use]
    pub fn owns_buffer(&self, buffer: BufferHandle) -> bool {
        self.owned_buffers.contains(&buffer)
    }

    #[must_use]
    pub fn texture_count(&self) -> usize {
        self.owned_textures.len()
    }

    #[must_use]
    pub fn buffer_count(&self) -> usize {
        self.owned_buffers.len()
    }

    /// Destroys every fallback object. Lookups return `None` afterwards.
    pub fn shutdown(&mut self, device: &dyn Device) {
        self.textures.clear();
        self.buffers.clear();
        for buffer in self.owned_buffers.drain(..) {
            device.destroy_buffer(buffer);
        }
        for texture in self.owned_textures.drain(..) {
            device.destroy_texture(texture);
        }
    }
}
