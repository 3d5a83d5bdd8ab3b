//! Bind Group Builder
//!
//! Collects the resources render code binds by slot name and resolves them
//! against a bind group layout when a draw or dispatch needs a bind group.
//!
//! # Design
//!
//! - Three name-keyed tables (samplers, textures, buffers). A name may be
//!   bound in several tables at once: a `TextureAndSampler` slot takes the
//!   texture and the sampler bound under the same name.
//! - Binding a null handle removes the entry, so the slot falls back to a
//!   placeholder at build time.
//! - [`BindGroupBuilder::is_modified`] only flips when a bind call actually
//!   changes a table, which lets callers skip redundant state work.
//! - One builder per render context. It is `Send` but never shared, so it
//!   carries no locks.

use std::sync::Arc;

use gal_core::{
    BindGroupDesc, BindGroupItem, BindGroupItemFlags, BindGroupItemKind, BindGroupLayoutHandle,
    BufferHandle, BufferRange, GalError, Key, Result, SamplerHandle, ShaderResourceBinding,
    ShaderResourceType, ShaderTextureType, TempHashedName, TextureHandle, TextureRange,
};
use gal_foundation::{GalContext, LINEAR_SAMPLER};
use rustc_hash::FxHashMap;

/// Hash-table traffic of one builder since the last [`BindGroupBuilder::take_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuilderStats {
    pub reads: u32,
    pub writes: u32,
}

type ItemTable = FxHashMap<TempHashedName, BindGroupItem>;

#[derive(Default)]
pub struct BindGroupBuilder {
    context: Option<Arc<GalContext>>,
    default_sampler: SamplerHandle,
    samplers: ItemTable,
    textures: ItemTable,
    buffers: ItemTable,
    modified: bool,
    stats: BuilderStats,
}

impl BindGroupBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears every binding and re-binds the immutable samplers by name.
    ///
    /// Must run once per frame before binding anything, and whenever the
    /// device may have recreated resources.
    pub fn reset_bound_resources(&mut self, context: &Arc<GalContext>) {
        self.context = Some(Arc::clone(context));
        self.modified = true;
        self.default_sampler = SamplerHandle::null();
        self.samplers.clear();
        self.textures.clear();
        self.buffers.clear();

        // Backends without layout-baked samplers still bind them like any
        // other sampler. Render code never bound them, so they count as
        // fallbacks.
        match context.immutable_samplers() {
            Ok(samplers) => {
                for (name, handle) in samplers.iter() {
                    self.samplers.insert(
                        TempHashedName::from(name),
                        BindGroupItem::sampler(handle).with_flags(BindGroupItemFlags::FALLBACK),
                    );
                }
                self.default_sampler = samplers.get(LINEAR_SAMPLER).unwrap_or_default();
            }
            Err(err) => log::error!("BindGroupBuilder: reset on a dead context: {err}"),
        }
        debug_assert!(
            !self.default_sampler.is_null(),
            "{LINEAR_SAMPLER} must be registered before binding resources"
        );
    }

    fn is_reserved(&self, name: TempHashedName) -> bool {
        self.context
            .as_ref()
            .and_then(|ctx| ctx.immutable_samplers().ok())
            .is_some_and(|samplers| samplers.is_reserved(name))
    }

    fn validates(&self) -> bool {
        self.context
            .as_ref()
            .is_some_and(|ctx| ctx.settings().validate_bindings)
    }

    // ─── Binding ─────────────────────────────────────────────────────────────

    pub fn bind_sampler(&mut self, name: impl Into<TempHashedName>, sampler: SamplerHandle) {
        let name = name.into();
        debug_assert!(
            !self.is_reserved(name),
            "{name:?} is a reserved sampler name and must not be bound manually"
        );

        if sampler.is_null() {
            self.remove_item(name, Table::Samplers);
            return;
        }
        if self.validates()
            && let Some(ctx) = &self.context
            && ctx.device().sampler_desc(sampler).is_none()
        {
            log::warn!("BindGroupBuilder: stale sampler bound to {name:?}, using fallback");
            self.remove_item(name, Table::Samplers);
            return;
        }
        self.insert_item(name, BindGroupItem::sampler(sampler), Table::Samplers);
    }

    /// Binds `texture` to the slot `name`.
    ///
    /// `range` is clamped against the texture; `TextureRange::whole()` binds
    /// every mip and slice. `view_format` overrides the texture's format.
    pub fn bind_texture(
        &mut self,
        name: impl Into<TempHashedName>,
        texture: TextureHandle,
        range: TextureRange,
        view_format: Option<wgpu::TextureFormat>,
    ) {
        let name = name.into();
        if texture.is_null() {
            self.remove_item(name, Table::Textures);
            return;
        }

        let desc = self
            .context
            .as_ref()
            .and_then(|ctx| ctx.device().texture_desc(texture));
        let range = match desc {
            Some(desc) => desc.clamp_range(range),
            None if self.validates() => {
                log::warn!("BindGroupBuilder: stale texture bound to {name:?}, using fallback");
                self.remove_item(name, Table::Textures);
                return;
            }
            None => range,
        };
        self.insert_item(
            name,
            BindGroupItem::texture(texture, range, view_format),
            Table::Textures,
        );
    }

    /// Binds a texture together with the sampler it should be read with,
    /// both under `name`.
    pub fn bind_texture_and_sampler(
        &mut self,
        name: impl Into<TempHashedName>,
        texture: TextureHandle,
        sampler: SamplerHandle,
        range: TextureRange,
    ) {
        let name = name.into();
        self.bind_texture(name, texture, range, None);
        self.bind_sampler(name, sampler);
    }

    /// Binds `buffer` to the slot `name`.
    ///
    /// `texel_format` overrides the element format of texel buffers.
    pub fn bind_buffer(
        &mut self,
        name: impl Into<TempHashedName>,
        buffer: BufferHandle,
        range: BufferRange,
        texel_format: Option<wgpu::TextureFormat>,
    ) {
        let name = name.into();
        if buffer.is_null() {
            self.remove_item(name, Table::Buffers);
            return;
        }

        let desc = self
            .context
            .as_ref()
            .and_then(|ctx| ctx.device().buffer_desc(buffer));
        let range = match desc {
            Some(desc) => desc.clamp_range(range),
            None if self.validates() => {
                log::warn!("BindGroupBuilder: stale buffer bound to {name:?}, using fallback");
                self.remove_item(name, Table::Buffers);
                return;
            }
            None => range,
        };
        self.insert_item(
            name,
            BindGroupItem::buffer(buffer, range, texel_format),
            Table::Buffers,
        );
    }

    /// `true` if a bind call changed the bound resources since the last
    /// [`create_bind_group`](Self::create_bind_group).
    #[inline]
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Returns and resets the hash-table counters.
    pub fn take_stats(&mut self) -> BuilderStats {
        std::mem::take(&mut self.stats)
    }

    fn table(&mut self, table: Table) -> &mut ItemTable {
        match table {
            Table::Samplers => &mut self.samplers,
            Table::Textures => &mut self.textures,
            Table::Buffers => &mut self.buffers,
        }
    }

    fn insert_item(&mut self, name: TempHashedName, item: BindGroupItem, table: Table) {
        self.stats.reads += 1;
        let old = self.table(table).insert(name, item);
        if old != Some(item) {
            self.modified = true;
            self.stats.writes += 1;
        }
    }

    fn remove_item(&mut self, name: TempHashedName, table: Table) {
        self.stats.reads += 1;
        if self.table(table).remove(&name).is_some() {
            self.modified = true;
            self.stats.writes += 1;
        }
    }

    // ─── Resolution ──────────────────────────────────────────────────────────

    /// Resolves every binding of `layout` into a [`BindGroupDesc`].
    ///
    /// Slots without a bound resource get a fallback and the
    /// [`BindGroupItemFlags::FALLBACK`] flag. The result has one item per
    /// layout binding, in layout order. Only a missing context or an unknown
    /// layout fails the call.
    pub fn create_bind_group(&mut self, layout: BindGroupLayoutHandle) -> Result<BindGroupDesc> {
        let ctx = self
            .context
            .clone()
            .filter(|ctx| ctx.is_initialized())
            .ok_or(GalError::NotInitialized("BindGroupBuilder"))?;
        let layout_desc = ctx.device().bind_group_layout_desc(layout).ok_or_else(|| {
            log::error!("BindGroupBuilder: unknown bind group layout {layout:?}");
            GalError::UnknownBindGroupLayout
        })?;

        let mut items = Vec::with_capacity(layout_desc.bindings.len());
        for binding in &layout_desc.bindings {
            items.push(self.resolve(&ctx, binding));
        }
        self.modified = false;

        Ok(BindGroupDesc { layout, items })
    }

    /// Never fails: a slot nothing can fill gets a null-handle fallback item,
    /// which device-side validation then rejects with a proper error.
    fn resolve(&mut self, ctx: &GalContext, binding: &ShaderResourceBinding) -> BindGroupItem {
        let name = TempHashedName::from(&binding.name);
        let ty = binding.resource_type;

        if ty == ShaderResourceType::Sampler {
            self.stats.reads += 1;
            return self.samplers.get(&name).copied().unwrap_or_else(|| {
                BindGroupItem::sampler(self.default_sampler)
                    .with_flags(BindGroupItemFlags::FALLBACK)
            });
        }

        if ty.is_buffer() {
            self.stats.reads += 1;
            if let Some(item) = self.buffers.get(&name) {
                return *item;
            }
            return fallback_buffer(ctx, binding);
        }

        if ty.is_texture() {
            self.stats.reads += 1;
            let mut item = match self.textures.get(&name) {
                Some(item) => *item,
                None => fallback_texture(ctx, binding),
            };
            if let BindGroupItemKind::Texture { sampler, range, .. } = &mut item.kind {
                if ty == ShaderResourceType::TextureAndSampler {
                    self.stats.reads += 1;
                    *sampler = match self.samplers.get(&name) {
                        Some(BindGroupItem {
                            kind: BindGroupItemKind::Sampler { sampler },
                            ..
                        }) => *sampler,
                        _ => self.default_sampler,
                    };
                }
                if !binding.texture_type.is_array() {
                    range.array_slice_count =
                        if binding.texture_type == ShaderTextureType::TextureCube {
                            6
                        } else {
                            1
                        };
                }
            }
            return item;
        }

        debug_assert!(false, "unsupported resource type {ty:?} for '{}'", binding.name);
        log::error!(
            "BindGroupBuilder: '{}' has unsupported resource type {ty:?}",
            binding.name
        );
        BindGroupItem::buffer(BufferHandle::null(), BufferRange::whole(), None)
            .with_flags(BindGroupItemFlags::FALLBACK)
    }
}

#[derive(Clone, Copy)]
enum Table {
    Samplers,
    Textures,
    Buffers,
}

fn report_missing_fallback(binding: &ShaderResourceBinding, depth: bool) {
    debug_assert!(
        false,
        "missing fallback for '{}' ({:?}, {:?}, depth {depth})",
        binding.name, binding.resource_type, binding.texture_type
    );
    log::error!(
        "BindGroupBuilder: no fallback for '{}' ({:?}, {:?}, depth {depth})",
        binding.name,
        binding.resource_type,
        binding.texture_type
    );
}

fn fallback_buffer(ctx: &GalContext, binding: &ShaderResourceBinding) -> BindGroupItem {
    let buffer = ctx
        .fallback_resources()
        .ok()
        .and_then(|fallbacks| fallbacks.fallback_buffer(binding.resource_type))
        .unwrap_or_else(|| {
            report_missing_fallback(binding, false);
            BufferHandle::null()
        });
    let range = ctx
        .device()
        .buffer_desc(buffer)
        .map_or(BufferRange::whole(), |desc| {
            desc.clamp_range(BufferRange::whole())
        });
    BindGroupItem::buffer(buffer, range, None).with_flags(BindGroupItemFlags::FALLBACK)
}

fn fallback_texture(ctx: &GalContext, binding: &ShaderResourceBinding) -> BindGroupItem {
    let depth = binding.name.contains_ignore_case("shadow")
        || binding.name.contains_ignore_case("depth");
    let texture = ctx
        .fallback_resources()
        .ok()
        .and_then(|fallbacks| {
            fallbacks.fallback_texture(binding.resource_type, binding.texture_type, depth)
        })
        .unwrap_or_else(|| {
            report_missing_fallback(binding, depth);
            TextureHandle::null()
        });
    let range = ctx
        .device()
        .texture_desc(texture)
        .map_or(TextureRange::whole(), |desc| {
            desc.clamp_range(TextureRange::whole())
        });
    BindGroupItem::texture(texture, range, None).with_flags(BindGroupItemFlags::FALLBACK)
}
