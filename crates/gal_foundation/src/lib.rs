//! # GAL Foundation
//!
//! Device-lifetime registries of the binding core:
//!
//! - [`dependency_tracker`]: many-to-many invalidation graph
//! - [`pipeline_cache`]: content-addressed graphics / compute pipelines
//! - [`descriptor_pool`]: growable descriptor-set pools with deferred reclaim
//! - [`bind_group_store`]: bind group creation, tracking and invalidation
//! - [`fallback_resources`]: placeholder objects for unbound slots
//! - [`immutable_samplers`]: reserved, layout-baked samplers
//! - [`context`]: [`GalContext`], the lifecycle owner of all of the above

pub mod bind_group_store;
pub mod context;
pub mod dependency_tracker;
pub mod descriptor_pool;
pub mod fallback_resources;
pub mod immutable_samplers;
pub mod pipeline_cache;

pub use bind_group_store::BindGroupStore;
pub use context::GalContext;
pub use dependency_tracker::{DependencyTracker, SubscriptionId};
pub use descriptor_pool::{
    DescriptorSetAllocation, DescriptorSetPool, DescriptorSetPools, ResourceUsage, SubPoolInfo,
    SubPoolState,
};
pub use fallback_resources::{FallbackResources, FallbackTextureKey};
pub use immutable_samplers::{
    ImmutableSamplers, LINEAR_CLAMP_SAMPLER, LINEAR_SAMPLER, POINT_CLAMP_SAMPLER, POINT_SAMPLER,
};
pub use pipeline_cache::{CachedPipeline, PipelineCache, PipelineCacheStats};
