//! Dependency Tracker
//!
//! A many-to-many invalidation graph between *resources* (objects that
//! cache references, e.g. bind groups or pipelines) and *dependencies*
//! (the lower-level objects they reference, e.g. textures or shaders).
//!
//! # Design
//!
//! Every `(resource, dependency)` pair is one [`Link`] living in an arena
//! `Vec`. A link is threaded into two intrusive doubly-linked chains at the
//! same time: the chain of its resource and the chain of its dependency.
//! The two hash maps only store chain heads. Freed links go onto an explicit
//! free list and are reused by later insertions, so steady-state tracking
//! does not allocate.
//!
//! ```text
//!   resources:     R1 ──▶ [R1,D1]          R2 ──▶ [R2,D2] ─▶ [R2,D1]
//!                           │                       │          │
//!   dependencies:  D1 ──▶ [R2,D1] ─▶ [R1,D1]     D2 ──▶ [R2,D2]
//! ```
//!
//! All chain surgery happens under one `parking_lot::Mutex`. Invalidation
//! handlers run after the lock is released, so a handler may call back into
//! [`DependencyTracker::remove_resource`] or
//! [`DependencyTracker::add_resource`].

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Identifies a registered invalidation handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type InvalidationHandler<R> = Arc<dyn Fn(R) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
struct Link<R, D> {
    resource: R,
    dependency: D,
    res_prev: Option<u32>,
    res_next: Option<u32>,
    dep_prev: Option<u32>,
    dep_next: Option<u32>,
    live: bool,
}

struct TrackerState<R, D> {
    links: Vec<Link<R, D>>,
    free_list: Vec<u32>,
    /// Head of each tracked resource's chain. `None` means the resource is
    /// still tracked but all of its dependencies were destroyed.
    resources: FxHashMap<R, Option<u32>>,
    dependencies: FxHashMap<D, u32>,
}

impl<R, D> TrackerState<R, D>
where
    R: Copy + Eq + Hash,
    D: Copy + Eq + Hash,
{
    fn alloc(&mut self, resource: R, dependency: D) -> u32 {
        let link = Link {
            resource,
            dependency,
            res_prev: None,
            res_next: None,
            dep_prev: None,
            dep_next: None,
            live: true,
        };
        if let Some(index) = self.free_list.pop() {
            self.links[index as usize] = link;
            index
        } else {
            self.links.push(link);
            (self.links.len() - 1) as u32
        }
    }

    fn free(&mut self, index: u32) {
        let link = &mut self.links[index as usize];
        debug_assert!(link.live, "link {index} freed twice");
        link.live = false;
        self.free_list.push(index);
    }

    /// Detaches `index` from its dependency's chain, dropping the chain head
    /// when it becomes empty.
    fn unlink_dependency(&mut self, index: u32) {
        let Link {
            dependency,
            dep_prev,
            dep_next,
            ..
        } = self.links[index as usize];

        if let Some(prev) = dep_prev {
            self.links[prev as usize].dep_next = dep_next;
        } else if let Some(next) = dep_next {
            self.dependencies.insert(dependency, next);
        } else {
            self.dependencies.remove(&dependency);
        }
        if let Some(next) = dep_next {
            self.links[next as usize].dep_prev = dep_prev;
        }
    }

    /// Detaches `index` from its resource's chain. The resource stays
    /// tracked even when its chain becomes empty.
    fn unlink_resource(&mut self, index: u32) {
        let Link {
            resource,
            res_prev,
            res_next,
            ..
        } = self.links[index as usize];

        if let Some(prev) = res_prev {
            self.links[prev as usize].res_next = res_next;
        } else if let Some(head) = self.resources.get_mut(&resource) {
            *head = res_next;
        }
        if let Some(next) = res_next {
            self.links[next as usize].res_prev = res_prev;
        }
    }
}

/// Invalidation graph between resources `R` and dependencies `D`.
pub struct DependencyTracker<R, D> {
    state: Mutex<TrackerState<R, D>>,
    handlers: RwLock<Vec<(SubscriptionId, InvalidationHandler<R>)>>,
    next_subscription: AtomicU64,
}

impl<R, D> Default for DependencyTracker<R, D>
where
    R: Copy + Eq + Hash + Debug,
    D: Copy + Eq + Hash + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R, D> DependencyTracker<R, D>
where
    R: Copy + Eq + Hash + Debug,
    D: Copy + Eq + Hash + Debug,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState {
                links: Vec::new(),
                free_list: Vec::new(),
                resources: FxHashMap::default(),
                dependencies: FxHashMap::default(),
            }),
            handlers: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Starts tracking `resource` against every dependency in `dependencies`.
    ///
    /// Duplicate dependencies are linked once. Tracking an already tracked
    /// resource is a programming error: it asserts in debug builds and is
    /// ignored in release builds.
    pub fn add_resource(&self, resource: R, dependencies: impl IntoIterator<Item = D>) {
        let mut state = self.state.lock();

        let already_tracked = state.resources.contains_key(&resource);
        debug_assert!(!already_tracked, "{resource:?} is already tracked");
        if already_tracked {
            log::error!("DependencyTracker: {resource:?} is already tracked, ignoring add");
            return;
        }

        let mut seen: SmallVec<[D; 8]> = SmallVec::new();
        let mut head: Option<u32> = None;
        for dependency in dependencies {
            if seen.contains(&dependency) {
                continue;
            }
            seen.push(dependency);

            let index = state.alloc(resource, dependency);

            state.links[index as usize].res_next = head;
            if let Some(old) = head {
                state.links[old as usize].res_prev = Some(index);
            }
            head = Some(index);

            let dep_head = state.dependencies.get(&dependency).copied();
            state.links[index as usize].dep_next = dep_head;
            if let Some(old) = dep_head {
                state.links[old as usize].dep_prev = Some(index);
            }
            state.dependencies.insert(dependency, index);
        }
        state.resources.insert(resource, head);
    }

    /// Stops tracking `resource` and frees all of its links. No invalidation
    /// event fires.
    ///
    /// Removing an untracked resource asserts in debug builds and is a no-op
    /// in release builds.
    pub fn remove_resource(&self, resource: R) {
        let mut state = self.state.lock();

        let head = state.resources.remove(&resource);
        debug_assert!(head.is_some(), "{resource:?} is not tracked");
        let Some(head) = head else {
            log::error!("DependencyTracker: {resource:?} is not tracked, ignoring remove");
            return;
        };

        let mut cursor = head;
        while let Some(index) = cursor {
            cursor = state.links[index as usize].res_next;
            state.unlink_dependency(index);
            state.free(index);
        }
    }

    /// Reports the destruction of `dependency`.
    ///
    /// Every link under the dependency is freed and each distinct resource
    /// that referenced it is reported once, first to the subscribed handlers
    /// (outside the lock) and then in the returned list. The resources stay
    /// tracked; handlers usually remove them.
    pub fn dependency_destroyed(&self, dependency: D) -> Vec<R> {
        let invalidated = {
            let mut state = self.state.lock();
            let Some(head) = state.dependencies.remove(&dependency) else {
                return Vec::new();
            };

            // A resource links to each dependency once, so every link on
            // this chain names a distinct resource.
            let mut invalidated = Vec::new();
            let mut cursor = Some(head);
            while let Some(index) = cursor {
                let link = state.links[index as usize];
                cursor = link.dep_next;
                invalidated.push(link.resource);
                state.unlink_resource(index);
                state.free(index);
            }
            invalidated
        };

        if !invalidated.is_empty() {
            log::debug!(
                "DependencyTracker: {dependency:?} destroyed, invalidating {} resource(s)",
                invalidated.len()
            );
            let handlers: SmallVec<[InvalidationHandler<R>; 4]> = self
                .handlers
                .read()
                .iter()
                .map(|(_, handler)| Arc::clone(handler))
                .collect();
            for &resource in &invalidated {
                for handler in &handlers {
                    handler(resource);
                }
            }
        }
        invalidated
    }

    /// Registers a handler that receives every invalidated resource.
    pub fn subscribe(&self, handler: impl Fn(R) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, Arc::new(handler)));
        id
    }

    /// Returns `false` if the subscription was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    // ─── Queries ─────────────────────────────────────────────────────────────

    #[must_use]
    pub fn is_tracked(&self, resource: R) -> bool {
        self.state.lock().resources.contains_key(&resource)
    }

    /// Live dependencies of `resource`, most recently linked first.
    #[must_use]
    pub fn dependencies_of(&self, resource: R) -> Vec<D> {
        let state = self.state.lock();
        let mut out = Vec::new();
        let mut cursor = state.resources.get(&resource).copied().flatten();
        while let Some(index) = cursor {
            let link = &state.links[index as usize];
            out.push(link.dependency);
            cursor = link.res_next;
        }
        out
    }

    /// Resources currently linked to `dependency`.
    #[must_use]
    pub fn dependents_of(&self, dependency: D) -> Vec<R> {
        let state = self.state.lock();
        let mut out = Vec::new();
        let mut cursor = state.dependencies.get(&dependency).copied();
        while let Some(index) = cursor {
            let link = &state.links[index as usize];
            out.push(link.resource);
            cursor = link.dep_next;
        }
        out
    }

    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.state.lock().resources.len()
    }

    /// Number of live `(resource, dependency)` links.
    #[must_use]
    pub fn link_count(&self) -> usize {
        let state = self.state.lock();
        state.links.len() - state.free_list.len()
    }

    /// Arena slots ever allocated, live or free.
    #[must_use]
    pub fn arena_len(&self) -> usize {
        self.state.lock().links.len()
    }
}
