//! Observation registry for broadcasting key changes.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::types::{ObservationId, ObservationOptions, RawChange};

thread_local! {
    /// Ids of the observations whose handlers are executing on this thread,
    /// innermost last. Writes snapshot it as their suppression set.
    static DELIVERY_STACK: RefCell<Vec<ObservationId>> = const { RefCell::new(Vec::new()) };
}

/// Pops the delivery stack back to a fixed depth, including on unwind.
struct StackGuard(usize);

impl StackGuard {
    fn push(ids: &[ObservationId]) -> Self {
        DELIVERY_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let depth = stack.len();
            stack.extend_from_slice(ids);
            StackGuard(depth)
        })
    }
}

impl Drop for StackGuard {
    fn drop(&mut self) {
        DELIVERY_STACK.with(|stack| stack.borrow_mut().truncate(self.0));
    }
}

/// A capture of the current delivery context, for carrying suppression
/// across threads.
///
/// A write made inside a handler is automatically suppressed for the
/// observation that delivered it, because the write snapshots the delivery
/// stack of its own thread. When the handler moves work to another thread,
/// capture a scope first and [`enter`](PropagationScope::enter) it there so
/// writes remain correlated with the originating delivery.
#[derive(Clone, Debug, Default)]
pub struct PropagationScope {
    ids: Vec<ObservationId>,
}

impl PropagationScope {
    /// Captures the delivery context of the current thread.
    pub fn current() -> Self {
        Self {
            ids: DELIVERY_STACK.with(|stack| stack.borrow().clone()),
        }
    }

    /// Runs `f` with this scope's context layered onto the current thread.
    pub fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = StackGuard::push(&self.ids);
        f()
    }

    pub(crate) fn ids(&self) -> &[ObservationId] {
        &self.ids
    }
}

pub(crate) type Handler = Arc<dyn Fn(&[RawChange]) + Send + Sync>;

/// Internal observer state.
struct ObserverEntry {
    keys: HashSet<String>,
    options: ObservationOptions,
    handler: Handler,
    active: Arc<AtomicBool>,
    /// Weak back-reference to an owner. When the owner is released the
    /// observation is removed at the next broadcast touching it.
    lifetime: Option<Weak<dyn Any + Send + Sync>>,
}

/// Holds the observers of one suite and fans changes out to them.
///
/// Handlers run synchronously on the broadcasting thread, with no registry
/// lock held, so a handler is free to write back to the suite or invalidate
/// its own observation.
pub struct ObservationRegistry {
    observers: RwLock<HashMap<ObservationId, ObserverEntry>>,
    next_id: AtomicU64,
}

impl ObservationRegistry {
    pub(crate) fn new() -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn insert(
        &self,
        keys: HashSet<String>,
        options: ObservationOptions,
        handler: Handler,
    ) -> (ObservationId, Arc<AtomicBool>) {
        let id = ObservationId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let active = Arc::new(AtomicBool::new(true));

        let entry = ObserverEntry {
            keys,
            options,
            handler,
            active: active.clone(),
            lifetime: None,
        };

        self.observers.write().insert(id, entry);
        (id, active)
    }

    pub(crate) fn remove(&self, id: ObservationId) {
        if let Some(entry) = self.observers.write().remove(&id) {
            entry.active.store(false, Ordering::SeqCst);
        }
    }

    pub(crate) fn set_lifetime(
        &self,
        id: ObservationId,
        lifetime: Option<Weak<dyn Any + Send + Sync>>,
    ) {
        if let Some(entry) = self.observers.write().get_mut(&id) {
            entry.lifetime = lifetime;
        }
    }

    /// Number of registered observations.
    pub fn observation_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Fans one mutation's changes out to matching observers.
    ///
    /// An observer spanning several of the changed keys is invoked once with
    /// all of its matching changes. Observers in `suppressed` caused this
    /// write and are skipped.
    pub(crate) fn broadcast(&self, changes: &[RawChange], suppressed: &[ObservationId]) {
        if changes.is_empty() {
            return;
        }
        let is_prior = changes.iter().all(|c| c.is_prior);

        let mut deliveries = Vec::new();
        let mut expired = Vec::new();

        {
            let observers = self.observers.read();
            for (id, entry) in observers.iter() {
                if is_prior && !entry.options.prior {
                    continue;
                }
                if suppressed.contains(id) || !entry.active.load(Ordering::SeqCst) {
                    continue;
                }
                if let Some(owner) = &entry.lifetime {
                    if owner.strong_count() == 0 {
                        expired.push(*id);
                        continue;
                    }
                }

                let matching: Vec<RawChange> = changes
                    .iter()
                    .filter(|change| entry.keys.contains(&change.key))
                    .cloned()
                    .collect();
                if !matching.is_empty() {
                    deliveries.push((*id, entry.active.clone(), entry.handler.clone(), matching));
                }
            }
        }

        for id in expired {
            self.remove(id);
        }

        for (id, active, handler, matching) in deliveries {
            // Re-check: the handler of an earlier delivery may have
            // invalidated this one.
            if !active.load(Ordering::SeqCst) {
                continue;
            }
            let _guard = StackGuard::push(&[id]);
            handler(&matching);
        }
    }

    /// Delivers a synthesized change to a single observer, at subscription
    /// time for the initial option.
    pub(crate) fn deliver_to(&self, id: ObservationId, changes: &[RawChange]) {
        let handler = {
            let observers = self.observers.read();
            match observers.get(&id) {
                Some(entry) if entry.active.load(Ordering::SeqCst) => entry.handler.clone(),
                _ => return,
            }
        };
        let _guard = StackGuard::push(&[id]);
        handler(changes);
    }
}

/// Handle to an active observation.
///
/// Dropping the handle does not stop delivery; call
/// [`invalidate`](Observation::invalidate) or tie the observation to an
/// owner's lifetime.
#[derive(Clone)]
pub struct Observation {
    id: ObservationId,
    registry: Weak<ObservationRegistry>,
    active: Arc<AtomicBool>,
}

impl Observation {
    pub(crate) fn new(
        id: ObservationId,
        registry: &Arc<ObservationRegistry>,
        active: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            registry: Arc::downgrade(registry),
            active,
        }
    }

    pub fn id(&self) -> ObservationId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stops delivery. Safe to call from within the observation's own
    /// handler and from any thread; no delivery begins after this returns.
    pub fn invalidate(&self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }

    /// Invalidates this observation automatically once `owner` is released.
    /// Holds only a weak reference, never keeping the owner alive.
    pub fn tie_to_lifetime<T: Send + Sync + 'static>(&self, owner: &Arc<T>) {
        if let Some(registry) = self.registry.upgrade() {
            let owner: Arc<dyn Any + Send + Sync> = owner.clone();
            let weak: Weak<dyn Any + Send + Sync> = Arc::downgrade(&owner);
            registry.set_lifetime(self.id, Some(weak));
        }
    }

    /// Removes a previously installed lifetime tie.
    pub fn remove_lifetime_tie(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.set_lifetime(self.id, None);
        }
    }
}
