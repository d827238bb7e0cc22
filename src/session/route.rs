//! The single secondary-route slot.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::common::{ContextId, DestinationId, RouteId, RoutingError};

/// A live capture of the mix into a secondary destination.
#[derive(Debug)]
pub struct SecondaryRoute {
    pub id: RouteId,
    pub context: ContextId,
    pub destination: DestinationId,
    /// Voices connected when the route was established.
    pub voices_at_establish: usize,
    pub keep_alive: bool,
}

/// Holds at most one [`SecondaryRoute`]. Every producer that fans audio into
/// the secondary output goes through the route found here, so swapping it is
/// the only way to redirect them.
#[derive(Default)]
pub struct RouteSlot {
    inner: Mutex<Option<Arc<SecondaryRoute>>>,
}

impl RouteSlot {
    /// Install `route`; fails if one is already registered.
    pub fn set(&self, route: Arc<SecondaryRoute>) -> Result<(), RoutingError> {
        self.lock().set(route)
    }

    pub fn clear(&self) -> Option<Arc<SecondaryRoute>> {
        self.lock().clear()
    }

    pub fn is_set(&self) -> bool {
        self.inner.lock().is_some()
    }

    pub fn get(&self) -> Option<Arc<SecondaryRoute>> {
        self.inner.lock().clone()
    }

    /// Hold the slot across a multi-step update. Take this before the graph lock.
    pub(crate) fn lock(&self) -> RouteGuard<'_> {
        RouteGuard(self.inner.lock())
    }
}

/// The locked slot. A swap is `clear` then `set` on the same guard.
pub(crate) struct RouteGuard<'a>(MutexGuard<'a, Option<Arc<SecondaryRoute>>>);

impl RouteGuard<'_> {
    pub fn current(&self) -> Option<&Arc<SecondaryRoute>> {
        self.0.as_ref()
    }

    pub fn set(&mut self, route: Arc<SecondaryRoute>) -> Result<(), RoutingError> {
        if self.0.is_some() {
            return Err(RoutingError::AlreadyRegistered);
        }
        *self.0 = Some(route);
        Ok(())
    }

    pub fn clear(&mut self) -> Option<Arc<SecondaryRoute>> {
        self.0.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route() -> Arc<SecondaryRoute> {
        Arc::new(SecondaryRoute {
            id: RouteId::generate(),
            context: ContextId::generate(),
            destination: DestinationId(1),
            voices_at_establish: 0,
            keep_alive: true,
        })
    }

    #[test]
    fn double_registration_is_rejected() {
        let slot = RouteSlot::default();
        slot.set(route()).unwrap();
        assert_eq!(slot.set(route()), Err(RoutingError::AlreadyRegistered));
    }

    #[test]
    fn held_guard_swaps_only_after_clear() {
        let slot = RouteSlot::default();
        let first = route();
        slot.set(first.clone()).unwrap();

        let mut guard = slot.lock();
        assert_eq!(guard.set(route()), Err(RoutingError::AlreadyRegistered));
        assert_eq!(guard.clear().map(|r| r.id), Some(first.id));
        let second = route();
        guard.set(second.clone()).unwrap();
        drop(guard);

        assert_eq!(slot.get().map(|r| r.id), Some(second.id));
    }

    #[test]
    fn clear_is_safe_when_empty() {
        let slot = RouteSlot::default();
        assert!(slot.clear().is_none());
        slot.set(route()).unwrap();
        assert!(slot.is_set());
        assert!(slot.clear().is_some());
        assert!(!slot.is_set());
    }
}
