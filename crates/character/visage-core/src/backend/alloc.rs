//! Handle allocation hooks and the owned handle wrapper.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Kinds of backend handle a character owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandleKind {
    Actor,
    BoneSet,
    FrameState,
    Anim,
}

impl HandleKind {
    pub const ALL: [HandleKind; 4] = [
        HandleKind::Actor,
        HandleKind::BoneSet,
        HandleKind::FrameState,
        HandleKind::Anim,
    ];

    #[inline]
    fn slot(self) -> usize {
        match self {
            HandleKind::Actor => 0,
            HandleKind::BoneSet => 1,
            HandleKind::FrameState => 2,
            HandleKind::Anim => 3,
        }
    }
}

/// Pluggable allocation hook invoked for every backend handle.
///
/// Implementations may abort the process on exhaustion; callers never see an
/// allocation failure.
pub trait HandleAllocator: fmt::Debug + Send + Sync {
    fn allocate(&self, kind: HandleKind);
    fn release(&self, kind: HandleKind);
}

/// Default allocator: the backend's own heap, nothing tracked.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl HandleAllocator for SystemAllocator {
    fn allocate(&self, _kind: HandleKind) {}
    fn release(&self, _kind: HandleKind) {}
}

/// Allocator that counts live and total handles per kind.
#[derive(Debug, Default)]
pub struct CountingAllocator {
    live: [AtomicUsize; 4],
    total: [AtomicUsize; 4],
}

impl CountingAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live(&self, kind: HandleKind) -> usize {
        self.live[kind.slot()].load(Ordering::Relaxed)
    }

    /// Handles ever allocated of this kind.
    pub fn total(&self, kind: HandleKind) -> usize {
        self.total[kind.slot()].load(Ordering::Relaxed)
    }

    pub fn live_total(&self) -> usize {
        HandleKind::ALL.iter().map(|k| self.live(*k)).sum()
    }
}

impl HandleAllocator for CountingAllocator {
    fn allocate(&self, kind: HandleKind) {
        self.live[kind.slot()].fetch_add(1, Ordering::Relaxed);
        self.total[kind.slot()].fetch_add(1, Ordering::Relaxed);
    }

    fn release(&self, kind: HandleKind) {
        let prev = self.live[kind.slot()].fetch_sub(1, Ordering::Relaxed);
        assert!(prev > 0, "released more {kind:?} handles than were allocated");
    }
}

/// A backend handle with scoped release.
///
/// `destroy` is idempotent and `Drop` releases whatever is still live, so a
/// handle is returned to the allocator exactly once on every path.
pub struct OwnedHandle<T> {
    value: Option<T>,
    kind: HandleKind,
    allocator: Arc<dyn HandleAllocator>,
}

impl<T> OwnedHandle<T> {
    pub fn new(value: T, kind: HandleKind, allocator: Arc<dyn HandleAllocator>) -> Self {
        allocator.allocate(kind);
        Self {
            value: Some(value),
            kind,
            allocator,
        }
    }

    #[inline]
    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.value.as_mut()
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn destroy(&mut self) {
        if self.value.take().is_some() {
            self.allocator.release(self.kind);
        }
    }
}

impl<T> Drop for OwnedHandle<T> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<T: fmt::Debug> fmt::Debug for OwnedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedHandle")
            .field("kind", &self.kind)
            .field("value", &self.value)
            .finish()
    }
}
