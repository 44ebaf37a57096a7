//! Opaque stream handles
//!
//! Every stream the adapter opens gets a handle minted from a counter. The
//! registry maps handles back to the key and mode they were opened with for
//! as long as the stream is alive.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

/// Identifier of an open read stream or write sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamHandle(u64);

impl StreamHandle {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Direction a stream was opened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Read,
    Write,
}

/// What a handle refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenStreamInfo {
    pub key: String,
    pub mode: StreamMode,
}

/// Registry of live stream handles
pub struct HandleRegistry {
    open: DashMap<StreamHandle, OpenStreamInfo>,
    next_handle: AtomicU64,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self {
            open: DashMap::new(),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Mint a handle for `key` and record it as open
    pub fn mint(self: &Arc<Self>, key: &str, mode: StreamMode) -> HandleGuard {
        let handle = StreamHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.open.insert(
            handle,
            OpenStreamInfo {
                key: key.to_string(),
                mode,
            },
        );
        HandleGuard {
            handle,
            registry: Arc::clone(self),
        }
    }

    pub fn get(&self, handle: StreamHandle) -> Option<OpenStreamInfo> {
        self.open.get(&handle).map(|info| info.clone())
    }

    /// Number of streams currently open
    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    fn release(&self, handle: StreamHandle) {
        self.open.remove(&handle);
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a handle registered until dropped
pub struct HandleGuard {
    handle: StreamHandle,
    registry: Arc<HandleRegistry>,
}

impl HandleGuard {
    pub fn handle(&self) -> StreamHandle {
        self.handle
    }
}

impl fmt::Debug for HandleGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HandleGuard").field(&self.handle).finish()
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.registry.release(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_unique() {
        let registry = Arc::new(HandleRegistry::new());

        let a = registry.mint("a", StreamMode::Read);
        let b = registry.mint("a", StreamMode::Read);

        assert_ne!(a.handle(), b.handle());
        assert!(b.handle() > a.handle());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_lookup() {
        let registry = Arc::new(HandleRegistry::new());
        let guard = registry.mint("photos/cat.jpg", StreamMode::Write);

        assert_eq!(
            registry.get(guard.handle()),
            Some(OpenStreamInfo {
                key: "photos/cat.jpg".to_string(),
                mode: StreamMode::Write,
            })
        );
    }

    #[test]
    fn test_release_on_drop() {
        let registry = Arc::new(HandleRegistry::new());
        let guard = registry.mint("a", StreamMode::Read);
        let handle = guard.handle();

        drop(guard);
        assert!(registry.get(handle).is_none());
        assert!(registry.is_empty());
    }
}
