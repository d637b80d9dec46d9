//! Nested-map guard
//!
//! Tracks how many map invocations enclose the currently running code so a map
//! call can tell whether it was issued from inside another map's work item.
//!
//! The depth lives in a thread-local counter. A [`MapScope`] raises it on entry
//! and restores the previous value when dropped, so restoration happens on every
//! exit path, including `?` propagation and panics. Worker threads executing a
//! work item adopt the depth of the invocation that dispatched the item through
//! [`inherit_map_scope`]. Async maps carry the depth in a tokio task-local
//! instead, because a thread-local cannot follow a future across `.await`.
//!
//! Whenever the state cannot be read, or a scope finds the counter at a value it
//! did not set, the guard fails closed and reports "inside a map".

use std::cell::Cell;
use std::future::Future;
use std::marker::PhantomData;
use thiserror::Error;
use tracing::{trace, warn};

/// Problems reading or restoring the guard state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GuardStateError {
    /// The thread-local storage has already been torn down on this thread.
    #[error("map guard storage is unavailable on this thread")]
    Unavailable,
    /// A scope exited while the depth counter held a value it did not set.
    #[error("map guard depth is {found}, expected {expected}")]
    Corrupted { expected: u32, found: u32 },
}

#[derive(Debug, Clone, Copy, Default)]
struct ScopeState {
    depth: u32,
    corrupted: Option<GuardStateError>,
}

thread_local! {
    static MAP_SCOPE: Cell<ScopeState> = const {
        Cell::new(ScopeState {
            depth: 0,
            corrupted: None,
        })
    };
}

tokio::task_local! {
    static TASK_MAP_DEPTH: u32;
}

fn thread_state() -> Result<ScopeState, GuardStateError> {
    MAP_SCOPE
        .try_with(Cell::get)
        .map_err(|_| GuardStateError::Unavailable)
}

fn task_depth() -> u32 {
    TASK_MAP_DEPTH.try_with(|depth| *depth).unwrap_or(0)
}

/// Number of map invocations enclosing the current code.
///
/// Inside a work item of a top-level call this is 1, inside a work item of a
/// call nested one level deeper it is 2, and so on. Outside any map it is 0.
pub fn map_depth() -> Result<u32, GuardStateError> {
    let state = thread_state()?;
    if let Some(err) = state.corrupted {
        return Err(err);
    }
    Ok(state.depth.max(task_depth()))
}

/// Whether the map invocation the caller runs under was itself started from
/// inside another map invocation.
///
/// Returns `true` when the guard state is unreadable.
pub fn is_inside_map() -> bool {
    match map_depth() {
        Ok(depth) => depth > 1,
        Err(err) => {
            warn!("Treating map call as nested: {}", err);
            true
        }
    }
}

/// Depth and nesting decision for a map invocation about to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeEntry {
    /// Depth the invocation's work items run at.
    pub depth: u32,
    /// True when the invocation must be treated as nested.
    pub nested: bool,
}

/// Compute the entry for a new invocation without touching the thread-local.
///
/// Used by async maps, which scope the depth per work-item future.
pub(crate) fn next_entry() -> ScopeEntry {
    match map_depth() {
        Ok(depth) => {
            let depth = depth.saturating_add(1);
            ScopeEntry {
                depth,
                nested: depth > 1,
            }
        }
        Err(err) => {
            warn!("Map guard state unreadable, forcing serial execution: {}", err);
            let known = thread_state().map(|s| s.depth).unwrap_or(0);
            ScopeEntry {
                depth: known.max(task_depth()).saturating_add(1).max(2),
                nested: true,
            }
        }
    }
}

/// A live map scope. Dropping it restores the depth that was current when it
/// was entered.
///
/// The scope is tied to the thread that entered it and is neither `Send` nor
/// `Sync`. Async code must not hold one across `.await`; async maps carry their
/// depth in a task-local instead.
#[derive(Debug)]
#[must_use = "dropping a MapScope immediately ends the map scope"]
pub struct MapScope {
    prior: Option<ScopeState>,
    entry: ScopeEntry,
    _thread_bound: PhantomData<*const ()>,
}

impl MapScope {
    fn enter_at(depth: u32, fail_closed: bool) -> Self {
        let state = match thread_state() {
            Ok(state) => state,
            Err(err) => {
                warn!("Cannot record map scope: {}", err);
                return Self {
                    prior: None,
                    entry: ScopeEntry {
                        depth: depth.max(2),
                        nested: true,
                    },
                    _thread_bound: PhantomData,
                };
            }
        };

        let nested = fail_closed || depth > 1 || state.corrupted.is_some();
        let _ = MAP_SCOPE.try_with(|cell| {
            cell.set(ScopeState {
                depth,
                corrupted: state.corrupted,
            })
        });
        trace!("Entered map scope at depth {} (nested: {})", depth, nested);

        Self {
            prior: Some(state),
            entry: ScopeEntry { depth, nested },
            _thread_bound: PhantomData,
        }
    }

    /// Depth this scope established.
    pub fn depth(&self) -> u32 {
        self.entry.depth
    }

    /// Whether the invocation owning this scope is nested inside another map.
    pub fn is_nested(&self) -> bool {
        self.entry.nested
    }

    pub fn entry(&self) -> ScopeEntry {
        self.entry
    }

    /// End the scope explicitly. Equivalent to dropping it.
    pub fn exit(self) {
        drop(self);
    }
}

impl Drop for MapScope {
    fn drop(&mut self) {
        let Some(prior) = self.prior else {
            return;
        };
        let expected = self.entry.depth;

        let _ = MAP_SCOPE.try_with(|cell| {
            let current = cell.get();

            // An enclosing scope already exited and unwound this level. The
            // prior recorded here is stale, so leave the current state alone.
            if current.depth < expected {
                warn!(
                    "Map scope at depth {} exited after its enclosing scope (depth now {})",
                    expected, current.depth
                );
                return;
            }

            let mut restored = prior;
            if current.depth > expected {
                let err = GuardStateError::Corrupted {
                    expected,
                    found: current.depth,
                };
                warn!("Map scope exited out of order: {}", err);
                restored.corrupted = Some(err);
            } else if current.corrupted.is_some() {
                restored.corrupted = current.corrupted;
            }

            // Leaving the outermost scope on this thread resets the state.
            if restored.depth == 0 {
                restored.corrupted = None;
            }

            cell.set(restored);
        });
        trace!("Exited map scope at depth {}", expected);
    }
}

/// Record that a map invocation is beginning on this thread.
///
/// Legal at any nesting level; each call adds one level on top of the current
/// depth. The returned scope must be kept alive until the invocation finishes.
pub fn enter_map_scope() -> MapScope {
    match map_depth() {
        Ok(depth) => MapScope::enter_at(depth.saturating_add(1), false),
        Err(err) => {
            warn!("Map guard state unreadable, forcing serial execution: {}", err);
            let known = thread_state().map(|s| s.depth).unwrap_or(0);
            MapScope::enter_at(known.max(task_depth()).saturating_add(1), true)
        }
    }
}

/// End a map scope, restoring the state that preceded it.
pub fn exit_map_scope(scope: MapScope) {
    scope.exit();
}

/// Run `f` on the current thread at exactly `depth`, restoring the previous
/// depth afterwards.
///
/// Worker threads call this around each work item so the item observes the
/// depth of the invocation that dispatched it.
pub fn inherit_map_scope<R>(depth: u32, f: impl FnOnce() -> R) -> R {
    let _scope = MapScope::enter_at(depth, false);
    f()
}

/// Run a work-item future with the task-local depth set to `depth`.
pub(crate) fn scope_future<F: Future>(depth: u32, fut: F) -> impl Future<Output = F::Output> {
    TASK_MAP_DEPTH.scope(depth, fut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_starts_at_zero() {
        assert_eq!(map_depth(), Ok(0));
        assert!(!is_inside_map());
    }

    #[test]
    fn test_single_scope_is_not_nested() {
        let scope = enter_map_scope();
        assert_eq!(scope.depth(), 1);
        assert!(!scope.is_nested());
        assert!(!is_inside_map());
        exit_map_scope(scope);
        assert_eq!(map_depth(), Ok(0));
    }

    #[test]
    fn test_nested_scopes_restore_in_order() {
        let outer = enter_map_scope();
        let inner = enter_map_scope();
        assert!(inner.is_nested());
        assert_eq!(map_depth(), Ok(2));
        assert!(is_inside_map());

        let innermost = enter_map_scope();
        assert_eq!(innermost.depth(), 3);
        drop(innermost);
        assert_eq!(map_depth(), Ok(2));

        drop(inner);
        assert_eq!(map_depth(), Ok(1));
        assert!(!is_inside_map());

        drop(outer);
        assert_eq!(map_depth(), Ok(0));
    }

    #[test]
    fn test_scope_restored_on_panic() {
        let result = std::panic::catch_unwind(|| {
            let _outer = enter_map_scope();
            let _inner = enter_map_scope();
            panic!("work item failed");
        });
        assert!(result.is_err());
        assert_eq!(map_depth(), Ok(0));
    }

    #[test]
    fn test_inherit_sets_exact_depth() {
        let seen = inherit_map_scope(2, || {
            let nested = is_inside_map();
            (map_depth(), nested)
        });
        assert_eq!(seen, (Ok(2), true));
        assert_eq!(map_depth(), Ok(0));
    }

    #[test]
    fn test_leaked_scope_fails_closed_until_outermost_exit() {
        let outer = enter_map_scope();
        let middle = enter_map_scope();
        let leaked = enter_map_scope();
        std::mem::forget(leaked);

        drop(middle);
        assert_eq!(
            map_depth(),
            Err(GuardStateError::Corrupted {
                expected: 2,
                found: 3
            })
        );
        assert!(is_inside_map());

        let while_corrupted = enter_map_scope();
        assert!(while_corrupted.is_nested());
        drop(while_corrupted);

        drop(outer);
        assert_eq!(map_depth(), Ok(0));
        assert!(!is_inside_map());
    }

    #[test]
    fn test_outer_exit_before_inner_does_not_leak_depth() {
        let outer = enter_map_scope();
        let inner = enter_map_scope();

        exit_map_scope(outer);
        assert_eq!(map_depth(), Ok(0));

        exit_map_scope(inner);
        assert_eq!(map_depth(), Ok(0));
        assert!(!is_inside_map());

        for _ in 0..3 {
            let scope = enter_map_scope();
            assert_eq!(scope.depth(), 1);
            assert!(!scope.is_nested());
        }
        assert_eq!(map_depth(), Ok(0));
    }

    #[test]
    fn test_stale_inner_exit_keeps_newer_scopes() {
        let outer = enter_map_scope();
        let stale = enter_map_scope();
        exit_map_scope(outer);

        let fresh = enter_map_scope();
        assert_eq!(fresh.depth(), 1);
        exit_map_scope(stale);
        assert_eq!(map_depth(), Ok(1));

        exit_map_scope(fresh);
        assert_eq!(map_depth(), Ok(0));
    }

    #[test]
    fn test_scope_is_bound_to_its_thread() {
        // Resolves only when `MapScope: Send` does not hold; a `Send` scope
        // makes the call ambiguous and fails to compile.
        trait AmbiguousIfSend<A> {
            fn check() {}
        }
        impl<T: ?Sized> AmbiguousIfSend<()> for T {}
        impl<T: ?Sized + Send> AmbiguousIfSend<u8> for T {}

        <MapScope as AmbiguousIfSend<_>>::check();
    }

    #[test]
    fn test_next_entry_does_not_modify_state() {
        let entry = next_entry();
        assert_eq!(
            entry,
            ScopeEntry {
                depth: 1,
                nested: false
            }
        );
        assert_eq!(map_depth(), Ok(0));
    }

    #[tokio::test]
    async fn test_task_local_depth_is_visible() {
        let depth = scope_future(2, async { map_depth() }).await;
        assert_eq!(depth, Ok(2));
        assert_eq!(map_depth(), Ok(0));

        let entry = scope_future(1, async { next_entry() }).await;
        assert!(entry.nested);
        assert_eq!(entry.depth, 2);
    }
}
