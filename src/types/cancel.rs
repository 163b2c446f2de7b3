//! Cancellation scopes and triggers.
//!
//! Cancellation is cooperative and cascades along the stage graph. Every
//! stage owns a node in a scope tree; waits inside a cancelled scope return
//! `Done` instead of blocking. A stage's *trigger* fires the scope node(s)
//! its cancellation must reach: a factory stage fires its own root, a
//! unary derived stage shares its source's trigger, a binary derived stage
//! fires both sources' triggers.
//!
//! ```text
//!  supply_async ──┐                         root scope A
//!       │         │ then_combine            root scope B
//!       ▼         ▼
//!     derived stage          scope: child(A)
//!                            trigger: fire(A) + fire(B)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A node in the cancellation tree.
///
/// Cancelling a scope cancels every descendant: descendants hold a parent
/// link and `is_cancelled` walks to the root. Cancellation is idempotent
/// and cannot be undone.
#[derive(Debug, Clone)]
pub struct Scope {
    node: Arc<ScopeNode>,
}

#[derive(Debug)]
struct ScopeNode {
    cancelled: AtomicBool,
    parent: Option<Arc<ScopeNode>>,
}

impl Scope {
    /// Creates a fresh root scope.
    #[must_use]
    pub fn root() -> Self {
        Self {
            node: Arc::new(ScopeNode {
                cancelled: AtomicBool::new(false),
                parent: None,
            }),
        }
    }

    /// Derives a child scope. Cancelling the parent cancels the child;
    /// cancelling the child leaves the parent untouched.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            node: Arc::new(ScopeNode {
                cancelled: AtomicBool::new(false),
                parent: Some(Arc::clone(&self.node)),
            }),
        }
    }

    /// Cancels this scope and, transitively, every scope derived from it.
    pub fn cancel(&self) {
        self.node.cancelled.store(true, Ordering::Release);
    }

    /// Returns true if this scope or any ancestor has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        let mut node = Some(&self.node);
        while let Some(n) = node {
            if n.cancelled.load(Ordering::Acquire) {
                return true;
            }
            node = n.parent.as_ref();
        }
        false
    }
}

/// A stage's cancel trigger: the composite of scope nodes its `cancel()`
/// must fire.
///
/// Cloneable and idempotent. Unary combinators share their source's
/// trigger so that cancelling anywhere in a linear chain cancels the whole
/// chain from its producer down.
#[derive(Clone)]
pub struct Canceller {
    fire: Arc<dyn Fn() + Send + Sync>,
}

impl Canceller {
    /// A trigger that cancels the given scope.
    #[must_use]
    pub fn for_scope(scope: &Scope) -> Self {
        let scope = scope.clone();
        Self {
            fire: Arc::new(move || scope.cancel()),
        }
    }

    /// A trigger that fires both operands, for binary combinators.
    #[must_use]
    pub fn joined(first: &Self, second: &Self) -> Self {
        let (a, b) = (first.clone(), second.clone());
        Self {
            fire: Arc::new(move || {
                a.fire();
                b.fire();
            }),
        }
    }

    /// A trigger that fires every operand, for group stages.
    #[must_use]
    pub fn fan_out(triggers: Vec<Self>) -> Self {
        Self {
            fire: Arc::new(move || {
                for t in &triggers {
                    t.fire();
                }
            }),
        }
    }

    /// Fires the trigger.
    pub fn fire(&self) {
        (self.fire)();
    }
}

impl std::fmt::Debug for Canceller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canceller").finish_non_exhaustive()
    }
}

/// A trigger slot bound after derivation.
///
/// `then_compose` wires this into the derived trigger before the inner
/// stage exists; once the callback produces the inner stage, its trigger is
/// bound here so that cancelling the composed stage reaches the inner one.
#[derive(Clone)]
pub(crate) struct LateCanceller {
    slot: Arc<Mutex<Option<Canceller>>>,
}

impl LateCanceller {
    pub(crate) fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Binds the inner trigger. Later bindings overwrite earlier ones;
    /// the slot is only ever bound once in practice.
    pub(crate) fn bind(&self, canceller: Canceller) {
        *self.slot.lock().expect("late canceller lock poisoned") = Some(canceller);
    }

    /// A trigger that fires whatever has been bound so far.
    pub(crate) fn handle(&self) -> Canceller {
        let slot = Arc::clone(&self.slot);
        Canceller {
            fire: Arc::new(move || {
                let bound = slot.lock().expect("late canceller lock poisoned").clone();
                if let Some(c) = bound {
                    c.fire();
                }
            }),
        }
    }
}
