//! Lazy front-end: record a combinator chain now, materialise it on
//! demand.
//!
//! A [`LazyStage`] does not run anything when a combinator is called; it
//! appends a *recorded action* to a shared chain and hands back a handle
//! onto the new tail. The first terminal operation (`get`, `join`)
//! materialises the chain head-first into eager stages, caching each
//! node's stage so repeated joins are free:
//!
//! ```text
//!  head(unmaterialised) ──► node ──► node ──► tail
//!  [join] ─────────────────────────────────► every visited node caches
//!                                            its eager Stage
//! ```
//!
//! Because nothing runs until a terminal call, external completion applied
//! before that point can reroute the computation: `complete` delivers to
//! the earliest node with a live materialised stage, so a value injected
//! at the head wins against the head's own (still sleeping) producer.
//!
//! Chains are linear: each recorded action consumes the previous node's
//! stage. Binary combinators carry their second lazy source inside the
//! action and join it recursively when the node materialises.

use crate::error::{Error, Result};
use crate::executor::ExecutorHandle;
use crate::stage::{completed as eager_completed, run_async as eager_run_async,
    supply_async as eager_supply_async, Stage, StageOps};
use crate::types::{PanicPayload, Unit};
use parking_lot::{Mutex, ReentrantMutex};
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// A recorded action: previous node's materialised stage in, this node's
/// stage out. Factory nodes ignore their input.
type Materialiser = Box<dyn FnOnce(Option<AnyStage>) -> AnyStage + Send>;

/// A type-erased materialised stage: the typed handle for chain-internal
/// downcasts plus the object-safe completion face.
#[derive(Clone)]
pub(crate) struct AnyStage {
    typed: Arc<dyn Any + Send + Sync>,
    ops: Arc<dyn StageOps>,
}

impl AnyStage {
    fn new<T: Clone + Send + Sync + 'static>(stage: Stage<T>) -> Self {
        Self {
            typed: Arc::new(stage.clone()),
            ops: Arc::new(stage),
        }
    }

    fn downcast<T: Clone + Send + 'static>(&self) -> Stage<T> {
        self.typed
            .downcast_ref::<Stage<T>>()
            .expect("lazy chain preserves stage types")
            .clone()
    }

    fn ops(&self) -> &dyn StageOps {
        self.ops.as_ref()
    }
}

struct LazyNode {
    action: Mutex<Option<Materialiser>>,
    origin: Mutex<Option<AnyStage>>,
}

impl LazyNode {
    fn new(action: Materialiser) -> Arc<Self> {
        Arc::new(Self {
            action: Mutex::new(Some(action)),
            origin: Mutex::new(None),
        })
    }

    fn cached(&self) -> Option<AnyStage> {
        self.origin.lock().clone()
    }
}

struct LazyChain {
    nodes: Mutex<Vec<Arc<LazyNode>>>,
    /// Serialises materialisation. Reentrant so a node whose second source
    /// lives on the same chain can join it from inside its own action.
    join_lock: ReentrantMutex<()>,
}

/// A handle onto one node of a recorded combinator chain.
///
/// Combinator methods mirror [`Stage`]'s but only record; terminal
/// operations materialise. See the [module docs](crate::lazy).
pub struct LazyStage<T> {
    chain: Arc<LazyChain>,
    node: Arc<LazyNode>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for LazyStage<T> {
    fn clone(&self) -> Self {
        Self {
            chain: Arc::clone(&self.chain),
            node: Arc::clone(&self.node),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for LazyStage<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyStage")
            .field("chain_len", &self.chain.nodes.lock().len())
            .field("materialised", &self.node.cached().is_some())
            .finish()
    }
}

fn new_chain<T>(action: Materialiser) -> LazyStage<T> {
    let node = LazyNode::new(action);
    let chain = Arc::new(LazyChain {
        nodes: Mutex::new(vec![Arc::clone(&node)]),
        join_lock: ReentrantMutex::new(()),
    });
    LazyStage {
        chain,
        node,
        _marker: PhantomData,
    }
}

// ----------------------------------------------------------------------
// Factories
// ----------------------------------------------------------------------

/// Lazy form of [`completed`](crate::completed): the filled stage is not
/// built until the chain materialises.
pub fn completed<T: Clone + Send + Sync + 'static>(value: T) -> LazyStage<T> {
    new_chain(Box::new(move |_| AnyStage::new(eager_completed(value))))
}

/// Lazy form of [`supply_async`](crate::supply_async): `f` is not
/// scheduled until the chain materialises.
pub fn supply_async<T, F>(f: F, executor: Option<ExecutorHandle>) -> LazyStage<T>
where
    T: Clone + Send + Sync + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    new_chain(Box::new(move |_| {
        AnyStage::new(eager_supply_async(f, executor))
    }))
}

/// Lazy form of [`run_async`](crate::run_async).
pub fn run_async<F>(f: F, executor: Option<ExecutorHandle>) -> LazyStage<Unit>
where
    F: FnOnce() + Send + 'static,
{
    new_chain(Box::new(move |_| AnyStage::new(eager_run_async(f, executor))))
}

/// Wraps an eager stage as a (head) lazy node, so it can participate in
/// recorded chains.
pub fn from_stage<T: Clone + Send + Sync + 'static>(stage: Stage<T>) -> LazyStage<T> {
    new_chain(Box::new(move |_| AnyStage::new(stage)))
}

/// Lazy group join: materialising the result joins every constituent
/// chain, then builds the eager [`all_of`](crate::all_of) stage.
pub fn all_of<T: Clone + Send + Sync + 'static>(stages: &[LazyStage<T>]) -> LazyStage<Unit> {
    let stages = stages.to_vec();
    new_chain(Box::new(move |_| {
        let joined: Vec<Stage<T>> = stages.iter().map(LazyStage::join).collect();
        AnyStage::new(crate::group::all_of(&joined))
    }))
}

/// Lazy group race: materialising the result joins every constituent
/// chain, then builds the eager [`any_of`](crate::any_of) stage. Losers
/// are not cancelled, matching the eager policy.
pub fn any_of<T: Clone + Send + Sync + 'static>(stages: &[LazyStage<T>]) -> LazyStage<T> {
    let stages = stages.to_vec();
    new_chain(Box::new(move |_| {
        let joined: Vec<Stage<T>> = stages.iter().map(LazyStage::join).collect();
        AnyStage::new(crate::group::any_of(&joined))
    }))
}

// ----------------------------------------------------------------------
// Recording and materialisation
// ----------------------------------------------------------------------

impl<T: Clone + Send + Sync + 'static> LazyStage<T> {
    fn append<U: Clone + Send + Sync + 'static>(&self, action: Materialiser) -> LazyStage<U> {
        let node = LazyNode::new(action);
        self.chain.nodes.lock().push(Arc::clone(&node));
        LazyStage {
            chain: Arc::clone(&self.chain),
            node,
            _marker: PhantomData,
        }
    }

    fn join_erased(&self) -> AnyStage {
        let _guard = self.chain.join_lock.lock();
        if let Some(cached) = self.node.cached() {
            return cached;
        }
        let nodes = self.chain.nodes.lock().clone();
        let mut previous: Option<AnyStage> = None;
        for node in &nodes {
            let stage = match node.cached() {
                Some(stage) => stage,
                None => {
                    let action = node
                        .action
                        .lock()
                        .take()
                        .expect("unmaterialised node retains its action");
                    let stage = action(previous.take());
                    *node.origin.lock() = Some(stage.clone());
                    stage
                }
            };
            let reached_self = Arc::ptr_eq(node, &self.node);
            previous = Some(stage);
            if reached_self {
                break;
            }
        }
        previous.expect("chain contains the joined node")
    }

    /// Materialises head→self and returns this node's eager stage.
    /// Idempotent: repeated joins observe the cached stages.
    pub fn join(&self) -> Stage<T> {
        self.join_erased().downcast::<T>()
    }

    // ------------------------------------------------------------------
    // Terminal operations
    // ------------------------------------------------------------------

    /// Materialises the chain and waits for this node's outcome.
    pub fn get(&self) -> Result<T> {
        self.join().get()
    }

    /// Materialises the chain and waits with a timeout.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T> {
        self.join().get_timeout(timeout)
    }

    /// Delivers `value` to the earliest node with a live materialised
    /// stage. Returns false if nothing is materialised yet or the first
    /// live stage holds a different value type.
    pub fn complete(&self, value: T) -> bool {
        match self.first_live() {
            Some(stage) => stage.ops().complete_boxed(Box::new(value)).is_ok(),
            None => false,
        }
    }

    /// Delivers a logical error to the earliest live node.
    pub fn complete_error(&self, error: Error) -> bool {
        self.first_live()
            .is_some_and(|stage| stage.ops().complete_error_erased(error))
    }

    /// Delivers an abnormal termination to the earliest live node.
    pub fn complete_exceptionally(&self, payload: impl Into<PanicPayload>) -> bool {
        let payload = payload.into();
        self.first_live()
            .is_some_and(|stage| stage.ops().complete_exceptionally_erased(payload))
    }

    /// Cancels every materialised node's stage. Returns true if any stage
    /// transitioned to cancelled.
    pub fn cancel(&self) -> bool {
        let nodes = self.chain.nodes.lock().clone();
        let mut any = false;
        for node in &nodes {
            if let Some(stage) = node.cached() {
                any |= stage.ops().cancel_erased();
            }
        }
        any
    }

    /// Reports this node's materialised stage; false when unmaterialised.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.node
            .cached()
            .is_some_and(|stage| stage.ops().is_done_erased())
    }

    /// Reports this node's materialised stage; false when unmaterialised.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.node
            .cached()
            .is_some_and(|stage| stage.ops().is_cancelled_erased())
    }

    fn first_live(&self) -> Option<AnyStage> {
        let nodes = self.chain.nodes.lock().clone();
        nodes.iter().find_map(|node| node.cached())
    }

    // ------------------------------------------------------------------
    // Recorded combinators: unary chain
    // ------------------------------------------------------------------

    /// Records [`Stage::then_apply`].
    pub fn then_apply<U, F>(&self, f: F) -> LazyStage<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).then_apply(f))
        }))
    }

    /// Records [`Stage::then_apply_async`].
    pub fn then_apply_async<U, F>(&self, f: F, executor: Option<ExecutorHandle>) -> LazyStage<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).then_apply_async(f, executor))
        }))
    }

    /// Records [`Stage::then_accept`].
    pub fn then_accept<F>(&self, f: F) -> LazyStage<Unit>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).then_accept(f))
        }))
    }

    /// Records [`Stage::then_accept_async`].
    pub fn then_accept_async<F>(&self, f: F, executor: Option<ExecutorHandle>) -> LazyStage<Unit>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).then_accept_async(f, executor))
        }))
    }

    /// Records [`Stage::then_run`].
    pub fn then_run<F>(&self, f: F) -> LazyStage<Unit>
    where
        F: FnOnce() + Send + 'static,
    {
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).then_run(f))
        }))
    }

    /// Records [`Stage::then_run_async`].
    pub fn then_run_async<F>(&self, f: F, executor: Option<ExecutorHandle>) -> LazyStage<Unit>
    where
        F: FnOnce() + Send + 'static,
    {
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).then_run_async(f, executor))
        }))
    }

    // ------------------------------------------------------------------
    // Recorded combinators: binary join
    // ------------------------------------------------------------------

    /// Records [`Stage::then_combine`]; the second chain joins when this
    /// node materialises.
    pub fn then_combine<U, V, F>(&self, other: &LazyStage<U>, f: F) -> LazyStage<V>
    where
        U: Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        F: FnOnce(T, U) -> V + Send + 'static,
    {
        let other = other.clone();
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).then_combine(&other.join(), f))
        }))
    }

    /// Records [`Stage::then_combine_async`].
    pub fn then_combine_async<U, V, F>(
        &self,
        other: &LazyStage<U>,
        f: F,
        executor: Option<ExecutorHandle>,
    ) -> LazyStage<V>
    where
        U: Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        F: FnOnce(T, U) -> V + Send + 'static,
    {
        let other = other.clone();
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).then_combine_async(&other.join(), f, executor))
        }))
    }

    /// Records [`Stage::then_accept_both`].
    pub fn then_accept_both<U, F>(&self, other: &LazyStage<U>, f: F) -> LazyStage<Unit>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T, U) + Send + 'static,
    {
        let other = other.clone();
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).then_accept_both(&other.join(), f))
        }))
    }

    /// Records [`Stage::then_accept_both_async`].
    pub fn then_accept_both_async<U, F>(
        &self,
        other: &LazyStage<U>,
        f: F,
        executor: Option<ExecutorHandle>,
    ) -> LazyStage<Unit>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T, U) + Send + 'static,
    {
        let other = other.clone();
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).then_accept_both_async(&other.join(), f, executor))
        }))
    }

    /// Records [`Stage::run_after_both`].
    pub fn run_after_both<U, F>(&self, other: &LazyStage<U>, f: F) -> LazyStage<Unit>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce() + Send + 'static,
    {
        let other = other.clone();
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).run_after_both(&other.join(), f))
        }))
    }

    /// Records [`Stage::run_after_both_async`].
    pub fn run_after_both_async<U, F>(
        &self,
        other: &LazyStage<U>,
        f: F,
        executor: Option<ExecutorHandle>,
    ) -> LazyStage<Unit>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce() + Send + 'static,
    {
        let other = other.clone();
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).run_after_both_async(&other.join(), f, executor))
        }))
    }

    // ------------------------------------------------------------------
    // Recorded combinators: binary race
    // ------------------------------------------------------------------

    /// Records [`Stage::apply_to_either`].
    pub fn apply_to_either<U, F>(&self, other: &LazyStage<T>, f: F) -> LazyStage<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let other = other.clone();
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).apply_to_either(&other.join(), f))
        }))
    }

    /// Records [`Stage::apply_to_either_async`].
    pub fn apply_to_either_async<U, F>(
        &self,
        other: &LazyStage<T>,
        f: F,
        executor: Option<ExecutorHandle>,
    ) -> LazyStage<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let other = other.clone();
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).apply_to_either_async(&other.join(), f, executor))
        }))
    }

    /// Records [`Stage::accept_either`].
    pub fn accept_either<F>(&self, other: &LazyStage<T>, f: F) -> LazyStage<Unit>
    where
        F: FnOnce(T) + Send + 'static,
    {
        let other = other.clone();
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).accept_either(&other.join(), f))
        }))
    }

    /// Records [`Stage::accept_either_async`].
    pub fn accept_either_async<F>(
        &self,
        other: &LazyStage<T>,
        f: F,
        executor: Option<ExecutorHandle>,
    ) -> LazyStage<Unit>
    where
        F: FnOnce(T) + Send + 'static,
    {
        let other = other.clone();
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).accept_either_async(&other.join(), f, executor))
        }))
    }

    /// Records [`Stage::run_after_either`].
    pub fn run_after_either<F>(&self, other: &LazyStage<T>, f: F) -> LazyStage<Unit>
    where
        F: FnOnce() + Send + 'static,
    {
        let other = other.clone();
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).run_after_either(&other.join(), f))
        }))
    }

    /// Records [`Stage::run_after_either_async`].
    pub fn run_after_either_async<F>(
        &self,
        other: &LazyStage<T>,
        f: F,
        executor: Option<ExecutorHandle>,
    ) -> LazyStage<Unit>
    where
        F: FnOnce() + Send + 'static,
    {
        let other = other.clone();
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).run_after_either_async(&other.join(), f, executor))
        }))
    }

    // ------------------------------------------------------------------
    // Recorded combinators: compose and recover
    // ------------------------------------------------------------------

    /// Records [`Stage::then_compose`].
    pub fn then_compose<U, F>(&self, f: F) -> LazyStage<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Stage<U> + Send + 'static,
    {
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).then_compose(f))
        }))
    }

    /// Records [`Stage::then_compose_async`].
    pub fn then_compose_async<U, F>(&self, f: F, executor: Option<ExecutorHandle>) -> LazyStage<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Stage<U> + Send + 'static,
    {
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).then_compose_async(f, executor))
        }))
    }

    /// Records [`Stage::exceptionally`].
    pub fn exceptionally<F>(&self, f: F) -> LazyStage<T>
    where
        F: FnOnce(PanicPayload) -> T + Send + 'static,
    {
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).exceptionally(f))
        }))
    }

    /// Records [`Stage::exceptionally_async`].
    pub fn exceptionally_async<F>(&self, f: F, executor: Option<ExecutorHandle>) -> LazyStage<T>
    where
        F: FnOnce(PanicPayload) -> T + Send + 'static,
    {
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).exceptionally_async(f, executor))
        }))
    }

    /// Records [`Stage::when_complete`].
    pub fn when_complete<F>(&self, f: F) -> LazyStage<T>
    where
        F: FnOnce(Option<&T>, Option<&PanicPayload>) + Send + 'static,
    {
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).when_complete(f))
        }))
    }

    /// Records [`Stage::when_complete_async`].
    pub fn when_complete_async<F>(&self, f: F, executor: Option<ExecutorHandle>) -> LazyStage<T>
    where
        F: FnOnce(Option<&T>, Option<&PanicPayload>) + Send + 'static,
    {
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).when_complete_async(f, executor))
        }))
    }

    /// Records [`Stage::handle`].
    pub fn handle<U, F>(&self, f: F) -> LazyStage<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(Option<T>, Option<PanicPayload>) -> U + Send + 'static,
    {
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).handle(f))
        }))
    }

    /// Records [`Stage::handle_async`].
    pub fn handle_async<U, F>(&self, f: F, executor: Option<ExecutorHandle>) -> LazyStage<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(Option<T>, Option<PanicPayload>) -> U + Send + 'static,
    {
        self.append(Box::new(move |prev| {
            AnyStage::new(source::<T>(prev).handle_async(f, executor))
        }))
    }
}

/// Recovers the typed previous stage inside a recorded action.
fn source<T: Clone + Send + 'static>(prev: Option<AnyStage>) -> Stage<T> {
    prev.expect("combinator node follows a producer").downcast()
}
