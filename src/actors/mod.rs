// Actor runtime substrate
//
// Every actor in this crate is a plain tokio task that owns a Mailbox and
// drains it one message at a time; all cross-actor interaction goes through
// cloneable ActorHandles. Handle identity (HandleId) is the key type for the
// registries' id<->handle indices, and LifecycleSignal is the liveness-loss
// edge: it resolves once the task behind a handle has ended, for any reason.

pub mod device;
pub mod group;
pub mod manager;
pub mod query;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, watch};

// Re-exports
pub use device::Device;
pub use group::DeviceGroup;
pub use manager::DeviceManager;
pub use query::ReadingsQuery;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a spawned actor, usable as a map key even
/// after the actor is gone. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    fn next() -> Self {
        HandleId(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Receiving half of an actor, owned by its task. The embedded watch sender
/// is dropped together with the task state, which is what flips every
/// outstanding [`LifecycleSignal`]; a panicked or aborted task signals the
/// same way as a clean return.
pub struct Mailbox<M> {
    rx: mpsc::UnboundedReceiver<M>,
    _alive: watch::Sender<()>,
}

impl<M> Mailbox<M> {
    /// Next inbound message, or `None` once every external handle is gone.
    pub async fn recv(&mut self) -> Option<M> {
        self.rx.recv().await
    }
}

/// Cloneable address of a live (or formerly live) actor.
///
/// Equality and hashing go by [`HandleId`], so two clones of the same
/// handle compare equal and a handle still works as a map key after the
/// actor stopped.
pub struct ActorHandle<M> {
    id: HandleId,
    tx: mpsc::UnboundedSender<M>,
    lifecycle: LifecycleSignal,
}

impl<M> ActorHandle<M> {
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Fire-and-forget delivery. Returns false if the actor has stopped;
    /// the message (reply sender included) is dropped in that case.
    pub fn send(&self, msg: M) -> bool {
        self.tx.send(msg).is_ok()
    }

    /// Signal that resolves once the actor behind this handle has stopped.
    pub fn lifecycle(&self) -> LifecycleSignal {
        self.lifecycle.clone()
    }

    /// Weak form of the send side, for watches that must not keep the
    /// mailbox open on their own.
    pub fn weak(&self) -> mpsc::WeakUnboundedSender<M> {
        self.tx.downgrade()
    }
}

impl<M> Clone for ActorHandle<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            tx: self.tx.clone(),
            lifecycle: self.lifecycle.clone(),
        }
    }
}

impl<M> PartialEq for ActorHandle<M> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<M> Eq for ActorHandle<M> {}

impl<M> Hash for ActorHandle<M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<M> fmt::Debug for ActorHandle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ActorHandle").field(&self.id).finish()
    }
}

/// Completes once the actor behind a handle has stopped. Cloneable; every
/// clone resolves independently, at most once, and immediately if the actor
/// is already gone.
#[derive(Clone)]
pub struct LifecycleSignal {
    rx: watch::Receiver<()>,
}

impl LifecycleSignal {
    pub async fn stopped(mut self) {
        // The sender never publishes a value; the Err on changed() is the
        // drop of the actor task's state.
        while self.rx.changed().await.is_ok() {}
    }
}

/// Creates a fresh handle/mailbox pair for an actor about to be spawned.
pub fn mailbox<M>() -> (ActorHandle<M>, Mailbox<M>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (alive_tx, alive_rx) = watch::channel(());
    let handle = ActorHandle {
        id: HandleId::next(),
        tx,
        lifecycle: LifecycleSignal { rx: alive_rx },
    };
    let mailbox = Mailbox { rx, _alive: alive_tx };
    (handle, mailbox)
}

/// Subscribes an observer to a child's termination: when the child stops,
/// `make(child_handle_id)` is posted into the observer's mailbox, at most
/// once. The observer side is weak, so a watch outliving its observer goes
/// nowhere instead of keeping the observer's mailbox open.
pub fn observe_stop<C, M, F>(child: &ActorHandle<C>, observer: &mpsc::WeakUnboundedSender<M>, make: F)
where
    M: Send + 'static,
    F: FnOnce(HandleId) -> M + Send + 'static,
{
    let signal = child.lifecycle();
    let child_id = child.id();
    let observer = observer.clone();
    tokio::spawn(async move {
        signal.stopped().await;
        if let Some(tx) = observer.upgrade() {
            // The observer may stop between upgrade and send; both paths
            // just drop the notification.
            let _ = tx.send(make(child_id));
        }
    });
}
