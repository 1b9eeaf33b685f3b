//! Per-block callback registration
//!
//! `subscribe()` splits a block handler into two halves:
//! - `Subscription` stays with the session and is cancelled on stop
//! - `BlockDispatcher` goes to the sample source and is invoked once per block
//!
//! Cancellation flips a shared flag that the dispatcher checks before every
//! call, so a cancelled subscription never reaches its handler again, even if
//! the source keeps producing blocks while it is being torn down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use super::block::SampleBlock;

/// Handler invoked with the subscription id and each completed block
pub type BlockHandler = Box<dyn FnMut(Uuid, SampleBlock) + Send + 'static>;

/// Session-side half of a block subscription.
/// Dropping it cancels the subscription.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop delivering blocks. Idempotent.
    pub fn cancel(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            log::debug!("Subscription {}: cancelled", self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Source-side half of a block subscription
pub struct BlockDispatcher {
    id: Uuid,
    active: Arc<AtomicBool>,
    handler: BlockHandler,
}

impl BlockDispatcher {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Deliver one block. Returns false (and drops the block) once cancelled.
    pub fn dispatch(&mut self, block: SampleBlock) -> bool {
        if !self.is_active() {
            return false;
        }
        (self.handler)(self.id, block);
        true
    }
}

impl std::fmt::Debug for BlockDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockDispatcher")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Create a new active subscription around `handler`
pub fn subscribe<F>(handler: F) -> (Subscription, BlockDispatcher)
where
    F: FnMut(Uuid, SampleBlock) + Send + 'static,
{
    let id = Uuid::new_v4();
    let active = Arc::new(AtomicBool::new(true));

    (
        Subscription {
            id,
            active: active.clone(),
        },
        BlockDispatcher {
            id,
            active,
            handler: Box::new(handler),
        },
    )
}
