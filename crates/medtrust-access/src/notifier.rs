//! The notification collaborator.
//!
//! Used for supervisor escalation when an emergency request needs
//! approval. Strictly best-effort: a failed or slow notification never
//! fails the request that triggered it.

use async_trait::async_trait;

use medtrust_core::ActorId;

/// Best-effort message delivery to a platform actor.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a message to the target actor.
    async fn notify(&self, target: &ActorId, message: &str) -> anyhow::Result<()>;
}

/// A notifier that drops everything.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _target: &ActorId, _message: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
