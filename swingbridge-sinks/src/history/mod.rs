pub mod jsonl;
pub mod noop;

use std::error::Error;

use async_trait::async_trait;

use swingbridge_domain::event::SessionEvent;

/// Somewhere to record what a session reported.
#[async_trait]
pub trait EventSink: Send {
    async fn save(&mut self, events: &[SessionEvent]) -> Result<(), Box<dyn Error>>;
    async fn close(mut self: Box<Self>) -> Result<(), Box<dyn Error>>;
}
