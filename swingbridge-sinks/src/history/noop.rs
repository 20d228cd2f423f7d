use std::error::Error;

use async_trait::async_trait;

use swingbridge_domain::event::SessionEvent;

use super::EventSink;

#[derive(Default)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn save(&mut self, _: &[SessionEvent]) -> Result<(), Box<dyn Error>> {
        Ok(())
    }
    async fn close(mut self: Box<Self>) -> Result<(), Box<dyn Error>> {
        Ok(())
    }
}
