use std::error::Error;
use std::path::Path;

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};

use swingbridge_domain::event::SessionEvent;

use super::EventSink;

/// Appends one JSON object per event to a file.
pub struct JsonLinesEventSink {
    writer: BufWriter<tokio::fs::File>,
}

impl JsonLinesEventSink {
    pub async fn create_from_file(path: &Path) -> Result<Box<dyn EventSink>, Box<dyn Error>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Box::new(JsonLinesEventSink {
            writer: BufWriter::new(file),
        }))
    }
}

#[async_trait]
impl EventSink for JsonLinesEventSink {
    async fn save(&mut self, events: &[SessionEvent]) -> Result<(), Box<dyn Error>> {
        for event in events {
            let mut line = serde_json::to_vec(event)?;
            line.push(b'\n');
            self.writer.write_all(&line).await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> Result<(), Box<dyn Error>> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use swingbridge_domain::event::{SessionEventKind, SessionFault};
    use swingbridge_domain::message::{ConnectionStatus, DecodedMessage};

    #[tokio::test]
    async fn appends_one_event_per_line() {
        let path = std::env::temp_dir().join(format!("swingbridge-{}.jsonl", std::process::id()));
        let _ = tokio::fs::remove_file(&path).await;

        let events = vec![
            SessionEvent::status(ConnectionStatus::Connected),
            SessionEvent::message(DecodedMessage::BatteryLevel(80)),
            SessionEvent::error(SessionFault::LinkClosed),
        ];
        let mut sink = JsonLinesEventSink::create_from_file(&path).await.unwrap();
        sink.save(&events[..2]).await.unwrap();
        sink.save(&events[2..]).await.unwrap();
        sink.close().await.unwrap();

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        let read_back: Vec<SessionEvent> = written
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(read_back, events);
        assert_eq!(read_back[2].kind, SessionEventKind::Error(SessionFault::LinkClosed));
        tokio::fs::remove_file(&path).await.unwrap();
    }
}
