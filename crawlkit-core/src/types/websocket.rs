//! WebSocket observation and learned framing (§3, grounds §4.12).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebSocketDirection {
    Sent,
    Received,
}

/// One frame observed on a WebSocket connection during a browse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketFrame {
    pub direction: WebSocketDirection,
    pub payload: String,
    pub timestamp: DateTime<Utc>,
}

/// A single observed connection, with every frame exchanged over it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConnection {
    pub url: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub frames: Vec<WebSocketFrame>,
}

impl WebSocketConnection {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            opened_at: Utc::now(),
            closed_at: None,
            frames: Vec::new(),
        }
    }

    pub fn received_frames(&self) -> impl Iterator<Item = &WebSocketFrame> {
        self.frames
            .iter()
            .filter(|f| matches!(f.direction, WebSocketDirection::Received))
    }
}

/// A message-shape heuristic: does a given frame payload look like it
/// matches this pattern's learned envelope (§4.12)?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameShape {
    /// Top-level JSON object with a `type`/`event`/`channel` discriminator.
    TypedEnvelope,
    /// Bare JSON array of records.
    JsonArray,
    /// Plain JSON object with no discriminator field.
    PlainObject,
}

/// A learned recipe for extracting content updates from a domain's
/// WebSocket traffic, rather than re-sniffing every frame from scratch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketPattern {
    pub id: String,
    pub domain: String,
    pub url_pattern: String,
    pub shape: FrameShape,
    /// Key (for `TypedEnvelope`) whose value identifies content-bearing
    /// frames, e.g. `"type"` with expected value `"update"`.
    pub discriminator_key: Option<String>,
    pub discriminator_value: Option<String>,
    /// Dot-path into the frame payload that holds the content itself.
    pub content_path: Option<String>,
    pub confidence: f32,
    pub observed_count: u64,
    pub created_at: DateTime<Utc>,
}

impl WebSocketPattern {
    pub fn new(id: impl Into<String>, domain: impl Into<String>, url_pattern: impl Into<String>, shape: FrameShape) -> Self {
        Self {
            id: id.into(),
            domain: domain.into(),
            url_pattern: url_pattern.into(),
            shape,
            discriminator_key: None,
            discriminator_value: None,
            content_path: None,
            confidence: 0.3,
            observed_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn record_observation(&mut self) {
        self.observed_count += 1;
        self.confidence = (self.confidence + 0.05).min(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_filters_received_frames() {
        let mut conn = WebSocketConnection::new("wss://example.com/ws");
        conn.frames.push(WebSocketFrame {
            direction: WebSocketDirection::Sent,
            payload: "{\"ping\":1}".into(),
            timestamp: Utc::now(),
        });
        conn.frames.push(WebSocketFrame {
            direction: WebSocketDirection::Received,
            payload: "{\"type\":\"update\"}".into(),
            timestamp: Utc::now(),
        });

        assert_eq!(conn.received_frames().count(), 1);
    }

    #[test]
    fn pattern_confidence_grows_with_observations() {
        let mut p = WebSocketPattern::new("ws-1", "example.com", "wss://example.com/ws", FrameShape::TypedEnvelope);
        let base = p.confidence;
        p.record_observation();
        assert!(p.confidence > base);
    }
}
