//! `WebSocketPatternLearner` (C14, §4.12).

use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crawlkit_core::types::{FrameShape, WebSocketConnection, WebSocketDirection, WebSocketPattern};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    SocketIo,
    Sse,
    WebSocket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnedConfidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Query,
    Header,
    Cookie,
    Token,
}

#[derive(Debug, Clone)]
pub struct MessagePatternGroup {
    pub direction: WebSocketDirection,
    pub event: Option<String>,
    pub frequency: usize,
    pub avg_inter_arrival_ms: f64,
    pub is_handshake: bool,
    pub is_heartbeat: bool,
}

#[derive(Debug, Clone)]
pub struct LearnedWebSocketInsight {
    pub protocol: Protocol,
    pub confidence: LearnedConfidence,
    pub can_replay: bool,
    pub message_groups: Vec<MessagePatternGroup>,
    pub auth_required: bool,
    pub auth_method: Option<AuthMethod>,
    pub auth_param: Option<String>,
    pub pattern: WebSocketPattern,
}

const PING_TOKENS: &[&str] = &["ping", "pong", "heartbeat"];
const AUTH_FIELD_MARKERS: &[&str] = &["token", "auth", "authorization"];

/// Learn a [`WebSocketPattern`] plus supporting insight from one observed
/// connection (§4.12).
pub fn learn(domain: &str, connection: &WebSocketConnection, headers: &HashMap<String, String>) -> LearnedWebSocketInsight {
    let url = url::Url::parse(&connection.url).ok();
    let protocol = detect_protocol(domain, connection, &url);
    let duration_secs = connection
        .closed_at
        .map(|closed| (closed - connection.opened_at).num_milliseconds() as f64 / 1000.0)
        .unwrap_or(0.0);

    let confidence = if connection.frames.len() >= 10 && duration_secs >= 5.0 {
        LearnedConfidence::High
    } else if connection.frames.len() >= 3 {
        LearnedConfidence::Medium
    } else {
        LearnedConfidence::Low
    };

    let message_groups = group_messages(connection);
    let can_replay = match protocol {
        Protocol::SocketIo | Protocol::Sse => true,
        Protocol::WebSocket => !message_groups.is_empty() && duration_secs >= 1.0,
    };

    let (auth_required, auth_method, auth_param) = detect_auth(connection, headers, url.as_ref());

    let endpoint = url.as_ref().map(|u| u.path().to_string()).unwrap_or_default();
    let id = pattern_id(domain, &endpoint, protocol);
    let url_pattern = url
        .as_ref()
        .map(|u| scrub_auth_params(u))
        .unwrap_or_else(|| connection.url.clone());

    let shape = infer_shape(connection);
    let mut pattern = WebSocketPattern::new(id, domain, url_pattern, shape);
    pattern.confidence = match confidence {
        LearnedConfidence::High => 0.9,
        LearnedConfidence::Medium => 0.6,
        LearnedConfidence::Low => 0.3,
    };
    pattern.observed_count = connection.frames.len() as u64;

    LearnedWebSocketInsight {
        protocol,
        confidence,
        can_replay,
        message_groups,
        auth_required,
        auth_method,
        auth_param,
        pattern,
    }
}

fn detect_protocol(domain: &str, connection: &WebSocketConnection, url: &Option<url::Url>) -> Protocol {
    let looks_socket_io = connection.url.contains("socket.io")
        || connection.frames.iter().any(|f| f.payload.starts_with("42") || f.payload.starts_with('0'));
    if looks_socket_io {
        return Protocol::SocketIo;
    }
    if domain.ends_with(".firebaseio.com") {
        return Protocol::WebSocket;
    }
    if url
        .as_ref()
        .map(|u| u.scheme() == "https" && connection.url.contains("event-stream"))
        .unwrap_or(false)
    {
        return Protocol::Sse;
    }
    Protocol::WebSocket
}

fn infer_shape(connection: &WebSocketConnection) -> FrameShape {
    for frame in &connection.frames {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&frame.payload) {
            if value.is_array() {
                return FrameShape::JsonArray;
            }
            if let Some(obj) = value.as_object() {
                if obj.contains_key("type") || obj.contains_key("event") || obj.contains_key("channel") {
                    return FrameShape::TypedEnvelope;
                }
                return FrameShape::PlainObject;
            }
        }
    }
    FrameShape::PlainObject
}

fn group_messages(connection: &WebSocketConnection) -> Vec<MessagePatternGroup> {
    let mut groups: HashMap<(String, Option<String>), Vec<chrono::DateTime<chrono::Utc>>> = HashMap::new();

    for frame in &connection.frames {
        let direction_key = format!("{:?}", frame.direction);
        let event = extract_field(&frame.payload, "event").or_else(|| extract_field(&frame.payload, "type"));
        groups
            .entry((direction_key, event))
            .or_default()
            .push(frame.timestamp);
    }

    groups
        .into_iter()
        .map(|((direction_key, event), timestamps)| {
            let direction = if direction_key.contains("Sent") {
                WebSocketDirection::Sent
            } else {
                WebSocketDirection::Received
            };
            let mut sorted = timestamps.clone();
            sorted.sort();
            let avg_inter_arrival_ms = if sorted.len() > 1 {
                let total: i64 = sorted.windows(2).map(|w| (w[1] - w[0]).num_milliseconds()).sum();
                total as f64 / (sorted.len() - 1) as f64
            } else {
                0.0
            };

            let is_handshake = event
                .as_deref()
                .map(|e| matches!(e, "open" | "connect"))
                .unwrap_or(false);
            let is_heartbeat = event
                .as_deref()
                .map(|e| PING_TOKENS.iter().any(|t| e.eq_ignore_ascii_case(t)))
                .unwrap_or(false);

            MessagePatternGroup {
                direction,
                event,
                frequency: sorted.len(),
                avg_inter_arrival_ms,
                is_handshake,
                is_heartbeat,
            }
        })
        .collect()
}

fn extract_field(payload: &str, field: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    value.get(field)?.as_str().map(str::to_string)
}

fn detect_auth(
    connection: &WebSocketConnection,
    headers: &HashMap<String, String>,
    url: Option<&url::Url>,
) -> (bool, Option<AuthMethod>, Option<String>) {
    if let Some(url) = url {
        for (key, _) in url.query_pairs() {
            if key == "token" || key == "auth" {
                return (true, Some(AuthMethod::Query), Some(key.into_owned()));
            }
        }
    }

    if headers.contains_key("Authorization") {
        return (true, Some(AuthMethod::Header), None);
    }
    if headers.contains_key("Cookie") {
        return (true, Some(AuthMethod::Cookie), None);
    }

    for frame in &connection.frames {
        let lower = frame.payload.to_lowercase();
        if AUTH_FIELD_MARKERS.iter().any(|m| lower.contains(m)) {
            return (true, Some(AuthMethod::Token), None);
        }
    }

    (false, None, None)
}

fn scrub_auth_params(url: &url::Url) -> String {
    let mut out = format!("{}://{}{}", url.scheme(), url.host_str().unwrap_or(""), url.path());
    let remaining: Vec<String> = url
        .query_pairs()
        .filter(|(k, _)| !AUTH_FIELD_MARKERS.iter().any(|m| k.eq_ignore_ascii_case(m)) && k != "token" && k != "auth")
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    if !remaining.is_empty() {
        out.push('?');
        out.push_str(&remaining.join("&"));
    }
    out
}

fn pattern_id(domain: &str, endpoint: &str, protocol: Protocol) -> String {
    let protocol_str = match protocol {
        Protocol::SocketIo => "socket.io",
        Protocol::Sse => "sse",
        Protocol::WebSocket => "websocket",
    };
    let mut hasher = Sha256::new();
    hasher.update(format!("{domain}:{endpoint}:{protocol_str}").as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawlkit_core::types::WebSocketFrame;
    use chrono::Utc;

    fn connection_with_frames(count: usize, duration_secs: i64) -> WebSocketConnection {
        let opened_at = Utc::now();
        let mut conn = WebSocketConnection {
            url: "wss://example.com/ws".to_string(),
            opened_at,
            closed_at: Some(opened_at + chrono::Duration::seconds(duration_secs)),
            frames: Vec::new(),
        };
        for i in 0..count {
            conn.frames.push(WebSocketFrame {
                direction: WebSocketDirection::Received,
                payload: format!(r#"{{"type":"update","seq":{i}}}"#),
                timestamp: opened_at + chrono::Duration::milliseconds(i as i64 * 100),
            });
        }
        conn
    }

    #[test]
    fn high_confidence_requires_message_count_and_duration() {
        let conn = connection_with_frames(12, 6);
        let insight = learn("example.com", &conn, &HashMap::new());
        assert_eq!(insight.confidence, LearnedConfidence::High);
    }

    #[test]
    fn low_confidence_for_sparse_short_connection() {
        let conn = connection_with_frames(1, 0);
        let insight = learn("example.com", &conn, &HashMap::new());
        assert_eq!(insight.confidence, LearnedConfidence::Low);
    }

    #[test]
    fn detects_query_auth_and_scrubs_url() {
        let mut conn = connection_with_frames(3, 2);
        conn.url = "wss://example.com/ws?token=secret123&room=general".to_string();
        let insight = learn("example.com", &conn, &HashMap::new());
        assert!(insight.auth_required);
        assert_eq!(insight.auth_method, Some(AuthMethod::Query));
        assert!(!insight.pattern.url_pattern.contains("secret123"));
        assert!(insight.pattern.url_pattern.contains("room=general"));
    }

    #[test]
    fn typed_envelope_frames_are_grouped_by_event() {
        let conn = connection_with_frames(4, 2);
        let insight = learn("example.com", &conn, &HashMap::new());
        assert!(insight.message_groups.iter().any(|g| g.event.as_deref() == Some("update")));
    }
}
