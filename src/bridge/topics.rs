//! Topic layout under the configured prefix and inbound routing

use serde::Deserialize;

use crate::models::InboundEvent;

#[derive(Debug, Clone)]
pub struct Topics {
    prefix: String,
}

/// `{"target_position": 100}` or `{"target_position": "100"}`
#[derive(Deserialize)]
struct CommandPayload {
    target_position: serde_json::Value,
}

impl Topics {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    /// State, `error` and `infos` frames
    pub fn frame(&self, id: &str) -> String {
        format!("{}/{}", self.prefix, id)
    }

    pub fn config(&self, id: &str) -> String {
        format!("{}/{}/config", self.prefix, id)
    }

    pub fn command(&self, id: &str) -> String {
        format!("{}/{}/set", self.prefix, id)
    }

    pub fn refresh(&self) -> String {
        format!("{}/refresh", self.prefix)
    }

    pub fn connected(&self) -> String {
        format!("{}/connected", self.prefix)
    }

    /// Map an inbound message to an engine event; unknown topics and
    /// undecodable payloads yield `None`.
    pub fn route(&self, topic: &str, payload: &str) -> Option<InboundEvent> {
        if topic == self.refresh() {
            return Some(InboundEvent::Refresh(payload.trim().to_string()));
        }

        let module = topic
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('/')?
            .strip_suffix("/set")?;
        if module.is_empty() || module.contains('/') {
            return None;
        }

        let command: CommandPayload = match serde_json::from_str(payload) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!("[Bridge] Invalid payload on {}: {}", topic, e);
                return None;
            }
        };
        let target_position = match command.target_position {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => whole_number(&n),
            other => {
                tracing::warn!("[Bridge] Invalid target_position on {}: {}", topic, other);
                return None;
            }
        };
        Some(InboundEvent::Command {
            module_topic: module.to_string(),
            target_position,
        })
    }
}

/// `50.0` is sent as `50`; fractional values are kept as written and
/// rejected by the dispatcher.
fn whole_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => (f as i64).to_string(),
        _ => n.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_layout() {
        let topics = Topics::new("idiamant/");
        assert_eq!(topics.frame("m1"), "idiamant/m1");
        assert_eq!(topics.config("m1"), "idiamant/m1/config");
        assert_eq!(topics.command("m1"), "idiamant/m1/set");
        assert_eq!(topics.refresh(), "idiamant/refresh");
        assert_eq!(topics.connected(), "idiamant/connected");
    }

    #[test]
    fn test_route_command_number_or_string() {
        let topics = Topics::new("idiamant");
        let expected = Some(InboundEvent::Command {
            module_topic: "70:ee:50:aa".to_string(),
            target_position: "100".to_string(),
        });
        assert_eq!(
            topics.route("idiamant/70:ee:50:aa/set", r#"{"target_position": 100}"#),
            expected
        );
        assert_eq!(
            topics.route("idiamant/70:ee:50:aa/set", r#"{"target_position": "100"}"#),
            expected
        );
    }

    #[test]
    fn test_route_command_whole_float() {
        let topics = Topics::new("idiamant");
        let position = |payload: &str| match topics.route("idiamant/m1/set", payload) {
            Some(InboundEvent::Command { target_position, .. }) => target_position,
            other => panic!("unexpected route: {other:?}"),
        };

        assert_eq!(position(r#"{"target_position": 50.0}"#), "50");
        assert_eq!(position(r#"{"target_position": 0.0}"#), "0");
        assert_eq!(position(r#"{"target_position": 50.5}"#), "50.5");
        assert!(position(r#"{"target_position": 50.5}"#).parse::<i64>().is_err());
    }

    #[test]
    fn test_route_refresh() {
        let topics = Topics::new("idiamant");
        assert_eq!(
            topics.route("idiamant/refresh", "refresh\n"),
            Some(InboundEvent::Refresh("refresh".to_string()))
        );
    }

    #[test]
    fn test_route_rejects_foreign_topics() {
        let topics = Topics::new("idiamant");
        assert_eq!(topics.route("other/m1/set", r#"{"target_position": 1}"#), None);
        assert_eq!(topics.route("idiamant/m1", r#"{"target_position": 1}"#), None);
        assert_eq!(topics.route("idiamant/a/b/set", r#"{"target_position": 1}"#), None);
        assert_eq!(topics.route("idiamantx/m1/set", r#"{"target_position": 1}"#), None);
        assert_eq!(topics.route("idiamant/m1/set", "100"), None);
        assert_eq!(topics.route("idiamant/m1/set", r#"{"target_position": null}"#), None);
    }
}
