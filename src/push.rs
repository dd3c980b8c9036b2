//! Push notification payloads.

use serde::Deserialize;
use std::str::FromStr;
use tracing::debug;
use url::Url;

const DEFAULT_TITLE: &str = "New notification";
const DEFAULT_BODY: &str = "You have a new update";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PushPayload {
  #[serde(default)]
  pub title: Option<String>,
  #[serde(default)]
  pub body: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
  OpenApp,
  Dismiss,
}

impl NotificationAction {
  pub fn label(self) -> &'static str {
    match self {
      NotificationAction::OpenApp => "Open app",
      NotificationAction::Dismiss => "Dismiss",
    }
  }
}

impl FromStr for NotificationAction {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "open" | "open-app" => Ok(Self::OpenApp),
      "dismiss" => Ok(Self::Dismiss),
      other => Err(format!("unknown notification action '{}'", other)),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub actions: [NotificationAction; 2],
}

impl PushPayload {
  /// Parse raw push data. Anything that is not a JSON object is treated as
  /// plain body text.
  pub fn parse(data: &[u8]) -> Self {
    match serde_json::from_slice::<PushPayload>(data) {
      Ok(payload) => payload,
      Err(e) => {
        debug!(error = %e, "Push data is not JSON, using it as body text");
        let text = String::from_utf8_lossy(data).trim().to_string();
        PushPayload {
          title: None,
          body: (!text.is_empty()).then_some(text),
        }
      }
    }
  }

  pub fn into_notification(self) -> Notification {
    Notification {
      title: self
        .title
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
      body: self
        .body
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| DEFAULT_BODY.to_string()),
      actions: [NotificationAction::OpenApp, NotificationAction::Dismiss],
    }
  }
}

/// Where to navigate when the user picks `action`, if anywhere.
pub fn resolve_action(action: NotificationAction, root: &Url) -> Option<Url> {
  match action {
    NotificationAction::OpenApp => Some(root.clone()),
    NotificationAction::Dismiss => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_json_payload() {
    let notification =
      PushPayload::parse(br#"{"title":"Vote closed","body":"Results are in"}"#).into_notification();
    assert_eq!(notification.title, "Vote closed");
    assert_eq!(notification.body, "Results are in");
    assert_eq!(
      notification.actions,
      [NotificationAction::OpenApp, NotificationAction::Dismiss]
    );
  }

  #[test]
  fn test_missing_fields_use_defaults() {
    let notification = PushPayload::parse(b"{}").into_notification();
    assert_eq!(notification.title, DEFAULT_TITLE);
    assert_eq!(notification.body, DEFAULT_BODY);

    let plain = PushPayload::parse(b"  hello  ").into_notification();
    assert_eq!(plain.body, "hello");
  }

  #[test]
  fn test_actions() {
    let root = Url::parse("https://app.test/").unwrap();
    assert_eq!(resolve_action(NotificationAction::OpenApp, &root), Some(root.clone()));
    assert_eq!(resolve_action(NotificationAction::Dismiss, &root), None);
    assert_eq!(NotificationAction::Dismiss.label(), "Dismiss");
    assert_eq!("open".parse(), Ok(NotificationAction::OpenApp));
    assert!("snooze".parse::<NotificationAction>().is_err());
  }
}
