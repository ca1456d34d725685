//! Push payload parsing and notification routing.
//!
//! Inbound push messages are validated at the boundary into a known event
//! kind (with an explicit unknown fallback) and mapped to a single in-app
//! navigation target. Routing never errors: anything unrecognized falls
//! through to the root view.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

const DEFAULT_TITLE: &str = "Kasir POS";
const DEFAULT_BODY: &str = "Anda memiliki notifikasi baru";
const DEFAULT_TAG: &str = "kasir-pos-notification";

/// Raw push payload as delivered. Every field is optional; validation
/// happens when the kind is resolved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushMessage {
  #[serde(rename = "type", default)]
  pub kind: Option<String>,
  #[serde(default)]
  pub title: Option<String>,
  #[serde(default)]
  pub body: Option<String>,
  #[serde(default)]
  pub resource_type: Option<String>,
  #[serde(default)]
  pub resource_id: Option<u64>,
  #[serde(default)]
  pub meta: PushMeta,
  #[serde(default)]
  pub tag: Option<String>,
  #[serde(default)]
  pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushMeta {
  #[serde(default)]
  pub role: Option<String>,
}

/// Recognized event kinds, with an explicit fallback for everything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushKind {
  OrderCreated,
  OrderPaid,
  OrderStatusChanged,
  SubscriptionExpiring,
  SubscriptionExpired,
  Unknown,
}

impl PushKind {
  pub fn is_order_event(&self) -> bool {
    matches!(
      self,
      PushKind::OrderCreated | PushKind::OrderPaid | PushKind::OrderStatusChanged
    )
  }

  pub fn is_subscription_event(&self) -> bool {
    matches!(
      self,
      PushKind::SubscriptionExpiring | PushKind::SubscriptionExpired
    )
  }
}

impl PushMessage {
  /// Parse a raw push body. Malformed JSON is a boundary error the caller
  /// may degrade from (e.g. display the raw text instead).
  pub fn parse(raw: &str) -> Result<Self> {
    serde_json::from_str(raw).map_err(|e| EngineError::Payload(e.to_string()))
  }

  pub fn kind(&self) -> PushKind {
    match self.kind.as_deref() {
      Some("order.created") => PushKind::OrderCreated,
      Some("order.paid") => PushKind::OrderPaid,
      Some("order.status_changed") => PushKind::OrderStatusChanged,
      Some("subscription.expiring") => PushKind::SubscriptionExpiring,
      Some("subscription.expired") => PushKind::SubscriptionExpired,
      _ => PushKind::Unknown,
    }
  }

  pub fn title(&self) -> &str {
    self.title.as_deref().unwrap_or(DEFAULT_TITLE)
  }

  pub fn body(&self) -> &str {
    self.body.as_deref().unwrap_or(DEFAULT_BODY)
  }

  pub fn tag(&self) -> &str {
    self.tag.as_deref().unwrap_or(DEFAULT_TAG)
  }

  fn role_matches(&self, role: &str) -> bool {
    self.meta.role.as_deref() == Some(role)
      || self.tag.as_deref().is_some_and(|t| t.contains(role))
  }
}

/// In-app navigation target resolved from a push payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavTarget {
  KitchenView,
  WaiterView,
  PointOfSaleView,
  OrdersList,
  SubscriptionSettings,
  Custom(String),
  Root,
}

impl NavTarget {
  pub fn path(&self) -> &str {
    match self {
      NavTarget::KitchenView => "/kitchen",
      NavTarget::WaiterView => "/waiter",
      NavTarget::PointOfSaleView => "/pos",
      NavTarget::OrdersList => "/orders",
      NavTarget::SubscriptionSettings => "/subscription-settings",
      NavTarget::Custom(url) => url,
      NavTarget::Root => "/",
    }
  }
}

/// Resolve the navigation target for a payload.
///
/// Typed kinds take precedence; the explicit `url` field only applies when
/// no kind is recognized. Order events branch on the role (from `meta.role`
/// or a tag substring), defaulting to the generic orders list. Missing or
/// unrecognized fields at any level fall through to the root view.
pub fn route(msg: &PushMessage) -> NavTarget {
  let kind = msg.kind();

  if kind.is_order_event() {
    if msg.resource_type.as_deref() != Some("order") || msg.resource_id.is_none() {
      return NavTarget::Root;
    }

    if msg.role_matches("kitchen") {
      return NavTarget::KitchenView;
    }
    if msg.role_matches("waiter") {
      return NavTarget::WaiterView;
    }
    if msg.role_matches("kasir") {
      return NavTarget::PointOfSaleView;
    }
    return NavTarget::OrdersList;
  }

  if kind.is_subscription_event() {
    return NavTarget::SubscriptionSettings;
  }

  match &msg.url {
    Some(url) => NavTarget::Custom(url.clone()),
    None => NavTarget::Root,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn order_msg(role: Option<&str>) -> PushMessage {
    PushMessage {
      kind: Some("order.created".to_string()),
      resource_type: Some("order".to_string()),
      resource_id: Some(42),
      meta: PushMeta {
        role: role.map(String::from),
      },
      ..Default::default()
    }
  }

  #[test]
  fn test_kitchen_role_routes_to_kitchen_view() {
    assert_eq!(route(&order_msg(Some("kitchen"))), NavTarget::KitchenView);
  }

  #[test]
  fn test_role_from_tag_substring() {
    let mut msg = order_msg(None);
    msg.tag = Some("outlet-3-waiter".to_string());
    assert_eq!(route(&msg), NavTarget::WaiterView);
  }

  #[test]
  fn test_kasir_role_routes_to_pos() {
    assert_eq!(route(&order_msg(Some("kasir"))), NavTarget::PointOfSaleView);
  }

  #[test]
  fn test_unrecognized_role_defaults_to_orders_list() {
    assert_eq!(route(&order_msg(Some("owner"))), NavTarget::OrdersList);
    assert_eq!(route(&order_msg(None)), NavTarget::OrdersList);
  }

  #[test]
  fn test_order_event_without_resource_falls_to_root() {
    let msg = PushMessage {
      kind: Some("order.paid".to_string()),
      ..Default::default()
    };
    assert_eq!(route(&msg), NavTarget::Root);
  }

  #[test]
  fn test_subscription_events_route_to_settings() {
    let msg = PushMessage {
      kind: Some("subscription.expiring".to_string()),
      ..Default::default()
    };
    assert_eq!(route(&msg), NavTarget::SubscriptionSettings);
  }

  #[test]
  fn test_url_applies_only_when_kind_is_unrecognized() {
    let mut msg = order_msg(Some("kitchen"));
    msg.url = Some("/promo".to_string());
    assert_eq!(route(&msg), NavTarget::KitchenView);

    let msg = PushMessage {
      kind: Some("campaign.launched".to_string()),
      url: Some("/promo".to_string()),
      ..Default::default()
    };
    assert_eq!(route(&msg), NavTarget::Custom("/promo".to_string()));
  }

  #[test]
  fn test_unknown_kind_without_url_falls_to_root() {
    let msg = PushMessage {
      kind: Some("something.else".to_string()),
      ..Default::default()
    };
    assert_eq!(route(&msg), NavTarget::Root);
    assert_eq!(route(&PushMessage::default()), NavTarget::Root);
  }

  #[test]
  fn test_parse_applies_notification_defaults() {
    let msg = PushMessage::parse(r#"{"type":"order.created"}"#).unwrap();
    assert_eq!(msg.title(), "Kasir POS");
    assert_eq!(msg.body(), "Anda memiliki notifikasi baru");
    assert_eq!(msg.tag(), "kasir-pos-notification");

    assert!(PushMessage::parse("not json").is_err());
  }
}
