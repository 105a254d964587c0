use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A taggable cultivator. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub color_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub level: u32,
    /// Insertion order, most recently placed last.
    #[serde(default)]
    pub occupants: Vec<Arc<Tag>>,
}

impl Slot {
    pub fn empty(level: u32) -> Self {
        Self {
            level,
            occupants: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Side {
    pub name: String,
    pub slots: Vec<Slot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: String,
    pub name: String,
    pub sides: [Side; 2],
}

/// Who last placed a tag, and when (epoch milliseconds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub by: String,
    pub at: i64,
}

/// The full placement grid plus movement metadata.
///
/// Carts are behind `Arc` so a transition only reallocates the cart it touches;
/// every other cart is shared with the previous snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub carts: Vec<Arc<Cart>>,
    #[serde(default)]
    pub movement_log: BTreeMap<String, Movement>,
}

/// The single document kept in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDocument {
    pub carts: Vec<Arc<Cart>>,
    #[serde(default)]
    pub movement_log: BTreeMap<String, Movement>,
    pub updated_at: String,
    pub updated_by: String,
}

impl LayoutDocument {
    pub fn new(
        layout: &Layout,
        updated_by: impl Into<String>,
        updated_at: impl Into<String>,
    ) -> Self {
        Self {
            carts: layout.carts.clone(),
            movement_log: layout.movement_log.clone(),
            updated_at: updated_at.into(),
            updated_by: updated_by.into(),
        }
    }

    pub fn layout(&self) -> Layout {
        Layout {
            carts: self.carts.clone(),
            movement_log: self.movement_log.clone(),
        }
    }
}

/// A document as read back from a store, stamped with the store's revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub rev: i64,
    pub document: LayoutDocument,
}

/// Commands accepted from the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum CommandRequest {
    #[serde(rename_all = "camelCase")]
    Place {
        cart_id: String,
        side: usize,
        slot: usize,
        tag_id: String,
    },
    #[serde(rename_all = "camelCase")]
    RemoveLast {
        cart_id: String,
        side: usize,
        slot: usize,
    },
    #[serde(rename_all = "camelCase")]
    ClearCart { cart_id: String },
    Undo,
    Redo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Idle,
    Saving,
    Saved,
    Failed,
}

impl Default for PublishStatus {
    fn default() -> Self {
        Self::Idle
    }
}

/// What the UI layer sees after every command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    pub initialized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Layout>,
    pub cursor: usize,
    pub history_len: usize,
    pub can_undo: bool,
    pub can_redo: bool,
    pub status: PublishStatus,
}

pub mod routes {
    pub const HEALTH: &str = "/health";
    pub const TAGS: &str = "/api/tags";
    pub const SESSION: &str = "/api/session";
    pub const SESSION_ACTOR: &str = "/api/session/actor";
    pub const COMMANDS: &str = "/api/commands";
    pub const PUBLISH: &str = "/api/publish";
    pub const RESYNC: &str = "/api/resync";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_uses_store_field_names() {
        let layout = Layout {
            carts: vec![Arc::new(Cart {
                id: "cart-1".to_string(),
                name: "Cart 1".to_string(),
                sides: [
                    Side {
                        name: "A".to_string(),
                        slots: vec![Slot::empty(1)],
                    },
                    Side {
                        name: "B".to_string(),
                        slots: vec![Slot::empty(1)],
                    },
                ],
            })],
            movement_log: BTreeMap::from([(
                "x".to_string(),
                Movement {
                    by: "u1".to_string(),
                    at: 7,
                },
            )]),
        };
        let doc = LayoutDocument::new(&layout, "u1", "2026-01-01T00:00:00Z");
        let v = serde_json::to_value(&doc).unwrap();
        assert_eq!(v["updatedBy"], "u1");
        assert_eq!(v["updatedAt"], "2026-01-01T00:00:00Z");
        assert_eq!(v["movementLog"]["x"]["at"], 7);
        assert_eq!(v["carts"][0]["sides"][1]["name"], "B");
        assert_eq!(doc.layout(), layout);
    }

    #[test]
    fn command_request_is_tagged_by_op() {
        let cmd: CommandRequest = serde_json::from_str(
            r#"{"op":"place","cartId":"cart-1","side":0,"slot":2,"tagId":"aeriz"}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            CommandRequest::Place {
                cart_id: "cart-1".to_string(),
                side: 0,
                slot: 2,
                tag_id: "aeriz".to_string(),
            }
        );
        let undo: CommandRequest = serde_json::from_str(r#"{"op":"undo"}"#).unwrap();
        assert_eq!(undo, CommandRequest::Undo);
    }

    #[test]
    fn publish_status_is_lowercase() {
        assert_eq!(
            serde_json::to_string(&PublishStatus::Saving).unwrap(),
            "\"saving\""
        );
        assert_eq!(PublishStatus::default(), PublishStatus::Idle);
    }
}
