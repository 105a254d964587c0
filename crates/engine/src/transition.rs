//! Pure layout transitions. Nothing here mutates its input; every edit returns
//! a new [`Layout`] that shares untouched carts with the old one.

use crate::error::TransitionError;
use crate::ActorId;
use cultigrid_protocol::{Cart, Layout, Movement, Slot, Tag};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditCommand {
    Place {
        cart_id: String,
        side: usize,
        slot: usize,
        tag: Arc<Tag>,
    },
    RemoveLast {
        cart_id: String,
        side: usize,
        slot: usize,
    },
    ClearCart {
        cart_id: String,
    },
}

impl EditCommand {
    pub fn cart_id(&self) -> &str {
        match self {
            Self::Place { cart_id, .. }
            | Self::RemoveLast { cart_id, .. }
            | Self::ClearCart { cart_id } => cart_id,
        }
    }
}

/// Apply `command`, logging and ignoring commands that target nothing.
pub fn apply(layout: &Layout, command: &EditCommand, actor: &ActorId, now_ms: i64) -> Layout {
    match try_apply(layout, command, actor, now_ms) {
        Ok(Some(next)) => next,
        Ok(None) => layout.clone(),
        Err(err) => {
            tracing::warn!(actor = actor.as_str(), error = %err, "edit ignored");
            layout.clone()
        }
    }
}

/// Like [`apply`], but tells the caller what happened.
///
/// `Ok(None)` means the target exists but the edit changed nothing (popping an
/// empty slot, clearing an empty cart).
pub fn try_apply(
    layout: &Layout,
    command: &EditCommand,
    actor: &ActorId,
    now_ms: i64,
) -> Result<Option<Layout>, TransitionError> {
    let cart_id = command.cart_id();
    let idx = layout
        .carts
        .iter()
        .position(|c| c.id == cart_id)
        .ok_or_else(|| TransitionError::UnknownCart {
            cart_id: cart_id.to_string(),
        })?;

    let mut next = layout.clone();
    let cart = Arc::make_mut(&mut next.carts[idx]);

    match command {
        EditCommand::Place {
            side, slot, tag, ..
        } => {
            let target = slot_mut(cart, *side, *slot)?;
            target.occupants.push(tag.clone());
            next.movement_log.insert(
                tag.id.clone(),
                Movement {
                    by: actor.as_str().to_string(),
                    at: now_ms,
                },
            );
        }
        EditCommand::RemoveLast { side, slot, .. } => {
            let target = slot_mut(cart, *side, *slot)?;
            let Some(removed) = target.occupants.pop() else {
                return Ok(None);
            };
            // Dropped even if the id still sits in another slot.
            next.movement_log.remove(&removed.id);
        }
        EditCommand::ClearCart { .. } => {
            let removed: Vec<Arc<Tag>> = cart
                .sides
                .iter_mut()
                .flat_map(|s| s.slots.iter_mut())
                .flat_map(|s| std::mem::take(&mut s.occupants))
                .collect();
            if removed.is_empty() {
                return Ok(None);
            }
            for tag in removed {
                next.movement_log.remove(&tag.id);
            }
        }
    }

    Ok(Some(next))
}

fn slot_mut(cart: &mut Cart, side: usize, slot: usize) -> Result<&mut Slot, TransitionError> {
    let cart_id = cart.id.clone();
    cart.sides
        .get_mut(side)
        .and_then(|s| s.slots.get_mut(slot))
        .ok_or(TransitionError::UnknownPosition {
            cart_id,
            side,
            slot,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{default_grid, empty_cart, placements};
    use crate::registry;

    fn actor() -> ActorId {
        ActorId::new("u1").unwrap()
    }

    fn place(cart: &str, side: usize, slot: usize, tag: &str) -> EditCommand {
        EditCommand::Place {
            cart_id: cart.to_string(),
            side,
            slot,
            tag: registry::lookup(tag).unwrap(),
        }
    }

    fn remove_last(cart: &str, side: usize, slot: usize) -> EditCommand {
        EditCommand::RemoveLast {
            cart_id: cart.to_string(),
            side,
            slot,
        }
    }

    #[test]
    fn place_appends_and_stamps_movement() {
        let before = default_grid();
        let after = apply(&before, &place("cart-2", 1, 3, "aeriz"), &actor(), 100);
        let after = apply(&after, &place("cart-2", 1, 3, "doja"), &actor(), 200);

        let slot = &after.carts[1].sides[1].slots[3];
        let ids: Vec<&str> = slot.occupants.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["aeriz", "doja"]);
        assert_eq!(after.movement_log["aeriz"].by, "u1");
        assert_eq!(after.movement_log["doja"].at, 200);

        // Input untouched, other carts shared.
        assert!(before.carts[1].sides[1].slots[3].occupants.is_empty());
        assert!(Arc::ptr_eq(&before.carts[0], &after.carts[0]));
        assert!(!Arc::ptr_eq(&before.carts[1], &after.carts[1]));
    }

    #[test]
    fn place_allows_duplicates_in_one_slot() {
        let layout = default_grid();
        let layout = apply(&layout, &place("cart-1", 0, 0, "maven"), &actor(), 1);
        let layout = apply(&layout, &place("cart-1", 0, 0, "maven"), &actor(), 2);
        assert_eq!(layout.carts[0].sides[0].slots[0].occupants.len(), 2);
        assert_eq!(layout.movement_log["maven"].at, 2);
    }

    #[test]
    fn remove_last_undoes_place_on_occupancy() {
        let before = default_grid();
        let placed = apply(&before, &place("cart-1", 0, 0, "lowell"), &actor(), 5);
        let removed = apply(&placed, &remove_last("cart-1", 0, 0), &actor(), 6);
        assert_eq!(
            removed.carts[0].sides[0].slots[0],
            before.carts[0].sides[0].slots[0]
        );
        assert!(!removed.movement_log.contains_key("lowell"));
        assert_eq!(removed, before);
    }

    #[test]
    fn remove_last_pops_most_recent_and_drops_log_even_if_placed_elsewhere() {
        let layout = default_grid();
        let layout = apply(&layout, &place("cart-1", 0, 0, "cookies"), &actor(), 1);
        let layout = apply(&layout, &place("cart-3", 1, 2, "cookies"), &actor(), 2);
        let layout = apply(&layout, &place("cart-3", 1, 2, "doja"), &actor(), 3);

        let layout = apply(&layout, &remove_last("cart-3", 1, 2), &actor(), 4);
        assert!(!layout.movement_log.contains_key("doja"));

        let layout = apply(&layout, &remove_last("cart-3", 1, 2), &actor(), 5);
        assert_eq!(placements(&layout, "cookies").len(), 1);
        assert!(!layout.movement_log.contains_key("cookies"));
    }

    #[test]
    fn remove_last_on_empty_slot_is_unchanged() {
        let layout = default_grid();
        assert_eq!(
            try_apply(&layout, &remove_last("cart-1", 1, 1), &actor(), 1),
            Ok(None)
        );
        assert_eq!(apply(&layout, &remove_last("cart-1", 1, 1), &actor(), 1), layout);
    }

    #[test]
    fn clear_cart_empties_both_sides_and_forgets_its_tags() {
        let layout = default_grid();
        let layout = apply(&layout, &place("cart-2", 0, 0, "aeriz"), &actor(), 1);
        let layout = apply(&layout, &place("cart-2", 1, 3, "doja"), &actor(), 2);
        let layout = apply(&layout, &place("cart-4", 0, 1, "maven"), &actor(), 3);
        let layout = apply(&layout, &place("cart-4", 0, 1, "aeriz"), &actor(), 4);

        let cleared = apply(
            &layout,
            &EditCommand::ClearCart {
                cart_id: "cart-2".to_string(),
            },
            &actor(),
            5,
        );
        for side in &cleared.carts[1].sides {
            assert!(side.slots.iter().all(|s| s.occupants.is_empty()));
            assert_eq!(side.slots.len(), 4);
        }
        assert!(!cleared.movement_log.contains_key("aeriz"));
        assert!(!cleared.movement_log.contains_key("doja"));
        assert!(cleared.movement_log.contains_key("maven"));
        // cart-4 still holds aeriz; its log entry is gone regardless.
        assert_eq!(placements(&cleared, "aeriz").len(), 1);
    }

    #[test]
    fn clear_empty_cart_is_unchanged() {
        let layout = default_grid();
        let cmd = EditCommand::ClearCart {
            cart_id: "cart-1".to_string(),
        };
        assert_eq!(try_apply(&layout, &cmd, &actor(), 1), Ok(None));
    }

    #[test]
    fn unknown_targets_leave_layout_equal() {
        let layout = default_grid();
        let cmd = place("nonexistent-cart", 0, 0, "aeriz");
        assert_eq!(apply(&layout, &cmd, &actor(), 1), layout);
        assert_eq!(
            try_apply(&layout, &cmd, &actor(), 1),
            Err(TransitionError::UnknownCart {
                cart_id: "nonexistent-cart".to_string()
            })
        );

        let bad_side = place("cart-1", 2, 0, "aeriz");
        assert!(matches!(
            try_apply(&layout, &bad_side, &actor(), 1),
            Err(TransitionError::UnknownPosition { side: 2, .. })
        ));
        let bad_slot = remove_last("cart-1", 0, 9);
        assert_eq!(apply(&layout, &bad_slot, &actor(), 1), layout);
    }

    #[test]
    fn single_cart_scenario() {
        let mut cart = empty_cart("cart1", "Cart", 1);
        cart.sides[1].slots.clear();
        let layout = Layout {
            carts: vec![Arc::new(cart)],
            movement_log: Default::default(),
        };
        let tag = Arc::new(Tag {
            id: "x".to_string(),
            name: "AERIZ".to_string(),
            color_key: "emerald".to_string(),
        });
        let cmd = EditCommand::Place {
            cart_id: "cart1".to_string(),
            side: 0,
            slot: 0,
            tag: tag.clone(),
        };
        let next = apply(&layout, &cmd, &actor(), 42);
        assert_eq!(next.carts[0].sides[0].slots[0].occupants, vec![tag]);
        assert_eq!(
            next.movement_log["x"],
            Movement {
                by: "u1".to_string(),
                at: 42
            }
        );
    }
}
