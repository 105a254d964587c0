//! Layout grid construction, validation and read-only queries.

use crate::error::LayoutError;
use cultigrid_protocol::{Cart, Layout, Movement, Side, Slot};
use std::collections::HashSet;
use std::sync::Arc;

pub const DEFAULT_CARTS: usize = 4;
pub const DEFAULT_SLOTS_PER_SIDE: u32 = 4;
pub const SIDE_NAMES: [&str; 2] = ["A", "B"];

/// Where a tag sits: cart id, side index, slot index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub cart_id: String,
    pub side: usize,
    pub slot: usize,
}

/// The layout used when the store holds no document yet.
pub fn default_grid() -> Layout {
    let carts = (1..=DEFAULT_CARTS)
        .map(|n| {
            Arc::new(empty_cart(
                &format!("cart-{n}"),
                &format!("Cart {n}"),
                DEFAULT_SLOTS_PER_SIDE,
            ))
        })
        .collect();
    Layout {
        carts,
        movement_log: Default::default(),
    }
}

/// A cart with two sides of `slots` empty slots, levels counting from 1.
pub fn empty_cart(id: &str, name: &str, slots: u32) -> Cart {
    let side = |name: &str| Side {
        name: name.to_string(),
        slots: (1..=slots).map(Slot::empty).collect(),
    };
    Cart {
        id: id.to_string(),
        name: name.to_string(),
        sides: [side(SIDE_NAMES[0]), side(SIDE_NAMES[1])],
    }
}

pub fn validate(layout: &Layout) -> Result<(), LayoutError> {
    let mut seen = HashSet::new();
    for (index, cart) in layout.carts.iter().enumerate() {
        if cart.id.is_empty() {
            return Err(LayoutError::EmptyCartId { index });
        }
        if !seen.insert(cart.id.as_str()) {
            return Err(LayoutError::DuplicateCart {
                cart_id: cart.id.clone(),
            });
        }
        for (side_idx, side) in cart.sides.iter().enumerate() {
            if let Some(slot_idx) = side.slots.iter().position(|s| s.level == 0) {
                return Err(LayoutError::ZeroLevel {
                    cart_id: cart.id.clone(),
                    side: side_idx,
                    slot: slot_idx,
                });
            }
        }
    }
    Ok(())
}

pub fn cart<'a>(layout: &'a Layout, cart_id: &str) -> Option<&'a Arc<Cart>> {
    layout.carts.iter().find(|c| c.id == cart_id)
}

pub fn slot<'a>(layout: &'a Layout, cart_id: &str, side: usize, slot: usize) -> Option<&'a Slot> {
    cart(layout, cart_id)?.sides.get(side)?.slots.get(slot)
}

/// Every position `tag_id` occupies, in grid order. A tag placed twice in one
/// slot is reported once per occurrence.
pub fn placements(layout: &Layout, tag_id: &str) -> Vec<Position> {
    let mut out = Vec::new();
    for cart in &layout.carts {
        for (side_idx, side) in cart.sides.iter().enumerate() {
            for (slot_idx, slot) in side.slots.iter().enumerate() {
                let hits = slot.occupants.iter().filter(|t| t.id == tag_id).count();
                out.extend((0..hits).map(|_| Position {
                    cart_id: cart.id.clone(),
                    side: side_idx,
                    slot: slot_idx,
                }));
            }
        }
    }
    out
}

pub fn movement<'a>(layout: &'a Layout, tag_id: &str) -> Option<&'a Movement> {
    layout.movement_log.get(tag_id)
}

/// Total number of occupants across the grid.
pub fn occupied_count(layout: &Layout) -> usize {
    layout
        .carts
        .iter()
        .flat_map(|c| c.sides.iter())
        .flat_map(|s| s.slots.iter())
        .map(|s| s.occupants.len())
        .sum()
}
