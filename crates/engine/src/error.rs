use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("unknown cart: {cart_id}")]
    UnknownCart { cart_id: String },

    #[error("unknown position: {cart_id} side {side} slot {slot}")]
    UnknownPosition {
        cart_id: String,
        side: usize,
        slot: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("duplicate cart id: {cart_id}")]
    DuplicateCart { cart_id: String },

    #[error("empty cart id at index {index}")]
    EmptyCartId { index: usize },

    #[error("slot level must be >= 1: {cart_id} side {side} slot {slot}")]
    ZeroLevel {
        cart_id: String,
        side: usize,
        slot: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    NoOp(#[from] HistoryError),

    #[error("no actor identity for this session")]
    AuthUnavailable,

    #[error("layout not established yet")]
    NotReady,

    #[error("unknown tag: {tag_id}")]
    UnknownTag { tag_id: String },

    #[error("store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("session closed")]
    Closed,
}

impl SessionError {
    pub fn store(err: &anyhow::Error) -> Self {
        Self::StoreUnavailable {
            message: format!("{err:#}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_error_surfaces_as_no_op() {
        let err: SessionError = HistoryError::NothingToRedo.into();
        assert!(matches!(err, SessionError::NoOp(_)));
        assert_eq!(err.to_string(), "nothing to redo");
    }

    #[test]
    fn store_error_keeps_context_chain() {
        let err = anyhow::anyhow!("disk full").context("write layout");
        assert_eq!(
            SessionError::store(&err).to_string(),
            "store unavailable: write layout: disk full"
        );
    }
}
