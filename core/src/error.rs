use storefront_proto::ItemId;
use thiserror::Error;

/// Failure reported by (or while reaching) one of the storefront REST services
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The service answered and refused the request
    #[error("rejected with status {status}: {reason}")]
    Rejected { status: u16, reason: String },

    /// The service could not be reached or did not answer in time
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The service answered with a body we could not decode
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ServiceError {
    /// Whether retrying the same request later might succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Unavailable(_) => true,
            ServiceError::Rejected { status, .. } => *status == 429 || *status >= 500,
            ServiceError::InvalidResponse(_) => false,
        }
    }
}

/// Error type for cart operations.
///
/// Returned from: `CartStore::add`, `update_quantity`, `remove`, `refresh`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// The item is not in the cart, so there is nothing to change
    #[error("item {0} is not in the cart")]
    NotInCart(ItemId),

    /// The cart service refused the change; local state was rolled back
    #[error("cart change for item {item} was rolled back: {source}")]
    RolledBack { item: ItemId, source: ServiceError },

    /// The cart snapshot could not be fetched
    #[error("cart refresh failed: {0}")]
    Refresh(ServiceError),

    /// Mutations are still awaiting confirmation
    #[error("{0} cart change(s) still awaiting confirmation")]
    Busy(usize),

    /// A local change was submitted while the cart snapshot was in flight; the snapshot was discarded
    #[error("cart snapshot was superseded by a local change")]
    Superseded,

    /// A checkout owns the cart; the change was not applied
    #[error("cart change for item {0} refused while checkout is in progress")]
    CheckoutInProgress(ItemId),

    /// The confirmation task ended without resolving (runtime shutting down)
    #[error("cart change for item {0} was interrupted")]
    Interrupted(ItemId),
}

/// Error type for `Checkout::run`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    #[error("the cart is empty")]
    EmptyCart,

    #[error("{0} cart change(s) still awaiting confirmation")]
    CartBusy(usize),

    #[error("another checkout is already running")]
    InProgress,

    /// Payment was refused; the cart is untouched
    #[error("payment failed: {0}")]
    Payment(ServiceError),

    /// Payment went through but the order service did not create the order
    #[error("order creation failed: {0}")]
    OrderCreation(ServiceError),
}
