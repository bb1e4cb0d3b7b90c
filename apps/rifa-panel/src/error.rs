use rifa_db::StoreError;
use rifa_db::models::commission::{CommissionStatus, InvalidLevel};
use rifa_db::models::order::OrderStatus;
use thiserror::Error;

/// Failures of the ledger operations. Messages are shown to end users and never carry
/// record ids or redemption codes.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Referral code is not valid")]
    InvalidReferralCode,

    #[error("Raffle not found")]
    RaffleNotFound,

    #[error("Raffle has no tickets left for this purchase")]
    RaffleSoldOut,

    #[error("User not found")]
    UserNotFound,

    #[error("Order not found")]
    OrderNotFound,

    #[error("Order cannot move from {from} to {to}")]
    InvalidStateTransition { from: OrderStatus, to: OrderStatus },

    #[error("A rejection reason is required")]
    MissingRejectionReason,

    #[error("Order does not belong to this user")]
    NotOrderOwner,

    #[error("Ticket not found")]
    TicketNotFound,

    #[error("Ticket does not belong to this user")]
    NotTicketOwner,

    #[error("Ticket has reached its transfer limit")]
    TransferLimitReached,

    #[error("Commission not found")]
    CommissionNotFound,

    #[error("Commission cannot move from {from} to {to}")]
    InvalidCommissionTransition {
        from: CommissionStatus,
        to: CommissionStatus,
    },

    #[error("Commission level must be between 1 and 3")]
    InvalidCommissionLevel,

    #[error("Quantity must be between 1 and {max}", max = crate::services::ticket_service::MAX_TICKETS_PER_PURCHASE)]
    InvalidQuantity,

    #[error("Ticket pack is not offered for this raffle")]
    InvalidPack,

    #[error("Prize could not be redeemed")]
    RedemptionMismatch,

    #[error("No roulette chances left")]
    InsufficientChances,

    #[error("No prizes left to win")]
    NoPrizesAvailable,

    #[error("Too many concurrent updates, please try again")]
    Contention,

    #[error("Storage operation failed")]
    Store(#[from] StoreError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

impl From<InvalidLevel> for LedgerError {
    fn from(_: InvalidLevel) -> Self {
        LedgerError::InvalidCommissionLevel
    }
}
