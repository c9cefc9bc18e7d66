use crate::account::AccountId;
use crate::amount::Value;
use rust_decimal::Decimal;

/// Terminal outcome of a failed send, as reported to the caller.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("plugin data with id {plugin_id} is not supported on this chain")]
    UnsupportedPluginData { plugin_id: u8 },
    #[error("fee rate {0} is not valid")]
    FeeRateInvalid(i64),
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Value, available: Value },
    #[error("amount {amount} is below the dust threshold of {dust}")]
    AmountBelowDust { amount: Decimal, dust: Value },
    #[error("a send is already in flight for account {0}")]
    SendInFlight(AccountId),
    #[error("signing failed: {0}")]
    SigningFailed(String),
    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),
    #[error("send was cancelled before broadcast")]
    Cancelled,
    #[error("ledger error: {0}")]
    Ledger(String),
}

/// Flat discriminant of [`SendError`] for callers that only branch on the
/// error class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SendErrorKind {
    InvalidAddress,
    UnsupportedPluginData,
    FeeRateInvalid,
    InsufficientFunds,
    AmountBelowDust,
    SendInFlight,
    SigningFailed,
    BroadcastFailed,
    Cancelled,
    Ledger,
}

impl SendError {
    pub fn invalid_address(address: &str, reason: impl Into<String>) -> Self {
        SendError::InvalidAddress {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> SendErrorKind {
        match self {
            SendError::InvalidAddress { .. } => SendErrorKind::InvalidAddress,
            SendError::UnsupportedPluginData { .. } => SendErrorKind::UnsupportedPluginData,
            SendError::FeeRateInvalid(_) => SendErrorKind::FeeRateInvalid,
            SendError::InsufficientFunds { .. } => SendErrorKind::InsufficientFunds,
            SendError::AmountBelowDust { .. } => SendErrorKind::AmountBelowDust,
            SendError::SendInFlight(_) => SendErrorKind::SendInFlight,
            SendError::SigningFailed(_) => SendErrorKind::SigningFailed,
            SendError::BroadcastFailed(_) => SendErrorKind::BroadcastFailed,
            SendError::Cancelled => SendErrorKind::Cancelled,
            SendError::Ledger(_) => SendErrorKind::Ledger,
        }
    }

    /// Errors detected synchronously before any input is reserved.
    pub fn is_validation(&self) -> bool {
        matches!(
            self.kind(),
            SendErrorKind::InvalidAddress
                | SendErrorKind::UnsupportedPluginData
                | SendErrorKind::AmountBelowDust
                | SendErrorKind::FeeRateInvalid
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("account type is not supported by this adapter")]
    UnsupportedAccount,
    #[error("wrong adapter parameters: {0}")]
    WrongParameters(String),
}
