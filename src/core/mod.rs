//! Core wallet types
//!
//! - Addresses, operation ids and amounts
//! - Operations owners can submit, and how they are identified

pub mod operation;
pub mod types;

pub use operation::{Operation, OperationKind, Transfer};
pub use types::{
    format_amount, parse_amount, Address, AddressError, Amount, AmountParseError, OperationId,
    OperationIdError, WEI_PER_ETH, WEI_PER_GWEI,
};
