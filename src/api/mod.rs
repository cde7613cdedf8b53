//! REST API module
//!
//! Provides HTTP REST API for programmatic access to the wallet.
//!
//! # Endpoints
//!
//! ## Wallet
//! - `GET /api/wallet` - Owners, requirement, allowance and balance
//! - `GET /api/wallet/owners/:address` - Ownership check
//! - `POST /api/wallet/deposit` - Credit value
//!
//! ## Operations
//! - `GET /api/operations` - Pending operations with tallies
//! - `POST /api/operations` - Submit an operation
//! - `GET /api/operations/:id` - Get a pending operation
//! - `POST /api/operations/:id/confirm` - Confirm
//! - `POST /api/operations/:id/revoke` - Revoke a confirmation
//! - `GET /api/operations/:id/confirmations/:owner` - Confirmation check
//!
//! ## Events
//! - `GET /api/events?since=N` - Event journal
//!
//! ## WebSocket
//! - `GET /ws` - Real-time wallet events
//!
//! Rejections are returned as `{ "error": ... }` with 403 for non-owners,
//! 404 for unknown operations, 409 for re-entrant calls and 400 otherwise.
//! A mutation that could not be saved answers 500.

pub mod handlers;
pub mod routes;
pub mod websocket;

pub use handlers::ApiState;
pub use routes::create_router;
pub use websocket::{WsBroadcaster, WsEvent};
