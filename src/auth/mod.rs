//! ecobee authorization
//!
//! - [`token`]: the immutable token snapshot and the raw grant it is built from
//! - [`client`]: HTTP calls to the `/authorize` and `/token` endpoints
//! - [`flow`]: the PIN authorization state machine
//! - [`manager`]: token ownership, persistence and refresh-before-use

pub mod client;
pub mod flow;
pub mod manager;
pub mod token;

pub use manager::{TokenManager, TokenManagerBuilder};
pub use token::Token;
