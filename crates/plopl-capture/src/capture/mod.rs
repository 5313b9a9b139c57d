//! Capture signals and their correlation into exchanges.
//!
//! A capture source reports three kinds of signals per observed API call:
//! the request start, the request body and the response. They can arrive in
//! any order. [`CorrelatorSession`] stitches them into [`CapturedExchange`]s
//! for the active schema and hands each ready exchange to the delivery
//! layer as an [`ExchangeReady`] event.
//!
//! # Module Structure
//!
//! - `types` - Exchange, request/response records and wire signals
//! - `body` - Decoding raw request bodies
//! - `correlator` - Per-session state machine and timers

mod body;
mod correlator;
mod types;

pub use body::decode_body;
pub use correlator::CorrelatorSession;
pub use types::{
    CaptureSignal, CapturedExchange, ExchangeReady, ExchangeState, Headers, ObservedResponse,
    RequestData, ResponseData,
};
