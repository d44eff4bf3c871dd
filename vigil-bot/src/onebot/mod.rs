//! OneBot v11 HTTP delivery.
//!
//! One digest per send, fanned out to a group and/or a private user. The
//! endpoint's shape picks the wire dialect (see [`dialect`]).
pub mod dialect;
pub mod digest;
pub mod dispatcher;
pub mod envelope;
pub mod outcome;

pub use dialect::{Dialect, WireRequest};
pub use digest::{render_digest, DIGEST_CEILING_CHARS};
pub use dispatcher::{Delivery, DeliveryReport, DispatchError, OneBotDispatcher, OneBotSettings};
pub use envelope::{ActionName, BotDestination, DispatchEnvelope, MessageParams};
pub use outcome::{DispatchOutcome, Verdict};
