//! Framed TCP session server: one active peer at a time, either accepted
//! inbound or dialed outbound, with a strict two-stage length-prefixed read
//! loop and handler callbacks for connect/message/error events (§4.1).

mod server;

pub use server::{Handlers, SessionError, SessionServer};
