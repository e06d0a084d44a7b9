//! Gateway wire protocol
//!
//! Op codes, close codes, payload structures, and the message envelope used
//! on the websocket connection.

mod close_codes;
mod intents;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::{classify_close, CloseAction, CloseCode};
pub use intents::Intents;
pub use messages::GatewayMessage;
pub use opcodes::OpCode;
pub use payloads::{
    HelloPayload, IdentifyPayload, IdentifyProperties, PresenceUpdatePayload, ReadyPayload,
    ResumePayload,
};
