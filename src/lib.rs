#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod call;
pub mod config;
pub mod error;
mod events;
pub mod hex;
pub mod line;
mod module_timing;
pub mod modules;
pub mod pdu;
pub mod registration;
pub mod sms;
pub mod state;
pub mod urc;

mod runner;

pub use call::CallState;
pub use config::{ModemConfig, NoPin, ReverseOutputPin};
pub use error::Error;
pub use modules::ModemFamily;
pub use pdu::{Concat, PduCodec, PduError};
pub use runner::Runner;
pub use state::State;
