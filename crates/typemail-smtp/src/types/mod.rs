//! Core SMTP types.

mod address;
mod extension;
mod message;
pub mod replies;
mod reply;

pub use address::Address;
pub use extension::{AuthMechanism, Extension};
pub use message::{CRLF, Message, stuff_lines, unstuff};
pub use reply::{Reply, ReplyCode};
