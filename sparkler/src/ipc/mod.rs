//! S-expression control surface for driving the recognizer from a host.

pub mod dispatch;
pub mod server;

pub use dispatch::handle_message;
pub use server::serve;
