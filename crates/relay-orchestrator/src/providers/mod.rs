//! Built-in provider adapters.

mod echo;

pub use echo::EchoProvider;
