//! Small services built on the messaging helpers: an RPC-style echo and a
//! fire-and-forget ping.

pub mod echo;
pub mod ping;

pub use echo::{EchoRequest, EchoResponder, EchoResponse, EchoService};
pub use ping::{Ping, PingReceiver, PingService};
