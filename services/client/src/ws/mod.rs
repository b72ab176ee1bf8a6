//! WebSocket Session Runtime
//!
//! Everything between the tutor server and the session store lives here:
//!
//! - `connection`: owns the WebSocket link, its lifecycle state and reconnection.
//! - `router`: classifies inbound frames, drops repeats and mutates the store.
//! - `dispatcher`: turns user intents into outbound commands.
//! - `debounce`: the cancelable timer behind volume syncing.
//! - `session`: the single task that serializes all of the above.

pub mod connection;
mod debounce;
pub mod dispatcher;
pub mod router;
pub mod session;

pub use connection::{ConnectionManager, ConnectionState, Connector, ReconnectPolicy, WsConnector};
pub use session::{Session, SessionHandle, UserAction};
