pub mod config;
pub mod connection;
pub mod connection_info;
pub mod container;
pub mod error;
pub mod handshake;
pub mod router;
pub mod session;
pub mod stats;
pub mod transport;

pub use config::RouterSettings;
pub use connection::{AckCallback, Connection, ConnectionContext, InboundMessage};
pub use error::ServerError;
pub use router::{build_router, AppState, ConnectionFactory};
pub use session::Session;
