//! sio-test-utils: shared test harness for the socket.io server — spins up
//! a real router on a random port and speaks its wire-format WebSocket
//! transport directly, rather than mocking the protocol.

pub mod mock_ws_client;
pub mod test_server;

pub use mock_ws_client::SioWsClient;
pub use test_server::TestServer;
