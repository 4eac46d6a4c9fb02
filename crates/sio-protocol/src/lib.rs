//! Wire format for the Socket.IO 0.7/0.8 server protocol: packet encoding
//! and the multi-packet frame envelope. No transport or session state
//! lives here — see the `sio-server` crate for that.

pub mod error;
pub mod frame;
pub mod packet;

pub use error::{CodecError, CodecResult};
pub use frame::{decode_frames, encode_frames};
pub use packet::{decode, encode, EventArgs, MessageId, Packet};
