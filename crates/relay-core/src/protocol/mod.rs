//! Protocol module containing the packet envelope, the codec and Nexus messages.

pub mod codec;
pub mod nexus;
pub mod packet;

pub use codec::{decode_packet, encode_line, encode_packet, CodecError, LineFramer, MAX_FRAME_LEN};
pub use nexus::*;
pub use packet::Packet;
