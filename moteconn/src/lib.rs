pub mod am;
mod crc;
pub mod mote;
pub mod platform;
pub mod printf;
pub mod serial;
pub mod sf;
pub mod source;

pub use crate::am::AmPacket;
pub use crate::mote::MoteIf;
pub use crate::printf::PrintfMsg;
pub use crate::source::SourceDescriptor;
