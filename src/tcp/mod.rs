mod flags;
mod flow;
mod segment;

pub use self::flags::Flags;
pub use self::flags::{ACK, FIN, PSH, RST, SYN};
pub use self::flow::FlowKey;
pub use self::segment::Packet;
