#![doc = include_str!("../README.md")]

mod error;

pub mod bits;
pub mod csvdef;
pub mod packet;
pub mod parser;
pub mod stream;
pub mod summary;
pub mod value;
pub mod xtce;

pub use error::{Error, Result, UnrecognizedPacket};
pub use packet::{Apid, ParseContext, ParsedPacket, PrimaryHeader};
pub use parser::PacketParser;
pub use stream::{
    decode_packets, decode_packets_with, read_packets, PacketStream, Progress, RawPacket,
    StreamOptions,
};
pub use summary::Summary;
pub use value::{ParameterValue, Value};
pub use xtce::PacketDefinition;
