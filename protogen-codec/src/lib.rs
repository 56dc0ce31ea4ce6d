//! # protogen-codec
//!
//! Binary and text codecs for catalogue-described messages.
//!
//! This crate provides:
//! - The 4-byte frame header and a streaming frame decoder
//! - Schema-driven binary encoding and decoding of messages
//! - The human-readable text form and its line syntax
//! - Binary and text recording readers and writers

pub mod binary;
pub mod error;
pub mod frame;
pub mod recording;
pub mod stream;
pub mod text;
pub mod textparser;
pub mod value;

pub use binary::Codec;
pub use error::{CodecError, ErrorKind, RecordingError, TextError};
pub use frame::{split_frame, FrameHeader, HEADER_SIZE};
pub use recording::{
    BinaryReader, BinaryWriter, Metadata, RecordingWriter, TextReader, TextWriter, MAGIC,
};
pub use stream::FrameDecoder;
pub use text::{FlagPolicy, TextMessage, TextOptions};
pub use textparser::{ParseResult, TextParser};
pub use value::{Message, Value};

#[cfg(test)]
pub(crate) mod testutil {
    use protogen_schema::{Catalogue, LongField, MessageDescriptor};

    /// The drawing protocol shipped with the workspace.
    pub fn catalogue() -> Catalogue {
        Catalogue::from_yaml_str(include_str!("../../protocol.yaml")).unwrap()
    }

    /// Small catalogue exercising number formats.
    pub fn minimal_catalogue() -> Catalogue {
        Catalogue::build(
            "test",
            vec![
                MessageDescriptor::new(
                    "Scaled",
                    1,
                    vec![LongField::new("value u16").with_format("div100").into()],
                ),
                MessageDescriptor::new(
                    "Flagged",
                    2,
                    vec![LongField::new("bits flags").with_flags(["a", "b", "c"]).into()],
                ),
                MessageDescriptor::new(
                    "HexId",
                    3,
                    vec![LongField::new("id u16").with_format("hex").into()],
                ),
                MessageDescriptor::new(
                    "Signed",
                    4,
                    vec![LongField::new("delta i16").with_format("hex").into()],
                ),
            ],
        )
        .unwrap()
    }
}
