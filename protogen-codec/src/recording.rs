//! Recording files.
//!
//! A binary recording starts with the magic `DPREC\0`, a big-endian u16
//! metadata length and a JSON object of string metadata, followed by
//! message frames back to back. A text recording starts with `!key=value`
//! metadata lines, followed by one text message per line (or block).

use crate::binary::Codec;
use crate::error::RecordingError;
use crate::stream::FrameDecoder;
use crate::text::TextMessage;
use crate::textparser::{escape, ParseResult, TextParser};
use crate::value::Message;
use std::collections::BTreeMap;
use std::io::{BufRead, Read, Write};

/// Magic bytes at the start of a binary recording.
pub const MAGIC: &[u8; 6] = b"DPREC\0";

/// Recording header metadata.
pub type Metadata = BTreeMap<String, String>;

pub trait RecordingWriter {
    /// Writes the file header, including the metadata.
    ///
    /// Must be called before the first `write_message`.
    fn write_header(&mut self, metadata: &Metadata) -> Result<(), RecordingError>;

    fn write_message(&mut self, msg: &Message) -> Result<(), RecordingError>;
}

pub struct BinaryWriter<'c, W> {
    codec: Codec<'c>,
    out: W,
}

impl<'c, W: Write> BinaryWriter<'c, W> {
    pub fn open(codec: Codec<'c>, out: W) -> Self {
        Self { codec, out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RecordingWriter for BinaryWriter<'_, W> {
    fn write_header(&mut self, metadata: &Metadata) -> Result<(), RecordingError> {
        let json = serde_json::to_vec(metadata)?;
        let len = u16::try_from(json.len())
            .map_err(|_| RecordingError::MetadataTooLong(json.len()))?;

        self.out.write_all(MAGIC)?;
        self.out.write_all(&len.to_be_bytes())?;
        self.out.write_all(&json)?;
        Ok(())
    }

    fn write_message(&mut self, msg: &Message) -> Result<(), RecordingError> {
        let frame = self.codec.encode(msg)?;
        self.out.write_all(&frame)?;
        Ok(())
    }
}

pub struct TextWriter<'c, W> {
    codec: Codec<'c>,
    out: W,
}

impl<'c, W: Write> TextWriter<'c, W> {
    pub fn open(codec: Codec<'c>, out: W) -> Self {
        Self { codec, out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RecordingWriter for TextWriter<'_, W> {
    fn write_header(&mut self, metadata: &Metadata) -> Result<(), RecordingError> {
        for (key, value) in metadata {
            writeln!(self.out, "!{}={}", key, escape(value))?;
        }
        Ok(())
    }

    fn write_message(&mut self, msg: &Message) -> Result<(), RecordingError> {
        let text = self.codec.to_text(msg)?;
        writeln!(self.out, "{}", text)?;
        Ok(())
    }
}

/// Reads messages from a binary recording.
pub struct BinaryReader<'c, R> {
    input: R,
    decoder: FrameDecoder<'c>,
    metadata: Metadata,
    done: bool,
}

impl<'c, R: Read> BinaryReader<'c, R> {
    /// Reads the recording header.
    pub fn open(codec: Codec<'c>, mut input: R) -> Result<Self, RecordingError> {
        let mut magic = [0u8; 6];
        input.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(RecordingError::BadMagic(magic.to_vec()));
        }

        let mut len = [0u8; 2];
        input.read_exact(&mut len)?;
        let mut json = vec![0u8; u16::from_be_bytes(len) as usize];
        input.read_exact(&mut json)?;
        let metadata: Metadata = serde_json::from_slice(&json)?;

        tracing::debug!(entries = metadata.len(), "opened binary recording");

        Ok(Self {
            input,
            decoder: FrameDecoder::new(codec),
            metadata,
            done: false,
        })
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Reads the next message, or `None` at the end of the file.
    ///
    /// A malformed frame is returned as an error; reading can continue
    /// with the next frame.
    pub fn read_message(&mut self) -> Result<Option<Message>, RecordingError> {
        let mut chunk = [0u8; 8192];
        loop {
            if let Some(msg) = self.decoder.decode()? {
                return Ok(Some(msg));
            }

            match self.input.read(&mut chunk)? {
                0 => {
                    self.done = true;
                    self.decoder.finish()?;
                    return Ok(None);
                }
                n => self.decoder.extend(&chunk[..n]),
            }
        }
    }
}

impl<R: Read> Iterator for BinaryReader<'_, R> {
    type Item = Result<Message, RecordingError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_message() {
            Ok(msg) => msg.map(Ok),
            Err(e) => {
                if matches!(e, RecordingError::Io(_)) {
                    self.done = true;
                }
                Some(Err(e))
            }
        }
    }
}

/// Reads messages from a text recording.
pub struct TextReader<'c, R> {
    codec: Codec<'c>,
    input: R,
    parser: TextParser,
    metadata: Metadata,
    pending: Option<(usize, TextMessage)>,
    line_no: usize,
    done: bool,
}

impl<'c, R: BufRead> TextReader<'c, R> {
    /// Reads the metadata lines at the start of the recording.
    pub fn open(codec: Codec<'c>, input: R) -> Result<Self, RecordingError> {
        let mut reader = Self {
            codec,
            input,
            parser: TextParser::new(),
            metadata: Metadata::new(),
            pending: None,
            line_no: 0,
            done: false,
        };

        while let Some(result) = reader.next_line()? {
            match result {
                ParseResult::Metadata(key, value) => {
                    reader.metadata.insert(key, value);
                }
                ParseResult::Message(msg) => {
                    reader.pending = Some((reader.line_no, msg));
                    break;
                }
                ParseResult::Skip | ParseResult::NeedMore => {}
            }
        }

        tracing::debug!(entries = reader.metadata.len(), "opened text recording");
        Ok(reader)
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Reads the next message, or `None` at the end of the file.
    pub fn read_message(&mut self) -> Result<Option<Message>, RecordingError> {
        let (line, text) = match self.pending.take() {
            Some(pending) => pending,
            None => loop {
                match self.next_line()? {
                    Some(ParseResult::Message(msg)) => break (self.line_no, msg),
                    Some(ParseResult::Metadata(key, _)) => {
                        tracing::warn!(
                            line = self.line_no,
                            key = %key,
                            "ignoring metadata after first message"
                        );
                    }
                    Some(ParseResult::Skip | ParseResult::NeedMore) => {}
                    None => return Ok(None),
                }
            },
        };

        self.codec
            .from_text(&text)
            .map(Some)
            .map_err(|source| RecordingError::Line { line, source })
    }

    /// Feeds the next input line to the parser. `None` at end of input.
    fn next_line(&mut self) -> Result<Option<ParseResult>, RecordingError> {
        if self.done {
            return Ok(None);
        }

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            self.done = true;
            self.parser.finish().map_err(|source| RecordingError::Line {
                line: self.line_no,
                source,
            })?;
            return Ok(None);
        }

        self.line_no += 1;
        self.parser
            .parse_line(&line)
            .map(Some)
            .map_err(|source| RecordingError::Line {
                line: self.line_no,
                source,
            })
    }
}

impl<R: BufRead> Iterator for TextReader<'_, R> {
    type Item = Result<Message, RecordingError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_message() {
            Ok(msg) => msg.map(Ok),
            Err(RecordingError::Io(e)) => {
                self.done = true;
                Some(Err(RecordingError::Io(e)))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
