//! Pull-based packet streams over any byte source.
//!
//! [`read_packets`] frames raw CCSDS packets from a reader without a
//! definition. [`decode_packets`] layers the XTCE parser on top, yielding
//! fully decoded packets. Both are plain synchronous iterators: the
//! consumer drives all progress, and blocking is delegated to the
//! underlying reader.

use std::collections::HashMap;
use std::io::{ErrorKind, Read};

use tracing::{debug, info, warn};

use crate::packet::{ParseContext, ParsedPacket, PrimaryHeader, HEADER_FIELDS};
use crate::parser::PacketParser;
use crate::value::{ParameterValue, Value};
use crate::xtce::PacketDefinition;
use crate::{Error, Result};

/// A framed but undecoded CCSDS packet.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RawPacket {
    pub header: PrimaryHeader,
    /// All packet bytes, including the 6 header bytes.
    pub data: Vec<u8>,
    /// Byte offset of this packet within the source.
    pub offset: usize,
}

impl RawPacket {
    /// Packet bytes after the primary header.
    #[must_use]
    pub fn user_data(&self) -> &[u8] {
        &self.data[PrimaryHeader::LEN..]
    }
}

/// Return an iterator framing [`RawPacket`]s from a byte-synchronized
/// packet stream.
///
/// Iteration ends cleanly at EOF, or at a read timeout that lands on a
/// packet boundary; a trailing fragment shorter than a header is dropped
/// with a warning. EOF or timeout inside a packet yields an error and ends
/// iteration.
///
/// # Examples
/// ```
/// use xtce_telemetry::read_packets;
///
/// let dat: &[u8] = &[
///     // primary header, apid 100, one byte of user data
///     0x08, 0x64, 0xc0, 0x00, 0x00, 0x00,
///     0xff,
/// ];
/// let packets: Vec<_> = read_packets(dat).map(Result::unwrap).collect();
/// assert_eq!(packets.len(), 1);
/// assert_eq!(packets[0].header.apid, 100);
/// ```
pub fn read_packets<R: Read>(reader: R) -> RawPacketIter<R> {
    RawPacketIter {
        reader,
        offset: 0,
        done: false,
    }
}

pub struct RawPacketIter<R> {
    reader: R,
    offset: usize,
    done: bool,
}

impl<R> RawPacketIter<R> {
    /// Bytes consumed from the source so far.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Read until `buf` is full, EOF, or a read timeout. Returns the filled
/// byte count and the error that stopped the fill, if any.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> (usize, Option<std::io::Error>) {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return (filled, Some(e)),
        }
    }
    (filled, None)
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

impl<R: Read> Iterator for RawPacketIter<R> {
    type Item = Result<RawPacket>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut header_bytes = [0u8; PrimaryHeader::LEN];
        match fill(&mut self.reader, &mut header_bytes) {
            (0, None) => {
                self.done = true;
                return None;
            }
            // A timeout on the packet boundary is a clean end of stream.
            (0, Some(err)) if is_timeout(&err) => {
                debug!("read timeout at packet boundary, ending stream");
                self.done = true;
                return None;
            }
            (n, None) if n < header_bytes.len() => {
                warn!(bytes = n, "dropping trailing fragment shorter than a packet header");
                self.done = true;
                return None;
            }
            (_, Some(err)) => {
                self.done = true;
                return Some(Err(Error::Io(err)));
            }
            _ => {}
        }

        let header = match PrimaryHeader::decode(&header_bytes) {
            Ok(h) => h,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        let total = header.packet_len();
        let mut data = vec![0u8; total];
        data[..PrimaryHeader::LEN].copy_from_slice(&header_bytes);
        match fill(&mut self.reader, &mut data[PrimaryHeader::LEN..]) {
            (n, maybe_err) if n < total - PrimaryHeader::LEN => {
                self.done = true;
                let err = maybe_err.unwrap_or_else(|| {
                    std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        format!(
                            "EOF inside packet: got {} of {} user-data bytes",
                            n,
                            total - PrimaryHeader::LEN
                        ),
                    )
                });
                return Some(Err(Error::Io(err)));
            }
            _ => {}
        }

        let packet = RawPacket {
            header,
            data,
            offset: self.offset,
        };
        self.offset += total;
        Some(Ok(packet))
    }
}

/// Counters handed to a progress callback after each packet.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct Progress {
    /// Bytes consumed from the source.
    pub bytes: usize,
    /// Packets framed, recognized or not.
    pub packets: usize,
    /// Packets that failed container resolution.
    pub unrecognized: usize,
}

/// Configuration for [`decode_packets_with`].
#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    /// Overrides the definition's default root container.
    pub root_container: Option<String>,
    /// Yield [`Error::Unrecognized`] items inline instead of skipping
    /// unrecognized packets silently.
    pub yield_unrecognized_errors: bool,
    /// Emit only the seven primary-header fields; user data is framed but
    /// not parsed.
    pub parse_headers_only: bool,
    /// Bytes to skip after the primary header, for a fixed secondary
    /// header described out-of-band.
    pub skip_secondary_header_bytes: usize,
    /// Pad each packet's parse position to a word boundary before the
    /// length check.
    pub word_size_bytes: Option<usize>,
    /// Alternative names for parameters, keyed by definition name. Chiefly
    /// used to rename the seven primary-header fields.
    pub header_names: HashMap<String, String>,
}

/// Decode packets from `reader` with default options.
///
/// Unrecognized packets are skipped silently; pass
/// [`StreamOptions::yield_unrecognized_errors`] via [`decode_packets_with`]
/// to receive them.
pub fn decode_packets<'d, R: Read>(
    definition: &'d PacketDefinition,
    reader: R,
) -> PacketStream<'d, R> {
    decode_packets_with(definition, reader, StreamOptions::default())
}

/// Decode packets from `reader` with explicit options.
pub fn decode_packets_with<'d, R: Read>(
    definition: &'d PacketDefinition,
    reader: R,
    options: StreamOptions,
) -> PacketStream<'d, R> {
    let mut parser = PacketParser::new(definition)
        .with_secondary_header_skip(options.skip_secondary_header_bytes)
        .with_header_names(options.header_names.clone());
    if let Some(root) = &options.root_container {
        parser = parser.with_root_container(root.clone());
    }
    if let Some(word) = options.word_size_bytes {
        parser = parser.with_word_size(word);
    }
    info!(
        root = options.root_container.as_deref().unwrap_or(definition.root_container_name()),
        headers_only = options.parse_headers_only,
        "creating packet stream"
    );
    PacketStream {
        raw: read_packets(reader),
        parser,
        options,
        progress: None,
        packets: 0,
        unrecognized: 0,
    }
}

/// Iterator of decoded packets over a byte source.
///
/// Yields `Ok(ParsedPacket)` per recognized packet. Unrecognized packets
/// are skipped or yielded as errors per [`StreamOptions`]; source failures
/// are yielded once and end iteration.
pub struct PacketStream<'d, R> {
    raw: RawPacketIter<R>,
    parser: PacketParser<'d>,
    options: StreamOptions,
    progress: Option<Box<dyn FnMut(Progress) + Send>>,
    packets: usize,
    unrecognized: usize,
}

impl<'d, R: Read> PacketStream<'d, R> {
    /// Install a progress callback invoked after every framed packet.
    #[must_use]
    pub fn with_progress(mut self, callback: impl FnMut(Progress) + Send + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    fn emit_progress(&mut self) {
        if let Some(callback) = &mut self.progress {
            callback(Progress {
                bytes: self.raw.offset(),
                packets: self.packets,
                unrecognized: self.unrecognized,
            });
        }
    }

    /// Build the seven header fields straight from the primary header.
    fn headers_only_packet(&self, raw: RawPacket) -> ParsedPacket {
        let mut ctx = ParseContext::with_aliases(self.options.header_names.clone());
        let h = &raw.header;
        let values: [u64; 7] = [
            u64::from(h.version),
            u64::from(h.type_flag),
            u64::from(h.has_secondary_header),
            u64::from(h.apid),
            u64::from(h.sequence_flags),
            u64::from(h.sequence_count),
            u64::from(h.len_minus1),
        ];
        for (name, value) in HEADER_FIELDS.iter().zip(values) {
            ctx.insert(name, ParameterValue::new(Value::Uint(value)));
        }
        let trailing_bits = (raw.data.len() - PrimaryHeader::LEN) * 8;
        ParsedPacket {
            header: raw.header,
            data: raw.data,
            fields: ctx,
            trailing_bits,
        }
    }
}

impl<'d, R: Read> Iterator for PacketStream<'d, R> {
    type Item = Result<ParsedPacket>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let raw = match self.raw.next() {
                None => {
                    info!(
                        bytes = self.raw.offset(),
                        packets = self.packets,
                        unrecognized = self.unrecognized,
                        "packet stream complete"
                    );
                    return None;
                }
                Some(Err(err)) => return Some(Err(err)),
                Some(Ok(raw)) => raw,
            };
            self.packets += 1;

            if self.options.parse_headers_only {
                let packet = self.headers_only_packet(raw);
                self.emit_progress();
                return Some(Ok(packet));
            }

            match self.parser.parse(&raw.data) {
                Ok(packet) => {
                    self.emit_progress();
                    return Some(Ok(packet));
                }
                Err(Error::Unrecognized(details)) => {
                    self.unrecognized += 1;
                    self.emit_progress();
                    if self.options.yield_unrecognized_errors {
                        return Some(Err(Error::Unrecognized(details)));
                    }
                    // Skip silently and keep framing.
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_consecutive_packets() {
        let mut data = crate::test_support::ccsds_packet(100, &[0xaa, 0xbb]);
        data.extend(crate::test_support::ccsds_packet(101, &[0xcc]));

        let packets: Vec<RawPacket> = read_packets(&data[..]).map(Result::unwrap).collect();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].header.apid, 100);
        assert_eq!(packets[0].user_data(), &[0xaa, 0xbb]);
        assert_eq!(packets[0].offset, 0);
        assert_eq!(packets[1].header.apid, 101);
        assert_eq!(packets[1].offset, 8);
    }

    #[test]
    fn trailing_fragment_is_dropped() {
        let mut data = crate::test_support::ccsds_packet(100, &[0xaa]);
        data.extend([0x01, 0x02, 0x03]); // < 6 bytes, not a header

        let results: Vec<_> = read_packets(&data[..]).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
    }

    #[test]
    fn eof_mid_packet_is_an_error() {
        let data = crate::test_support::ccsds_packet(100, &[0xaa, 0xbb, 0xcc]);
        let truncated = &data[..data.len() - 2];

        let results: Vec<_> = read_packets(truncated).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(Error::Io(_))));
    }

    #[test]
    fn empty_source_yields_nothing() {
        let results: Vec<_> = read_packets(&[][..]).collect();
        assert!(results.is_empty());
    }
}
