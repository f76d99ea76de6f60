//! Per-packet parsing: walk the container inheritance forest, consuming
//! entries and descending through restriction-criteria matches until a
//! concrete container is reached.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::bits::BitCursor;
use crate::error::UnrecognizedPacket;
use crate::packet::{ParseContext, ParsedPacket, PrimaryHeader};
use crate::xtce::container::{ContainerEntry, SequenceContainer};
use crate::xtce::PacketDefinition;
use crate::{Error, Result};

/// Parses single framed packets against a definition.
///
/// The parser is cheap to construct and holds only configuration; one
/// instance can parse any number of packets. [`crate::stream`] drives it
/// over a byte source, but it can also be used directly on a framed
/// buffer.
#[derive(Debug, Clone)]
pub struct PacketParser<'a> {
    definition: &'a PacketDefinition,
    root_container: String,
    skip_secondary_header_bytes: usize,
    word_size_bytes: Option<usize>,
    header_names: HashMap<String, String>,
}

impl<'a> PacketParser<'a> {
    const MAX_REF_DEPTH: usize = 64;

    #[must_use]
    pub fn new(definition: &'a PacketDefinition) -> Self {
        PacketParser {
            definition,
            root_container: definition.root_container_name().to_string(),
            skip_secondary_header_bytes: 0,
            word_size_bytes: None,
            header_names: HashMap::new(),
        }
    }

    /// Start the container walk somewhere other than the definition's
    /// default root.
    #[must_use]
    pub fn with_root_container(mut self, name: impl Into<String>) -> Self {
        self.root_container = name.into();
        self
    }

    /// Skip a fixed number of bytes after the primary header, for packets
    /// whose secondary header is described out-of-band.
    #[must_use]
    pub fn with_secondary_header_skip(mut self, nbytes: usize) -> Self {
        self.skip_secondary_header_bytes = nbytes;
        self
    }

    /// Pad the cursor to a word boundary once the final container has been
    /// consumed.
    #[must_use]
    pub fn with_word_size(mut self, nbytes: usize) -> Self {
        self.word_size_bytes = Some(nbytes);
        self
    }

    /// Rename parameters on insertion into the parse context. References
    /// by the original name still resolve.
    #[must_use]
    pub fn with_header_names(mut self, names: HashMap<String, String>) -> Self {
        self.header_names = names;
        self
    }

    /// Parse one framed packet.
    ///
    /// `data` must hold a whole packet: 6 header bytes plus `PKT_LEN + 1`
    /// user-data bytes. Extra bytes past the framed length are ignored.
    ///
    /// # Errors
    /// - [`Error::NotEnoughData`] if `data` is shorter than its header
    ///   claims.
    /// - [`Error::Unrecognized`] if container resolution fails or a
    ///   bit-read or evaluation error interrupts parsing; the partial
    ///   context is carried in the error.
    pub fn parse(&self, data: &[u8]) -> Result<ParsedPacket> {
        let header = PrimaryHeader::decode(data)?;
        let total = header.packet_len();
        if data.len() < total {
            return Err(Error::NotEnoughData {
                actual: data.len(),
                minimum: total,
            });
        }
        let data = &data[..total];

        let mut cursor = BitCursor::new(data);
        let mut ctx = ParseContext::with_aliases(self.header_names.clone());
        let mut last_container = self.root_container.clone();

        let final_container = match self.walk(&mut cursor, &mut ctx, &mut last_container) {
            Ok(name) => name,
            Err(err @ Error::Definition(_)) => return Err(err),
            Err(err) => {
                debug!(apid = header.apid, container = %last_container, %err, "packet not recognized");
                return Err(Error::Unrecognized(Box::new(UnrecognizedPacket {
                    container: last_container,
                    reason: err.to_string(),
                    partial: ctx,
                    header,
                })));
            }
        };

        if let Some(word_bytes) = self.word_size_bytes {
            let word_bits = word_bytes * 8;
            let rem = cursor.position() % word_bits;
            if rem != 0 {
                // Pad bits cannot extend past the packet.
                let pad = (word_bits - rem).min(cursor.remaining());
                cursor.skip(pad)?;
            }
        }

        let trailing_bits = cursor.remaining();
        if trailing_bits > 0 {
            warn!(
                apid = header.apid,
                container = %final_container,
                trailing_bits,
                "packet has unparsed trailing bits"
            );
        }

        Ok(ParsedPacket {
            header,
            data: data.to_vec(),
            fields: ctx,
            trailing_bits,
        })
    }

    /// The container walk. Consumes the current container's entries, then
    /// filters its inheritors by restriction criteria:
    ///
    /// - exactly one match: descend and repeat;
    /// - no match and the container is concrete: done;
    /// - no match and the container is abstract, or more than one match:
    ///   the packet is unrecognized.
    fn walk(
        &self,
        cursor: &mut BitCursor<'_>,
        ctx: &mut ParseContext,
        last_container: &mut String,
    ) -> Result<String> {
        let mut current = self.lookup(&self.root_container)?;
        let mut first = true;
        loop {
            last_container.clone_from(&current.name);
            self.parse_entries(current, cursor, ctx, 0)?;
            if first {
                cursor.skip(self.skip_secondary_header_bytes * 8)?;
                first = false;
            }

            let mut matched: Vec<&SequenceContainer> = Vec::new();
            for name in &current.inheritors {
                let child = self.lookup(name)?;
                let mut applies = true;
                for criterion in &child.restriction_criteria {
                    if !criterion.evaluate(ctx, None)? {
                        applies = false;
                        break;
                    }
                }
                if applies {
                    matched.push(child);
                }
            }

            match matched.len() {
                1 => current = matched[0],
                0 => {
                    if current.is_abstract {
                        return Err(Error::Evaluation(format!(
                            "abstract container {} has no inheritor matching the parsed data",
                            current.name
                        )));
                    }
                    return Ok(current.name.clone());
                }
                _ => {
                    let names: Vec<&str> =
                        matched.iter().map(|c| c.name.as_str()).collect();
                    return Err(Error::Evaluation(format!(
                        "ambiguous inheritors of container {}: {}",
                        current.name,
                        names.join(", ")
                    )));
                }
            }
        }
    }

    /// Consume a container's own entry list. Container-ref entries inline
    /// the referenced container's entries recursively; inheritance of the
    /// referenced container is ignored at the reference site.
    fn parse_entries(
        &self,
        container: &SequenceContainer,
        cursor: &mut BitCursor<'_>,
        ctx: &mut ParseContext,
        depth: usize,
    ) -> Result<()> {
        // Container-ref chains are finite in any sane definition; a bound
        // turns a self-referencing entry list into an error instead of
        // exhausting the stack.
        if depth > Self::MAX_REF_DEPTH {
            return Err(Error::Definition(format!(
                "container reference nesting deeper than {} at {}",
                Self::MAX_REF_DEPTH,
                container.name
            )));
        }
        for entry in &container.entries {
            match entry {
                ContainerEntry::Parameter(parameter) => {
                    let value = parameter.parameter_type.parse_value(cursor, ctx)?;
                    ctx.insert(&parameter.name, value);
                }
                ContainerEntry::Container(name) => {
                    self.parse_entries(self.lookup(name)?, cursor, ctx, depth + 1)?;
                }
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<&'a SequenceContainer> {
        self.definition
            .container(name)
            .ok_or_else(|| Error::Definition(format!("container {name} is not defined")))
    }
}
