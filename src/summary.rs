//! Stream accounting.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::packet::{Apid, PrimaryHeader};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ApidSummary {
    pub count: usize,
    pub bytes: usize,
    pub missing: usize,
    pub unrecognized: usize,
}

/// Tracks stats on packet iteration.
///
/// Feed every header the stream produces, recognized or not, to get packet
/// and byte counts plus missing-sequence counts per APID.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub bytes: usize,
    pub missing: usize,
    pub unrecognized: usize,
    pub apids: HashMap<Apid, ApidSummary>,

    seen: HashMap<Apid, u16>,
}

impl Summary {
    pub fn add(&mut self, header: &PrimaryHeader) {
        self.count += 1;
        self.bytes += header.packet_len();

        let apid = self.apids.entry(header.apid).or_default();
        apid.count += 1;
        apid.bytes += header.packet_len();

        if let Some(&last) = self.seen.get(&header.apid) {
            let missing = missing_packets(header.sequence_count, last) as usize;
            apid.missing += missing;
            self.missing += missing;
        }
        self.seen.insert(header.apid, header.sequence_count);
    }

    /// Record a packet that failed container resolution. Call in addition
    /// to [`Summary::add`].
    pub fn add_unrecognized(&mut self, header: &PrimaryHeader) {
        self.unrecognized += 1;
        self.apids.entry(header.apid).or_default().unrecognized += 1;
    }
}

/// Number of sequence counts skipped between `last` and `cur`.
///
/// Sequence counts live on a 14-bit ring, so the gap is the modular
/// distance from the count after `last` to `cur`. Consecutive packets give
/// 0; `cur == last` reads as a full lap short of itself, the largest
/// possible gap.
#[must_use]
pub fn missing_packets(cur: u16, last: u16) -> u16 {
    const RING: u32 = PrimaryHeader::SEQ_MAX as u32 + 1;
    let distance = (u32::from(cur) + RING - u32::from(last) - 1) % RING;
    distance as u16
}
