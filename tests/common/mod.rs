//! Shared fixtures for integration tests.

use xtce_telemetry::PrimaryHeader;

/// Wrap TelemetryMetaData content in a SpaceSystem document.
pub fn xtce_document(telemetry_meta_data: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<xtce:SpaceSystem xmlns:xtce="http://www.omg.org/space/xtce" name="TEST">
    <xtce:TelemetryMetaData>
{telemetry_meta_data}
    </xtce:TelemetryMetaData>
</xtce:SpaceSystem>"#
    )
}

/// A well-formed CCSDS packet with the given APID and user data.
pub fn ccsds_packet(apid: u16, user_data: &[u8]) -> Vec<u8> {
    assert!(!user_data.is_empty(), "CCSDS packets carry at least 1 user byte");
    let mut packet = Vec::with_capacity(PrimaryHeader::LEN + user_data.len());
    let d1 = apid & 0x7ff;
    let d2 = u16::from(PrimaryHeader::SEQ_UNSEGMENTED) << 14;
    let d3 = (user_data.len() - 1) as u16;
    packet.extend(d1.to_be_bytes());
    packet.extend(d2.to_be_bytes());
    packet.extend(d3.to_be_bytes());
    packet.extend(user_data);
    packet
}

/// The parameter types and parameters for a plain CCSDS header container.
pub const HEADER_TYPES: &str = r#"
    <xtce:IntegerParameterType name="U3"><xtce:IntegerDataEncoding sizeInBits="3"/></xtce:IntegerParameterType>
    <xtce:IntegerParameterType name="U1"><xtce:IntegerDataEncoding sizeInBits="1"/></xtce:IntegerParameterType>
    <xtce:IntegerParameterType name="U11"><xtce:IntegerDataEncoding sizeInBits="11"/></xtce:IntegerParameterType>
    <xtce:IntegerParameterType name="U2"><xtce:IntegerDataEncoding sizeInBits="2"/></xtce:IntegerParameterType>
    <xtce:IntegerParameterType name="U14"><xtce:IntegerDataEncoding sizeInBits="14"/></xtce:IntegerParameterType>
    <xtce:IntegerParameterType name="U16"><xtce:IntegerDataEncoding sizeInBits="16"/></xtce:IntegerParameterType>
"#;

pub const HEADER_PARAMS: &str = r#"
    <xtce:Parameter name="VERSION" parameterTypeRef="U3"/>
    <xtce:Parameter name="TYPE" parameterTypeRef="U1"/>
    <xtce:Parameter name="SEC_HDR_FLG" parameterTypeRef="U1"/>
    <xtce:Parameter name="PKT_APID" parameterTypeRef="U11"/>
    <xtce:Parameter name="SEQ_FLGS" parameterTypeRef="U2"/>
    <xtce:Parameter name="SRC_SEQ_CTR" parameterTypeRef="U14"/>
    <xtce:Parameter name="PKT_LEN" parameterTypeRef="U16"/>
"#;

pub const HEADER_ENTRIES: &str = r#"
    <xtce:ParameterRefEntry parameterRef="VERSION"/>
    <xtce:ParameterRefEntry parameterRef="TYPE"/>
    <xtce:ParameterRefEntry parameterRef="SEC_HDR_FLG"/>
    <xtce:ParameterRefEntry parameterRef="PKT_APID"/>
    <xtce:ParameterRefEntry parameterRef="SEQ_FLGS"/>
    <xtce:ParameterRefEntry parameterRef="SRC_SEQ_CTR"/>
    <xtce:ParameterRefEntry parameterRef="PKT_LEN"/>
"#;

/// A reader that hands out at most one byte per `read` call, for checking
/// that parsing is invariant under source chunking.
pub struct OneByteReader<'a> {
    data: &'a [u8],
    at: usize,
}

impl<'a> OneByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        OneByteReader { data, at: 0 }
    }
}

impl std::io::Read for OneByteReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.at >= self.data.len() || buf.is_empty() {
            return Ok(0);
        }
        buf[0] = self.data[self.at];
        self.at += 1;
        Ok(1)
    }
}
