//! End-to-end decoding scenarios over in-memory and file byte sources.

mod common;

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use common::{
    ccsds_packet, xtce_document, OneByteReader, HEADER_ENTRIES, HEADER_PARAMS, HEADER_TYPES,
};
use xtce_telemetry::{
    decode_packets, decode_packets_with, Error, PacketDefinition, StreamOptions, Summary, Value,
};

/// One concrete container holding the header fields and a 64-bit payload.
fn single_packet_definition() -> PacketDefinition {
    let doc = xtce_document(&format!(
        r#"
        <xtce:ParameterTypeSet>
            {HEADER_TYPES}
            <xtce:BinaryParameterType name="B64">
                <xtce:BinaryDataEncoding>
                    <xtce:SizeInBits><xtce:FixedValue>64</xtce:FixedValue></xtce:SizeInBits>
                </xtce:BinaryDataEncoding>
            </xtce:BinaryParameterType>
        </xtce:ParameterTypeSet>
        <xtce:ParameterSet>
            {HEADER_PARAMS}
            <xtce:Parameter name="PAYLOAD" parameterTypeRef="B64"/>
        </xtce:ParameterSet>
        <xtce:ContainerSet>
            <xtce:SequenceContainer name="CCSDSPacket">
                <xtce:EntryList>
                    {HEADER_ENTRIES}
                    <xtce:ParameterRefEntry parameterRef="PAYLOAD"/>
                </xtce:EntryList>
            </xtce:SequenceContainer>
        </xtce:ContainerSet>
        "#
    ));
    PacketDefinition::from_xtce_str(&doc).unwrap()
}

/// Abstract header root with two APID-restricted inheritors.
fn two_apid_definition() -> PacketDefinition {
    let doc = xtce_document(&format!(
        r#"
        <xtce:ParameterTypeSet>
            {HEADER_TYPES}
            <xtce:IntegerParameterType name="U8"><xtce:IntegerDataEncoding sizeInBits="8"/></xtce:IntegerParameterType>
        </xtce:ParameterTypeSet>
        <xtce:ParameterSet>
            {HEADER_PARAMS}
            <xtce:Parameter name="FIELD_A" parameterTypeRef="U8"/>
            <xtce:Parameter name="FIELD_B" parameterTypeRef="U8"/>
        </xtce:ParameterSet>
        <xtce:ContainerSet>
            <xtce:SequenceContainer name="CCSDSPacket" abstract="true">
                <xtce:EntryList>
                    {HEADER_ENTRIES}
                </xtce:EntryList>
            </xtce:SequenceContainer>
            <xtce:SequenceContainer name="PacketA">
                <xtce:BaseContainer containerRef="CCSDSPacket">
                    <xtce:RestrictionCriteria>
                        <xtce:Comparison parameterRef="PKT_APID" value="1424" useCalibratedValue="false"/>
                    </xtce:RestrictionCriteria>
                </xtce:BaseContainer>
                <xtce:EntryList>
                    <xtce:ParameterRefEntry parameterRef="FIELD_A"/>
                </xtce:EntryList>
            </xtce:SequenceContainer>
            <xtce:SequenceContainer name="PacketB">
                <xtce:BaseContainer containerRef="CCSDSPacket">
                    <xtce:RestrictionCriteria>
                        <xtce:Comparison parameterRef="PKT_APID" value="1425" useCalibratedValue="false"/>
                    </xtce:RestrictionCriteria>
                </xtce:BaseContainer>
                <xtce:EntryList>
                    <xtce:ParameterRefEntry parameterRef="FIELD_B"/>
                </xtce:EntryList>
            </xtce:SequenceContainer>
        </xtce:ContainerSet>
        "#
    ));
    PacketDefinition::from_xtce_str(&doc).unwrap()
}

#[test]
fn single_fixed_packet() {
    let definition = single_packet_definition();
    // apid 100, PKT_LEN 7, 8 payload bytes
    let dat: &[u8] = &[
        0x08, 0x64, 0xc0, 0x00, 0x00, 0x07, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
    ];

    let packets: Vec<_> = decode_packets(&definition, dat).map(Result::unwrap).collect();
    assert_eq!(packets.len(), 1);
    let packet = &packets[0];
    assert_eq!(packet.get("PKT_APID").unwrap().raw, Value::Uint(100));
    assert_eq!(packet.get("PKT_LEN").unwrap().raw, Value::Uint(7));
    assert_eq!(
        packet.get("PAYLOAD").unwrap().raw,
        Value::Bytes(vec![1, 2, 3, 4, 5, 6, 7, 8])
    );
    assert_eq!(packet.header.apid, 100);
    assert_eq!(packet.trailing_bits, 0);

    // The framing buffer matches the header's own length claim.
    assert_eq!(packet.data.len(), 7 + 7);
    assert_eq!(packet.user_data(), &dat[6..]);

    // Header and user-data views split at the seventh field.
    let header_names: Vec<&str> = packet.header_fields().map(|(n, _)| n).collect();
    assert_eq!(
        header_names,
        vec!["VERSION", "TYPE", "SEC_HDR_FLG", "PKT_APID", "SEQ_FLGS", "SRC_SEQ_CTR", "PKT_LEN"]
    );
    let user_names: Vec<&str> = packet.user_data_fields().map(|(n, _)| n).collect();
    assert_eq!(user_names, vec!["PAYLOAD"]);
}

#[test]
fn implicit_variable_length_from_pkt_len() {
    // 72 bits of fixed user data, then EVENTDATA sized 8*PKT_LEN - 64.
    let doc = xtce_document(&format!(
        r#"
        <xtce:ParameterTypeSet>
            {HEADER_TYPES}
            <xtce:BinaryParameterType name="B72">
                <xtce:BinaryDataEncoding>
                    <xtce:SizeInBits><xtce:FixedValue>72</xtce:FixedValue></xtce:SizeInBits>
                </xtce:BinaryDataEncoding>
            </xtce:BinaryParameterType>
            <xtce:BinaryParameterType name="EVT">
                <xtce:BinaryDataEncoding>
                    <xtce:SizeInBits>
                        <xtce:DynamicValue>
                            <xtce:ParameterInstanceRef parameterRef="PKT_LEN" useCalibratedValue="false"/>
                            <xtce:LinearAdjustment slope="8" intercept="-64"/>
                        </xtce:DynamicValue>
                    </xtce:SizeInBits>
                </xtce:BinaryDataEncoding>
            </xtce:BinaryParameterType>
        </xtce:ParameterTypeSet>
        <xtce:ParameterSet>
            {HEADER_PARAMS}
            <xtce:Parameter name="FIXED" parameterTypeRef="B72"/>
            <xtce:Parameter name="EVENTDATA" parameterTypeRef="EVT"/>
        </xtce:ParameterSet>
        <xtce:ContainerSet>
            <xtce:SequenceContainer name="CCSDSPacket">
                <xtce:EntryList>
                    {HEADER_ENTRIES}
                    <xtce:ParameterRefEntry parameterRef="FIXED"/>
                    <xtce:ParameterRefEntry parameterRef="EVENTDATA"/>
                </xtce:EntryList>
            </xtce:SequenceContainer>
        </xtce:ContainerSet>
        "#
    ));
    let definition = PacketDefinition::from_xtce_str(&doc).unwrap();

    // PKT_LEN = 9: 10 bytes of user data, EVENTDATA = 8*9 - 64 = 8 bits.
    let mut user_data = vec![0x11; 9];
    user_data.push(0xEE);
    let packet_bytes = ccsds_packet(42, &user_data);

    let packets: Vec<_> = decode_packets(&definition, &packet_bytes[..])
        .map(Result::unwrap)
        .collect();
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].get("PKT_LEN").unwrap().raw, Value::Uint(9));
    assert_eq!(
        packets[0].get("EVENTDATA").unwrap().raw,
        Value::Bytes(vec![0xEE])
    );
    assert_eq!(packets[0].trailing_bits, 0);
}

#[test]
fn explicit_variable_length_from_byte_count_field() {
    let doc = xtce_document(&format!(
        r#"
        <xtce:ParameterTypeSet>
            {HEADER_TYPES}
            <xtce:IntegerParameterType name="U8"><xtce:IntegerDataEncoding sizeInBits="8"/></xtce:IntegerParameterType>
            <xtce:BinaryParameterType name="SCI">
                <xtce:BinaryDataEncoding>
                    <xtce:SizeInBits>
                        <xtce:DynamicValue>
                            <xtce:ParameterInstanceRef parameterRef="SCI_DATA_BYTELEN"/>
                            <xtce:LinearAdjustment slope="8"/>
                        </xtce:DynamicValue>
                    </xtce:SizeInBits>
                </xtce:BinaryDataEncoding>
            </xtce:BinaryParameterType>
        </xtce:ParameterTypeSet>
        <xtce:ParameterSet>
            {HEADER_PARAMS}
            <xtce:Parameter name="SCI_DATA_BYTELEN" parameterTypeRef="U8"/>
            <xtce:Parameter name="SCI_DATA" parameterTypeRef="SCI"/>
        </xtce:ParameterSet>
        <xtce:ContainerSet>
            <xtce:SequenceContainer name="CCSDSPacket">
                <xtce:EntryList>
                    {HEADER_ENTRIES}
                    <xtce:ParameterRefEntry parameterRef="SCI_DATA_BYTELEN"/>
                    <xtce:ParameterRefEntry parameterRef="SCI_DATA"/>
                </xtce:EntryList>
            </xtce:SequenceContainer>
        </xtce:ContainerSet>
        "#
    ));
    let definition = PacketDefinition::from_xtce_str(&doc).unwrap();

    let packet_bytes = ccsds_packet(42, &[4, 0xca, 0xfe, 0xba, 0xbe]);
    let packets: Vec<_> = decode_packets(&definition, &packet_bytes[..])
        .map(Result::unwrap)
        .collect();
    assert_eq!(packets.len(), 1);
    assert_eq!(
        packets[0].get("SCI_DATA").unwrap().raw,
        Value::Bytes(vec![0xca, 0xfe, 0xba, 0xbe])
    );
}

#[test]
fn polymorphic_inheritance_stream() {
    let definition = two_apid_definition();
    let mut dat = ccsds_packet(1424, &[0xaa]);
    dat.extend(ccsds_packet(1425, &[0xbb]));

    let packets: Vec<_> = decode_packets(&definition, &dat[..]).map(Result::unwrap).collect();
    assert_eq!(packets.len(), 2);
    assert_eq!(packets[0].get("FIELD_A").unwrap().raw, Value::Uint(0xaa));
    assert!(packets[0].get("FIELD_B").is_none());
    assert_eq!(packets[1].get("FIELD_B").unwrap().raw, Value::Uint(0xbb));
    assert!(packets[1].get("FIELD_A").is_none());
}

#[test]
fn unrecognized_packets_skipped_or_yielded() {
    let definition = two_apid_definition();
    let dat = ccsds_packet(999, &[0xaa]);

    // Disabled: the stream yields nothing and terminates cleanly.
    let results: Vec<_> = decode_packets(&definition, &dat[..]).collect();
    assert!(results.is_empty());

    // Enabled: one inline error carrying the full header context.
    let options = StreamOptions {
        yield_unrecognized_errors: true,
        ..StreamOptions::default()
    };
    let results: Vec<_> = decode_packets_with(&definition, &dat[..], options).collect();
    assert_eq!(results.len(), 1);
    let Err(Error::Unrecognized(details)) = &results[0] else {
        panic!("expected an unrecognized-packet error, got {:?}", results[0]);
    };
    assert_eq!(details.header.apid, 999);
    assert_eq!(details.partial.len(), 7);
    for name in ["VERSION", "TYPE", "SEC_HDR_FLG", "PKT_APID", "SEQ_FLGS", "SRC_SEQ_CTR", "PKT_LEN"]
    {
        assert!(details.partial.get(name).is_some(), "{name} missing from partial context");
    }

    // An unrecognized packet does not derail the ones after it.
    let mut mixed = ccsds_packet(999, &[0x01]);
    mixed.extend(ccsds_packet(1424, &[0xaa]));
    let packets: Vec<_> = decode_packets(&definition, &mixed[..]).map(Result::unwrap).collect();
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].header.apid, 1424);
}

#[test]
fn polynomial_calibration_end_to_end() {
    let doc = xtce_document(&format!(
        r#"
        <xtce:ParameterTypeSet>
            {HEADER_TYPES}
            <xtce:IntegerParameterType name="CAL8">
                <xtce:UnitSet><xtce:Unit>V</xtce:Unit></xtce:UnitSet>
                <xtce:IntegerDataEncoding sizeInBits="8">
                    <xtce:DefaultCalibrator>
                        <xtce:PolynomialCalibrator>
                            <xtce:Term coefficient="1.0" exponent="0"/>
                            <xtce:Term coefficient="2.0" exponent="1"/>
                            <xtce:Term coefficient="0.5" exponent="2"/>
                        </xtce:PolynomialCalibrator>
                    </xtce:DefaultCalibrator>
                </xtce:IntegerDataEncoding>
            </xtce:IntegerParameterType>
        </xtce:ParameterTypeSet>
        <xtce:ParameterSet>
            {HEADER_PARAMS}
            <xtce:Parameter name="VOLTAGE" parameterTypeRef="CAL8"/>
        </xtce:ParameterSet>
        <xtce:ContainerSet>
            <xtce:SequenceContainer name="CCSDSPacket">
                <xtce:EntryList>
                    {HEADER_ENTRIES}
                    <xtce:ParameterRefEntry parameterRef="VOLTAGE"/>
                </xtce:EntryList>
            </xtce:SequenceContainer>
        </xtce:ContainerSet>
        "#
    ));
    let definition = PacketDefinition::from_xtce_str(&doc).unwrap();

    let dat = ccsds_packet(1, &[10]);
    let packets: Vec<_> = decode_packets(&definition, &dat[..]).map(Result::unwrap).collect();
    let voltage = packets[0].get("VOLTAGE").unwrap();
    assert_eq!(voltage.raw, Value::Uint(10));
    assert_eq!(voltage.calibrated, Some(Value::Float(71.0)));
    assert_eq!(voltage.unit.as_deref(), Some("V"));
}

#[test]
fn unrecognized_enum_value_keeps_raw_and_sets_flag() {
    let doc = xtce_document(&format!(
        r#"
        <xtce:ParameterTypeSet>
            {HEADER_TYPES}
            <xtce:EnumeratedParameterType name="STATE">
                <xtce:IntegerDataEncoding sizeInBits="8"/>
                <xtce:EnumerationList>
                    <xtce:Enumeration value="0" label="OFF"/>
                    <xtce:Enumeration value="1" label="ON"/>
                </xtce:EnumerationList>
            </xtce:EnumeratedParameterType>
        </xtce:ParameterTypeSet>
        <xtce:ParameterSet>
            {HEADER_PARAMS}
            <xtce:Parameter name="STATE" parameterTypeRef="STATE"/>
        </xtce:ParameterSet>
        <xtce:ContainerSet>
            <xtce:SequenceContainer name="CCSDSPacket">
                <xtce:EntryList>
                    {HEADER_ENTRIES}
                    <xtce:ParameterRefEntry parameterRef="STATE"/>
                </xtce:EntryList>
            </xtce:SequenceContainer>
        </xtce:ContainerSet>
        "#
    ));
    let definition = PacketDefinition::from_xtce_str(&doc).unwrap();

    let mut dat = ccsds_packet(1, &[1]);
    dat.extend(ccsds_packet(1, &[9]));
    let packets: Vec<_> = decode_packets(&definition, &dat[..]).map(Result::unwrap).collect();

    let known = packets[0].get("STATE").unwrap();
    assert_eq!(known.calibrated, Some(Value::Str("ON".into())));
    assert!(!known.unrecognized_enum);

    let unknown = packets[1].get("STATE").unwrap();
    assert_eq!(unknown.raw, Value::Uint(9));
    assert_eq!(unknown.calibrated, None);
    assert!(unknown.unrecognized_enum);
}

#[test]
fn container_ref_entry_inlines_shared_fragment() {
    // A shared secondary-header fragment pulled in by reference from two
    // concrete packets. The fragment's own base container is irrelevant at
    // the reference site.
    let doc = xtce_document(&format!(
        r#"
        <xtce:ParameterTypeSet>
            {HEADER_TYPES}
            <xtce:IntegerParameterType name="U8"><xtce:IntegerDataEncoding sizeInBits="8"/></xtce:IntegerParameterType>
            <xtce:IntegerParameterType name="U32"><xtce:IntegerDataEncoding sizeInBits="32"/></xtce:IntegerParameterType>
        </xtce:ParameterTypeSet>
        <xtce:ParameterSet>
            {HEADER_PARAMS}
            <xtce:Parameter name="SHCOARSE" parameterTypeRef="U32"/>
            <xtce:Parameter name="COUNT" parameterTypeRef="U8"/>
        </xtce:ParameterSet>
        <xtce:ContainerSet>
            <xtce:SequenceContainer name="SecondaryHeader" abstract="true">
                <xtce:EntryList>
                    <xtce:ParameterRefEntry parameterRef="SHCOARSE"/>
                </xtce:EntryList>
            </xtce:SequenceContainer>
            <xtce:SequenceContainer name="CCSDSPacket">
                <xtce:EntryList>
                    {HEADER_ENTRIES}
                    <xtce:ContainerRefEntry containerRef="SecondaryHeader"/>
                    <xtce:ParameterRefEntry parameterRef="COUNT"/>
                </xtce:EntryList>
            </xtce:SequenceContainer>
        </xtce:ContainerSet>
        "#
    ));
    let definition = PacketDefinition::from_xtce_str(&doc).unwrap();

    let packet_bytes = ccsds_packet(5, &[0x00, 0x00, 0x12, 0x34, 0x09]);
    let packets: Vec<_> = decode_packets(&definition, &packet_bytes[..])
        .map(Result::unwrap)
        .collect();
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].get("SHCOARSE").unwrap().raw, Value::Uint(0x1234));
    assert_eq!(packets[0].get("COUNT").unwrap().raw, Value::Uint(9));
    // Field order follows the entry list with the fragment inlined.
    let names: Vec<&str> = packets[0].user_data_fields().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["SHCOARSE", "COUNT"]);
}

#[test]
fn terminated_string_parameter() {
    let doc = xtce_document(&format!(
        r#"
        <xtce:ParameterTypeSet>
            {HEADER_TYPES}
            <xtce:StringParameterType name="MSG">
                <xtce:StringDataEncoding encoding="UTF-8">
                    <xtce:SizeInBits>
                        <xtce:Fixed><xtce:FixedValue>48</xtce:FixedValue></xtce:Fixed>
                        <xtce:TerminationChar>00</xtce:TerminationChar>
                    </xtce:SizeInBits>
                </xtce:StringDataEncoding>
            </xtce:StringParameterType>
        </xtce:ParameterTypeSet>
        <xtce:ParameterSet>
            {HEADER_PARAMS}
            <xtce:Parameter name="MESSAGE" parameterTypeRef="MSG"/>
        </xtce:ParameterSet>
        <xtce:ContainerSet>
            <xtce:SequenceContainer name="CCSDSPacket">
                <xtce:EntryList>
                    {HEADER_ENTRIES}
                    <xtce:ParameterRefEntry parameterRef="MESSAGE"/>
                </xtce:EntryList>
            </xtce:SequenceContainer>
        </xtce:ContainerSet>
        "#
    ));
    let definition = PacketDefinition::from_xtce_str(&doc).unwrap();

    let packet_bytes = ccsds_packet(5, b"abc\0xx");
    let packets: Vec<_> = decode_packets(&definition, &packet_bytes[..])
        .map(Result::unwrap)
        .collect();
    let message = packets[0].get("MESSAGE").unwrap();
    assert_eq!(message.calibrated, Some(Value::Str("abc".into())));
    // The raw buffer keeps the full fixed-length field.
    assert_eq!(message.raw, Value::Bytes(b"abc\0xx".to_vec()));
}

#[test]
fn output_invariant_under_source_chunking() {
    let definition = two_apid_definition();
    let mut dat = ccsds_packet(1424, &[0x10]);
    dat.extend(ccsds_packet(1425, &[0x20]));
    dat.extend(ccsds_packet(1424, &[0x30]));

    let from_slice: Vec<_> = decode_packets(&definition, &dat[..]).map(Result::unwrap).collect();
    let from_one_byte_reads: Vec<_> = decode_packets(&definition, OneByteReader::new(&dat))
        .map(Result::unwrap)
        .collect();

    assert_eq!(from_slice.len(), 3);
    assert_eq!(from_slice.len(), from_one_byte_reads.len());
    for (a, b) in from_slice.iter().zip(&from_one_byte_reads) {
        assert_eq!(a.header, b.header);
        assert_eq!(a.data, b.data);
        let fields_a: Vec<_> = a.fields.iter().collect();
        let fields_b: Vec<_> = b.fields.iter().collect();
        assert_eq!(fields_a, fields_b);
    }
}

#[test]
fn byte_accounting_with_unrecognized_and_fragment() {
    let definition = two_apid_definition();
    let mut dat = ccsds_packet(1424, &[0x10, 0x11]);
    dat.extend(ccsds_packet(999, &[0x20])); // unrecognized
    dat.extend(ccsds_packet(1425, &[0x30]));
    let framed_total = dat.len();
    dat.extend([0xde, 0xad, 0xbe]); // trailing fragment < 6 bytes

    let options = StreamOptions {
        yield_unrecognized_errors: true,
        ..StreamOptions::default()
    };
    let mut consumed = 0;
    for item in decode_packets_with(&definition, &dat[..], options) {
        match item {
            Ok(packet) => consumed += packet.data.len(),
            Err(Error::Unrecognized(details)) => consumed += details.header.packet_len(),
            Err(err) => panic!("unexpected error {err}"),
        }
    }
    assert_eq!(consumed, framed_total);
}

#[test]
fn headers_only_stream() {
    // No definition semantics needed; any definition will do.
    let definition = two_apid_definition();
    let dat = ccsds_packet(2000, &[1, 2, 3]); // APID unknown to the definition

    let options = StreamOptions {
        parse_headers_only: true,
        ..StreamOptions::default()
    };
    let packets: Vec<_> = decode_packets_with(&definition, &dat[..], options)
        .map(Result::unwrap)
        .collect();
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].get("PKT_APID").unwrap().raw, Value::Uint(2000));
    assert_eq!(packets[0].get("PKT_LEN").unwrap().raw, Value::Uint(2));
    assert_eq!(packets[0].fields.len(), 7);
    assert_eq!(packets[0].trailing_bits, 24);
}

#[test]
fn header_name_map_renames_output_fields() {
    let definition = two_apid_definition();
    let dat = ccsds_packet(1424, &[0xaa]);

    let options = StreamOptions {
        header_names: HashMap::from([
            ("PKT_APID".to_string(), "apid".to_string()),
            ("SRC_SEQ_CTR".to_string(), "seq".to_string()),
        ]),
        ..StreamOptions::default()
    };
    let packets: Vec<_> = decode_packets_with(&definition, &dat[..], options)
        .map(Result::unwrap)
        .collect();
    assert_eq!(packets[0].get("apid").unwrap().raw, Value::Uint(1424));
    assert_eq!(packets[0].get("seq").unwrap().raw, Value::Uint(0));
    // Lookups through the original name still work.
    assert_eq!(packets[0].get("PKT_APID").unwrap().raw, Value::Uint(1424));
}

#[test]
fn root_container_override() {
    // Definition whose conventional root is absent; the stream selects
    // the actual root by name.
    let doc = xtce_document(&format!(
        r#"
        <xtce:ParameterTypeSet>
            {HEADER_TYPES}
        </xtce:ParameterTypeSet>
        <xtce:ParameterSet>
            {HEADER_PARAMS}
        </xtce:ParameterSet>
        <xtce:ContainerSet>
            <xtce:SequenceContainer name="RootPacket">
                <xtce:EntryList>
                    {HEADER_ENTRIES}
                </xtce:EntryList>
            </xtce:SequenceContainer>
        </xtce:ContainerSet>
        "#
    ));
    let definition = PacketDefinition::from_xtce_str(&doc).unwrap();
    let dat = ccsds_packet(7, &[0x55]);

    let options = StreamOptions {
        root_container: Some("RootPacket".to_string()),
        ..StreamOptions::default()
    };
    let packets: Vec<_> = decode_packets_with(&definition, &dat[..], options)
        .map(Result::unwrap)
        .collect();
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].get("PKT_APID").unwrap().raw, Value::Uint(7));
    // One byte of user data the root never declared.
    assert_eq!(packets[0].trailing_bits, 8);
}

#[test]
fn progress_callback_and_summary() {
    let definition = two_apid_definition();
    let mut dat = ccsds_packet(1424, &[0x10]);
    dat.extend(ccsds_packet(999, &[0x20]));
    dat.extend(ccsds_packet(1425, &[0x30]));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut summary = Summary::default();
    let stream = decode_packets(&definition, &dat[..])
        .with_progress(move |progress| sink.lock().unwrap().push(progress));
    for packet in stream {
        summary.add(&packet.unwrap().header);
    }

    let seen = seen.lock().unwrap();
    // One callback per framed packet, recognized or not.
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[2].packets, 3);
    assert_eq!(seen[2].unrecognized, 1);
    assert_eq!(seen[2].bytes, dat.len());

    // Only recognized packets reached the summary.
    assert_eq!(summary.count, 2);
    assert_eq!(summary.apids.len(), 2);
}

#[test]
fn file_source_roundtrip() {
    let definition = single_packet_definition();
    let dat: &[u8] = &[
        0x08, 0x64, 0xc0, 0x00, 0x00, 0x07, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
    ];

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(dat).unwrap();
    file.write_all(dat).unwrap();
    file.flush().unwrap();

    let reader = std::io::BufReader::new(std::fs::File::open(file.path()).unwrap());
    let packets: Vec<_> = decode_packets(&definition, reader).map(Result::unwrap).collect();
    assert_eq!(packets.len(), 2);
    assert_eq!(packets[0].get("PKT_APID").unwrap().raw, Value::Uint(100));
    assert_eq!(packets[1].get("PAYLOAD").unwrap().raw, Value::Bytes(vec![1, 2, 3, 4, 5, 6, 7, 8]));
}

#[test]
fn definition_is_shareable_across_threads() {
    let definition = Arc::new(two_apid_definition());
    let dat = ccsds_packet(1424, &[0x42]);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let definition = Arc::clone(&definition);
            let dat = dat.clone();
            std::thread::spawn(move || {
                let packets: Vec<_> = decode_packets(&definition, &dat[..])
                    .map(Result::unwrap)
                    .collect();
                assert_eq!(packets[0].get("FIELD_A").unwrap().raw, Value::Uint(0x42));
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}
