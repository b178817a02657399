//! 解码契约测试
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：以线格式字节为输入，逐条钉住解码引擎对外承诺的行为：必填校验、容量上限、
//!   未知字段容忍、packed 与逐元素等价、子消息边界、回调调用次数、嵌套深度限制与默认值套用。
//! - **合同 (What)**：所有用例只通过公开 API 观察结果（记录视图、返回的错误与流的首个故障）。
//! - **注意事项 (Trade-offs)**：输入以十六进制书写，便于与抓包或其他实现的输出直接比对。

mod support;

use core::num::NonZeroU16;

use bytes::Bytes;
use spark_codec_pb::stream::{BufSource, IoSource};
use spark_codec_pb::{
    Callbacks, CodecConfig, CodecError, DecodeContext, FieldCallback, FieldDescriptor,
    InputStream, RecordMut, RecordRef, codes, decode, decode_delimited, decode_with_defaults,
    set_to_defaults, validate_table,
};
use support::{
    ARCHIVE, ARCHIVE_LEN, Collector, NODE, NODE_LEN, PERSON, PERSON_LEN, PHONE, PHONE_LEN, SCENARIO, SCENARIO_LEN,
    nested_nodes, person_field,
};

fn hex_input(text: &str) -> Vec<u8> {
    hex::decode(text.replace(' ', "")).expect("测试夹具必须是合法十六进制")
}

fn decode_scenario(input: &[u8]) -> Result<[u8; SCENARIO_LEN], CodecError> {
    let mut record = [0u8; SCENARIO_LEN];
    let mut stream = InputStream::from_slice(input);
    decode(&SCENARIO, &mut stream, &mut record)?;
    Ok(record)
}

fn scenario_values(record: &[u8]) -> Vec<u64> {
    let view = RecordRef::new(record);
    let count = view.count(&SCENARIO[2]).expect("计数可读");
    (0..count)
        .map(|index| view.element_uint(&SCENARIO[2], index).expect("元素可读"))
        .collect()
}

#[test]
fn shared_tables_match_their_layouts() {
    validate_table(&SCENARIO, SCENARIO_LEN).expect("SCENARIO");
    validate_table(&PHONE, PHONE_LEN).expect("PHONE");
    validate_table(&PERSON, PERSON_LEN).expect("PERSON");
    validate_table(&NODE, NODE_LEN).expect("NODE");
    validate_table(&ARCHIVE, ARCHIVE_LEN).expect("ARCHIVE");
    assert_eq!(
        validate_table(&PERSON, PERSON_LEN - 1),
        Err(CodecError::InvalidDescriptor {
            tag: 7,
            reason: "storage exceeds record"
        })
    );
}

#[test]
fn scenario_message_decodes_into_record() {
    let record = decode_scenario(&hex_input("08 2A 1A 03 01 02 03")).expect("合法输入");
    let view = RecordRef::new(&record);
    assert_eq!(view.uint(&SCENARIO[0]), Ok(42));
    assert_eq!(view.has(&SCENARIO[1]), Ok(false));
    assert_eq!(scenario_values(&record), vec![1, 2, 3]);
}

#[test]
fn packed_and_unpacked_forms_are_equivalent() {
    let packed = decode_scenario(&hex_input("08 01 1A 03 01 02 03")).expect("packed 输入");
    let unpacked = decode_scenario(&hex_input("08 01 18 01 18 02 18 03")).expect("逐元素输入");
    assert_eq!(packed, unpacked);
}

#[test]
fn packed_and_unpacked_occurrences_accumulate() {
    let record = decode_scenario(&hex_input("08 01 18 07 1A 02 08 09")).expect("混合形式");
    assert_eq!(scenario_values(&record), vec![7, 8, 9]);
}

#[test]
fn missing_required_field_is_reported() {
    let input = hex_input("1A 01 05");
    let mut record = [0u8; SCENARIO_LEN];
    let mut stream = InputStream::from_slice(&input);
    let err = decode(&SCENARIO, &mut stream, &mut record).expect_err("缺少字段 1");
    assert_eq!(err, CodecError::MissingRequiredField { tag: 1 });
    assert_eq!(err.code(), codes::MISSING_REQUIRED);
    assert_eq!(stream.first_fault(), Some(err));
}

#[test]
fn repeated_overflow_keeps_stored_prefix() {
    let input = hex_input("08 01 18 01 18 02 18 03 18 04 18 05");
    let mut record = [0u8; SCENARIO_LEN];
    let mut stream = InputStream::from_slice(&input);
    let err = decode(&SCENARIO, &mut stream, &mut record).expect_err("第 5 个元素溢出");
    assert_eq!(err, CodecError::ArrayFull { tag: 3 });
    assert_eq!(scenario_values(&record), vec![1, 2, 3, 4]);
}

#[test]
fn packed_overflow_reports_array_full() {
    let input = hex_input("08 01 1A 05 01 02 03 04 05");
    let mut record = [0u8; SCENARIO_LEN];
    let mut stream = InputStream::from_slice(&input);
    let err = decode(&SCENARIO, &mut stream, &mut record).expect_err("packed 溢出");
    assert_eq!(err, CodecError::ArrayFull { tag: 3 });
    assert_eq!(scenario_values(&record), vec![1, 2, 3, 4], "溢出前的元素必须保留");
}

#[test]
fn unknown_fields_of_every_wire_type_are_skipped() {
    let input = hex_input(
        "08 07 \
         21 01 02 03 04 05 06 07 08 \
         2A 02 AA BB \
         35 01 02 03 04 \
         40 96 01",
    );
    let record = decode_scenario(&input).expect("未知字段应被跳过");
    assert_eq!(RecordRef::new(&record).uint(&SCENARIO[0]), Ok(7));
}

#[test]
fn duplicate_scalar_keeps_last_occurrence() {
    let record = decode_scenario(&hex_input("08 01 15 01 00 00 00 08 02")).expect("重复出现");
    let view = RecordRef::new(&record);
    assert_eq!(view.uint(&SCENARIO[0]), Ok(2));
    assert_eq!(view.has(&SCENARIO[1]), Ok(true));
    assert_eq!(view.uint(&SCENARIO[1]), Ok(1));
}

#[test]
fn wire_type_mismatch_is_rejected() {
    let err = decode_scenario(&hex_input("0D 01 00 00 00")).expect_err("字段 1 不是 fixed32");
    assert_eq!(err, CodecError::WireTypeMismatch { tag: 1 });
    assert_eq!(err.code(), codes::WIRE_TYPE);
}

#[test]
fn unsupported_wire_type_is_rejected() {
    let err = decode_scenario(&hex_input("0B")).expect_err("wire type 3 不受支持");
    assert_eq!(err, CodecError::InvalidWireType { wire_type: 3 });
}

#[test]
fn overlong_varint_is_malformed() {
    let input = hex_input("08 FF FF FF FF FF FF FF FF FF FF 01");
    let mut record = [0u8; SCENARIO_LEN];
    let mut stream = InputStream::from_slice(&input);
    let err = decode(&SCENARIO, &mut stream, &mut record).expect_err("超过 10 字节");
    assert_eq!(err, CodecError::MalformedVarint);
    assert!(err.is_malformed_input());
    assert_eq!(stream.first_fault(), Some(CodecError::MalformedVarint));
}

#[test]
fn truncated_input_reports_end_of_stream() {
    assert_eq!(decode_scenario(&hex_input("08")), Err(CodecError::EndOfStream));
    assert_eq!(
        decode_scenario(&hex_input("08 01 1A 05 01")),
        Err(CodecError::EndOfStream),
        "长度前缀超过剩余输入"
    );
}

#[test]
fn zero_key_terminates_message_by_default() {
    let record = decode_scenario(&hex_input("08 05 00 18 01")).expect("零键视为结束");
    assert_eq!(RecordRef::new(&record).uint(&SCENARIO[0]), Ok(5));
    assert!(scenario_values(&record).is_empty());
}

#[test]
fn zero_key_is_invalid_when_termination_is_disabled() {
    let input = hex_input("08 05 00 18 01");
    let mut record = [0u8; SCENARIO_LEN];
    let mut stream = InputStream::from_slice(&input);
    let mut ctx = DecodeContext::with_config(CodecConfig::DEFAULT.with_zero_tag_terminates(false));
    let err = ctx
        .decode(&SCENARIO, &mut stream, &mut record)
        .expect_err("零键不再终止");
    assert_eq!(err, CodecError::InvalidTag);
}

fn person_prefix() -> Vec<u8> {
    // id = 1, name = "A"
    hex_input("08 01 12 01 41")
}

#[test]
fn nested_messages_land_in_element_slots() {
    let mut input = person_prefix();
    input.extend(hex_input("22 05 0A 03 35 35 35 22 07 0A 03 36 36 36 10 02"));
    let mut record = [0u8; PERSON_LEN];
    let mut stream = InputStream::from_slice(&input);
    decode(&PERSON, &mut stream, &mut record).expect("合法嵌套输入");

    let view = RecordRef::new(&record);
    let phones = person_field(4);
    assert_eq!(view.count(phones), Ok(2));
    let first = view.element_submessage(phones, 0).expect("第一个号码");
    assert_eq!(first.text(&PHONE[0]), Ok(&b"555"[..]));
    assert_eq!(first.has(&PHONE[1]), Ok(false));
    let second = view.element_submessage(phones, 1).expect("第二个号码");
    assert_eq!(second.text(&PHONE[0]), Ok(&b"666"[..]));
    assert_eq!(second.uint(&PHONE[1]), Ok(2));
}

#[test]
fn submessage_with_unconsumed_bytes_is_truncated() {
    let mut input = person_prefix();
    input.extend(hex_input("22 05 0A 01 31 00 00"));
    let mut record = [0u8; PERSON_LEN];
    let mut stream = InputStream::from_slice(&input);
    let err = decode(&PERSON, &mut stream, &mut record).expect_err("子消息提前结束");
    assert_eq!(err, CodecError::TruncatedSubmessage { tag: 4 });
}

#[test]
fn missing_required_in_submessage_propagates() {
    let mut input = person_prefix();
    input.extend(hex_input("22 02 10 01"));
    let mut record = [0u8; PERSON_LEN];
    let mut stream = InputStream::from_slice(&input);
    let err = decode(&PERSON, &mut stream, &mut record).expect_err("号码缺失");
    assert_eq!(err, CodecError::MissingRequiredField { tag: 1 });
}

#[test]
fn oversized_text_overflows_container() {
    let input = hex_input("08 01 12 10 41 41 41 41 41 41 41 41 41 41 41 41 41 41 41 41");
    let mut record = [0u8; PERSON_LEN];
    let mut stream = InputStream::from_slice(&input);
    let err = decode(&PERSON, &mut stream, &mut record).expect_err("16 字节放不进 15 字节容量");
    assert_eq!(err, CodecError::FieldOverflow { tag: 2 });
}

#[test]
fn signed_and_bytes_fields_decode() {
    let mut input = person_prefix();
    input.extend(hex_input("2A 03 01 80 01 32 03 DE AD 01"));
    let mut record = [0u8; PERSON_LEN];
    let mut stream = InputStream::from_slice(&input);
    decode(&PERSON, &mut stream, &mut record).expect("合法输入");

    let view = RecordRef::new(&record);
    let scores = person_field(5);
    assert_eq!(view.count(scores), Ok(2));
    assert_eq!(view.element_int(scores, 0), Ok(-1));
    assert_eq!(view.element_int(scores, 1), Ok(64));
    assert_eq!(view.bytes(person_field(6)), Ok(&[0xDE, 0xAD, 0x01][..]));
}

#[test]
fn callback_is_invoked_per_occurrence() {
    let mut input = person_prefix();
    input.extend(hex_input("3A 02 68 69 3A 00"));
    let mut record = [0u8; PERSON_LEN];
    let mut notes = Collector::default();
    {
        let mut slots: [&mut dyn FieldCallback; 1] = [&mut notes];
        let handle = Callbacks::handle_for(0);
        RecordMut::new(&mut record)
            .set_handle(person_field(7), handle)
            .expect("句柄可写");
        let mut ctx = DecodeContext::new().with_callbacks(Callbacks::new(&mut slots));
        let mut stream = InputStream::from_slice(&input);
        ctx.decode(&PERSON, &mut stream, &mut record)
            .expect("回调字段合法");
    }
    assert_eq!(notes.invocations, 2);
    assert_eq!(notes.received, vec![b"hi".to_vec(), Vec::new()]);
}

#[test]
fn unbound_callback_field_is_skipped() {
    let mut input = person_prefix();
    input.extend(hex_input("3A 02 68 69"));
    let mut record = [0u8; PERSON_LEN];
    let mut stream = InputStream::from_slice(&input);
    decode(&PERSON, &mut stream, &mut record).expect("句柄 0 表示跳过");
    assert_eq!(stream.bytes_left(), 0);
}

#[test]
fn out_of_range_handle_is_an_error() {
    let mut input = person_prefix();
    input.extend(hex_input("3A 00"));
    let mut record = [0u8; PERSON_LEN];
    RecordMut::new(&mut record)
        .set_handle(person_field(7), 2)
        .expect("句柄可写");
    let mut stream = InputStream::from_slice(&input);
    let err = decode(&PERSON, &mut stream, &mut record).expect_err("回调表为空");
    assert_eq!(err, CodecError::UnboundCallback { tag: 7, handle: 2 });
    assert_eq!(err.code(), codes::CALLBACK);
}

struct Stalled;

impl FieldCallback for Stalled {
    fn decode(
        &mut self,
        _stream: &mut InputStream<'_>,
        _field: &FieldDescriptor,
    ) -> Result<(), CodecError> {
        Ok(())
    }
}

#[test]
fn callback_without_progress_fails() {
    let mut input = person_prefix();
    input.extend(hex_input("3A 02 68 69"));
    let mut record = [0u8; PERSON_LEN];
    RecordMut::new(&mut record)
        .set_handle(person_field(7), 1)
        .expect("句柄可写");
    let mut stalled = Stalled;
    let mut slots: [&mut dyn FieldCallback; 1] = [&mut stalled];
    let mut ctx = DecodeContext::new().with_callbacks(Callbacks::new(&mut slots));
    let mut stream = InputStream::from_slice(&input);
    let err = ctx
        .decode(&PERSON, &mut stream, &mut record)
        .expect_err("回调未消费载荷");
    assert_eq!(err, CodecError::CallbackFailed { tag: 7 });
}

#[test]
fn nesting_up_to_the_limit_is_accepted() {
    let input = nested_nodes(32);
    let mut record = [0u8; NODE_LEN];
    let mut stream = InputStream::from_slice(&input);
    decode(&NODE, &mut stream, &mut record).expect("恰好 32 层");
}

#[test]
fn nesting_beyond_the_limit_is_rejected() {
    let input = nested_nodes(33);
    let mut record = [0u8; NODE_LEN];
    let mut stream = InputStream::from_slice(&input);
    let err = decode(&NODE, &mut stream, &mut record).expect_err("第 33 层超限");
    assert_eq!(err, CodecError::RecursionLimit { depth: 32 });

    let shallow = CodecConfig::DEFAULT
        .with_max_recursion_depth(NonZeroU16::new(2).expect("非零"));
    let mut ctx = DecodeContext::with_config(shallow);
    let input = nested_nodes(3);
    let mut stream = InputStream::from_slice(&input);
    let err = ctx
        .decode(&NODE, &mut stream, &mut record)
        .expect_err("自定义上限");
    assert_eq!(err, CodecError::RecursionLimit { depth: 2 });
    assert_eq!(ctx.current_depth(), 0, "失败后层级必须回退");
}

#[test]
fn defaults_are_applied_before_decoding() {
    let input = hex_input("0A 03 35 35 35");
    let mut record = [0xEEu8; PHONE_LEN];
    let mut stream = InputStream::from_slice(&input);
    decode_with_defaults(&PHONE, &mut stream, &mut record).expect("合法输入");
    let view = RecordRef::new(&record);
    assert_eq!(view.text(&PHONE[0]), Ok(&b"555"[..]));
    assert_eq!(view.has(&PHONE[1]), Ok(false));
    assert_eq!(view.uint(&PHONE[1]), Ok(1));
}

#[test]
fn set_to_defaults_resets_nested_state() {
    let mut record = [0xEEu8; PERSON_LEN];
    RecordMut::new(&mut record)
        .set_handle(person_field(7), 1)
        .expect("句柄可写");
    set_to_defaults(&PERSON, &mut record).expect("表合法");
    let view = RecordRef::new(&record);
    assert_eq!(view.uint(person_field(1)), Ok(0));
    assert_eq!(view.text(person_field(2)), Ok(&b""[..]));
    assert_eq!(view.has(person_field(3)), Ok(false));
    assert_eq!(view.count(person_field(4)), Ok(0));
    assert_eq!(view.count(person_field(5)), Ok(0));
    assert_eq!(view.handle(person_field(7)), Ok(1), "回调句柄保持不变");
    assert_eq!(view.has(person_field(6)), Ok(false));
}

#[test]
fn defaults_terminate_on_self_referencing_table() {
    let mut record = [0xEEu8; NODE_LEN];
    set_to_defaults(&NODE, &mut record).expect("自引用表也必须终止");
    let view = RecordRef::new(&record);
    assert_eq!(view.uint(&NODE[0]), Ok(0));
    assert_eq!(view.has(&NODE[1]), Ok(false));

    let input = nested_nodes(1);
    let mut record = [0u8; NODE_LEN];
    let mut stream = InputStream::from_slice(&input);
    decode_with_defaults(&NODE, &mut stream, &mut record).expect("一层嵌套");
    let view = RecordRef::new(&record);
    assert_eq!(view.uint(&NODE[0]), Ok(1));
    assert_eq!(view.has(&NODE[1]), Ok(true));

    let input = nested_nodes(32);
    let mut stream = InputStream::from_slice(&input);
    decode_with_defaults(&NODE, &mut stream, &mut record).expect("默认值不额外消耗层级");
}

#[test]
fn delimited_message_stops_at_its_prefix() {
    let input = hex_input("07 08 2A 1A 03 01 02 03 FF");
    let mut record = [0u8; SCENARIO_LEN];
    let mut stream = InputStream::from_slice(&input);
    decode_delimited(&SCENARIO, &mut stream, &mut record).expect("合法前缀");
    assert_eq!(stream.bytes_left(), 1);
    assert_eq!(scenario_values(&record), vec![1, 2, 3]);
}

#[test]
fn pull_sources_feed_the_engine() {
    let wire = hex_input("08 2A 1A 03 01 02 03");

    let mut source = BufSource::new(Bytes::from(wire.clone()));
    let mut record = [0u8; SCENARIO_LEN];
    let mut stream = InputStream::from_source(&mut source, wire.len());
    decode(&SCENARIO, &mut stream, &mut record).expect("Buf 源");
    assert_eq!(scenario_values(&record), vec![1, 2, 3]);

    let mut source = IoSource::new(std::io::Cursor::new(wire));
    let mut record = [0u8; SCENARIO_LEN];
    let mut stream = InputStream::from_source_unbounded(&mut source);
    decode(&SCENARIO, &mut stream, &mut record).expect("读到源耗尽为止");
    assert_eq!(RecordRef::new(&record).uint(&SCENARIO[0]), Ok(42));
}
