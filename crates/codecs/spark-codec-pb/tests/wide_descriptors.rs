//! 宽描述符档位测试
//!
//! - **核心目标 (Why)**：16/32 位档位只改变描述符能表达的范围，线上字节必须与 8 位档完全一致；
//!   字段编号、存储偏移与数组容量超过 255 时仍要按标准 protobuf 格式编解码。
//! - **运行方式**：`cargo test --features descriptor-16bit` 或 `--features descriptor-32bit`。

#![cfg(any(feature = "descriptor-16bit", feature = "descriptor-32bit"))]

use spark_codec_pb::{
    CodecError, ContentKind, DescriptorProfile, FieldDescriptor, InputStream, OutputStream,
    RecordMut, RecordRef, decode, encode, encoded_len, largest_value, validate_table,
};

/// `{ required varint 300, optional fixed32 2, repeated varint 3 [max 300, 1 字节] }`。
///
/// | 范围 | 内容 |
/// |------|------|
/// | 0..4 | 字段 300 |
/// | 300 | 字段 2 存在标记 |
/// | 301..305 | 字段 2 |
/// | 305..309 | 字段 3 计数 |
/// | 309..609 | 字段 3 元素 |
static LEDGER: [FieldDescriptor; 3] = [
    FieldDescriptor::required(300, ContentKind::Varint, 0, 4),
    FieldDescriptor::optional(2, ContentKind::Fixed32, 301, -1, 4),
    FieldDescriptor::repeated(3, ContentKind::Varint, 309, -4, 1, 300),
];

const LEDGER_LEN: usize = 609;

fn hex_bytes(text: &str) -> Vec<u8> {
    hex::decode(text.replace(' ', "")).expect("测试夹具必须是合法十六进制")
}

fn ledger_record() -> Vec<u8> {
    let mut record = vec![0u8; LEDGER_LEN];
    let mut view = RecordMut::new(&mut record);
    view.set_uint(&LEDGER[0], 150).expect("字段 300");
    view.set_uint(&LEDGER[1], 0x0102_0304).expect("字段 2");
    view.set_has(&LEDGER[1], true).expect("字段 2 存在");
    for _ in 0..300 {
        view.push_uint(&LEDGER[2], 1).expect("容量之内");
    }
    record
}

fn ledger_wire() -> Vec<u8> {
    let mut wire = hex_bytes("E0 12 96 01 15 04 03 02 01 1A AC 02");
    wire.extend(std::iter::repeat_n(0x01, 300));
    wire
}

#[test]
fn wide_table_validates_and_needs_a_wider_profile() {
    validate_table(&LEDGER, LEDGER_LEN).expect("布局自洽");
    assert_eq!(largest_value(&LEDGER), 309);
    assert_eq!(
        DescriptorProfile::fitting(largest_value(&LEDGER)),
        DescriptorProfile::Medium
    );
    assert!(DescriptorProfile::ACTIVE >= DescriptorProfile::Medium);
}

#[test]
fn large_tags_and_offsets_encode_in_standard_form() {
    let record = ledger_record();
    let mut out = vec![0u8; 400];
    let mut stream = OutputStream::from_slice(&mut out);
    encode(&LEDGER, &record, &mut stream).expect("缓冲充足");
    let written = stream.bytes_written();
    assert_eq!(&out[..written], ledger_wire().as_slice());
    assert_eq!(encoded_len(&LEDGER, &record), Ok(written));
}

#[test]
fn large_tags_and_offsets_decode_into_record() {
    let wire = ledger_wire();
    let mut record = vec![0u8; LEDGER_LEN];
    let mut stream = InputStream::from_slice(&wire);
    decode(&LEDGER, &mut stream, &mut record).expect("合法输入");

    let view = RecordRef::new(&record);
    assert_eq!(view.uint(&LEDGER[0]), Ok(150));
    assert_eq!(view.has(&LEDGER[1]), Ok(true));
    assert_eq!(view.uint(&LEDGER[1]), Ok(0x0102_0304));
    assert_eq!(view.count(&LEDGER[2]), Ok(300));
    assert_eq!(view.element_uint(&LEDGER[2], 299), Ok(1));
    assert_eq!(record, ledger_record());
}

#[test]
fn capacity_above_255_still_rejects_overflow() {
    let mut wire = hex_bytes("E0 12 01 1A AD 02");
    wire.extend(std::iter::repeat_n(0x01, 301));
    let mut record = vec![0u8; LEDGER_LEN];
    let mut stream = InputStream::from_slice(&wire);
    let err = decode(&LEDGER, &mut stream, &mut record).expect_err("第 301 个元素溢出");
    assert_eq!(err, CodecError::ArrayFull { tag: 3 });
    assert_eq!(RecordRef::new(&record).count(&LEDGER[2]), Ok(300));
}

#[cfg(all(feature = "descriptor-16bit", not(feature = "descriptor-32bit")))]
#[test]
fn medium_profile_is_active() {
    assert_eq!(DescriptorProfile::ACTIVE, DescriptorProfile::Medium);
    assert_eq!(DescriptorProfile::ACTIVE.max_word(), u32::from(u16::MAX));
}

#[cfg(feature = "descriptor-32bit")]
mod wide {
    use super::*;

    /// 编号与偏移都超出 16 位的单字段表。
    static FAR: [FieldDescriptor; 1] = [FieldDescriptor::required(70_000, ContentKind::Varint, 70_000, 1)];

    const FAR_LEN: usize = 70_001;

    #[test]
    fn wide_profile_is_active() {
        assert_eq!(DescriptorProfile::ACTIVE, DescriptorProfile::Wide);
        assert_eq!(
            DescriptorProfile::fitting(largest_value(&FAR)),
            DescriptorProfile::Wide
        );
    }

    #[test]
    fn tags_beyond_sixteen_bits_round_trip() {
        let mut record = vec![0u8; FAR_LEN];
        validate_table(&FAR, FAR_LEN).expect("布局自洽");
        RecordMut::new(&mut record)
            .set_uint(&FAR[0], 1)
            .expect("字段 70000");

        let mut out = [0u8; 8];
        let mut stream = OutputStream::from_slice(&mut out);
        encode(&FAR, &record, &mut stream).expect("缓冲充足");
        let written = stream.bytes_written();
        assert_eq!(&out[..written], hex_bytes("80 97 22 01").as_slice());

        let mut decoded = vec![0u8; FAR_LEN];
        let mut input = InputStream::from_slice(&out[..written]);
        decode(&FAR, &mut input, &mut decoded).expect("合法输入");
        assert_eq!(RecordRef::new(&decoded).uint(&FAR[0]), Ok(1));
    }
}
