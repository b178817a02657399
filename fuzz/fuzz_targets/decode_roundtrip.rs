#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use spark_codec_pb::{
    CodecConfig, ContentKind, DecodeContext, FieldDescriptor, InputStream, OutputStream, encode,
    encoded_len,
};

static LEAF: [FieldDescriptor; 3] = [
    FieldDescriptor::required(1, ContentKind::String, 0, 12),
    FieldDescriptor::optional(2, ContentKind::Fixed64, 13, -1, 8),
    FieldDescriptor::optional(3, ContentKind::Bytes, 22, -1, 10),
];

const LEAF_LEN: usize = 32;

static ROOT: [FieldDescriptor; 6] = [
    FieldDescriptor::required(1, ContentKind::Varint, 0, 8),
    FieldDescriptor::optional(2, ContentKind::SVarint, 9, -1, 4),
    FieldDescriptor::repeated(3, ContentKind::Varint, 17, -4, 2, 6),
    FieldDescriptor::repeated(4, ContentKind::Fixed32, 33, -4, 4, 3),
    FieldDescriptor::optional(5, ContentKind::Submessage, 46, -1, 32).with_submessage(&LEAF),
    FieldDescriptor::repeated(6, ContentKind::String, 82, -4, 8, 2),
];

const ROOT_LEN: usize = 98;

/// Fuzz 输入：一段任意字节与解码选项。
///
/// - **Why**：解码器直面不可信输入，任何 panic、越界或无限循环都是缺陷；
/// - **What**：解码成功的输入必须可以重新编码，且「再解码」得到同一份记录（编码输出是规范形式）。
#[derive(Debug, Arbitrary)]
struct DecodeCase {
    zero_tag_terminates: bool,
    init_defaults: bool,
    payload: Vec<u8>,
}

fuzz_target!(|case: DecodeCase| {
    let config = CodecConfig::DEFAULT
        .with_zero_tag_terminates(case.zero_tag_terminates)
        .with_init_defaults(case.init_defaults);
    let mut first = [0u8; ROOT_LEN];
    let mut ctx = DecodeContext::with_config(config);
    let mut input = InputStream::from_slice(&case.payload);
    if ctx.decode(&ROOT, &mut input, &mut first).is_err() {
        assert!(input.first_fault().is_some(), "失败必须记录首个故障");
        return;
    }

    let mut wire = [0u8; 512];
    let mut output = OutputStream::from_slice(&mut wire);
    encode(&ROOT, &first, &mut output).expect("解码成功的记录必须可编码");
    let written = output.bytes_written();
    assert_eq!(encoded_len(&ROOT, &first), Ok(written));

    let mut second = [0u8; ROOT_LEN];
    let mut ctx = DecodeContext::with_config(config);
    let mut input = InputStream::from_slice(&wire[..written]);
    ctx.decode(&ROOT, &mut input, &mut second)
        .expect("编码输出必须可解码");

    let mut again = [0u8; 512];
    let mut output = OutputStream::from_slice(&mut again);
    encode(&ROOT, &second, &mut output).expect("再编码");
    assert_eq!(&again[..output.bytes_written()], &wire[..written]);
});
