//! 通讯录条目的编解码演示。
//!
//! 运行：`RUST_LOG=spark_codec_pb=trace cargo run --example person`，可观察未知字段跳过、
//! 子消息进入与回调调用等日志。

use spark_codec_pb::{
    Callbacks, CodecError, ContentKind, DecodeContext, FieldCallback, FieldDescriptor,
    InputStream, OutputStream, RecordMut, RecordRef, encode, validate_table,
};
use tracing_subscriber::EnvFilter;

static PHONE: [FieldDescriptor; 1] = [FieldDescriptor::required(1, ContentKind::String, 0, 16)];

static PERSON: [FieldDescriptor; 4] = [
    FieldDescriptor::required(1, ContentKind::Varint, 0, 4),
    FieldDescriptor::required(2, ContentKind::String, 4, 24),
    FieldDescriptor::repeated(3, ContentKind::Submessage, 32, -4, 16, 2).with_submessage(&PHONE),
    FieldDescriptor::callback(4, 64, 1),
];

const PERSON_LEN: usize = 65;

/// 把标签字段逐条打印出来，而不是存进记录。
struct PrintTags;

impl FieldCallback for PrintTags {
    fn decode(
        &mut self,
        stream: &mut InputStream<'_>,
        _field: &FieldDescriptor,
    ) -> Result<(), CodecError> {
        let mut text = vec![0u8; stream.bytes_left()];
        stream.read(&mut text)?;
        println!("tag: {}", String::from_utf8_lossy(&text));
        Ok(())
    }
}

fn main() -> Result<(), CodecError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    validate_table(&PERSON, PERSON_LEN)?;

    let mut record = [0u8; PERSON_LEN];
    let mut person = RecordMut::new(&mut record);
    person.set_uint(&PERSON[0], 7)?;
    person.set_text(&PERSON[1], b"Ada")?;
    person
        .element_submessage_mut(&PERSON[2], 0)?
        .set_text(&PHONE[0], b"555-0100")?;
    person.set_count(&PERSON[2], 1)?;

    let mut wire = [0u8; 64];
    let mut stream = OutputStream::from_slice(&mut wire);
    encode(&PERSON, &record, &mut stream)?;
    let written = stream.bytes_written();
    println!("encoded {written} bytes: {:02x?}", &wire[..written]);

    // 追加两个标签字段与一个未知字段，再交给带回调的解码器。
    let mut input = wire[..written].to_vec();
    input.extend_from_slice(&[0x22, 0x03, b'v', b'i', b'p']);
    input.extend_from_slice(&[0x22, 0x03, b'o', b'p', b's']);
    input.extend_from_slice(&[0x48, 0x01]);

    let mut decoded = [0u8; PERSON_LEN];
    RecordMut::new(&mut decoded).set_handle(&PERSON[3], Callbacks::handle_for(0))?;
    let mut printer = PrintTags;
    let mut slots: [&mut dyn FieldCallback; 1] = [&mut printer];
    let mut ctx = DecodeContext::new().with_callbacks(Callbacks::new(&mut slots));
    let mut stream = InputStream::from_slice(&input);
    ctx.decode(&PERSON, &mut stream, &mut decoded)?;

    let view = RecordRef::new(&decoded);
    let phone = view.element_submessage(&PERSON[2], 0)?;
    println!(
        "id={} name={} phone={}",
        view.uint(&PERSON[0])?,
        String::from_utf8_lossy(view.text(&PERSON[1])?),
        String::from_utf8_lossy(phone.text(&PHONE[0])?),
    );
    Ok(())
}
