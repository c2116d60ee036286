use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use filbank_types::HeaderValue;

/// Пишет ключевое слово / строку с префиксом длины.
pub fn write_keyword<W: Write>(
    w: &mut W,
    s: &str,
) -> std::io::Result<()> {
    w.write_u32::<LittleEndian>(s.len() as u32)?;
    w.write_all(s.as_bytes())
}

/// Пишет значение заголовка в sigproc кодировке. `Opaque` не пишется.
pub fn write_value<W: Write>(
    w: &mut W,
    value: &HeaderValue,
) -> std::io::Result<()> {
    match value {
        HeaderValue::Int(v) => w.write_i32::<LittleEndian>(*v),
        HeaderValue::Double(v) => w.write_f64::<LittleEndian>(*v),
        HeaderValue::Angle(a) => w.write_f64::<LittleEndian>(a.0),
        HeaderValue::Str(s) => write_keyword(w, s),
        HeaderValue::Byte(b) => w.write_u8(*b),
        HeaderValue::Opaque(_) => Ok(()),
    }
}
