use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};
use filbank_types::{Angle, FilbankError, FilbankResult, HeaderKind, HeaderValue};

/// Максимальная длина ключевого слова sigproc
pub const MAX_KEYWORD_LEN: usize = 80;

/// Максимальная длина строкового значения
pub const MAX_STRING_LEN: usize = 4096;

/// Читает ключевое слово с префиксом длины (`u32` LE + ASCII байты).
pub fn read_keyword<R: Read>(r: &mut R) -> FilbankResult<String> {
    let len = r.read_u32::<LittleEndian>().map_err(eof_as_malformed)? as usize;

    if len == 0 || len > MAX_KEYWORD_LEN {
        return Err(FilbankError::malformed(format!(
            "implausible keyword length {len}"
        )));
    }

    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).map_err(eof_as_malformed)?;

    if !buf.is_ascii() {
        return Err(FilbankError::malformed("non-ASCII keyword"));
    }

    // ASCII всегда валидный UTF-8
    Ok(buf.into_iter().map(char::from).collect())
}

/// Читает строковое значение с префиксом длины.
pub fn read_string<R: Read>(r: &mut R) -> FilbankResult<String> {
    let len = r.read_u32::<LittleEndian>().map_err(eof_as_malformed)? as usize;

    if len > MAX_STRING_LEN {
        return Err(FilbankError::malformed(format!(
            "implausible string length {len}"
        )));
    }

    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).map_err(eof_as_malformed)?;

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Читает значение заданного типа.
pub fn read_value<R: Read>(
    r: &mut R,
    kind: HeaderKind,
) -> FilbankResult<HeaderValue> {
    let value = match kind {
        HeaderKind::Int => HeaderValue::Int(r.read_i32::<LittleEndian>().map_err(eof_as_malformed)?),
        HeaderKind::Double => {
            HeaderValue::Double(r.read_f64::<LittleEndian>().map_err(eof_as_malformed)?)
        }
        HeaderKind::Angle => {
            HeaderValue::Angle(Angle(r.read_f64::<LittleEndian>().map_err(eof_as_malformed)?))
        }
        HeaderKind::Str => HeaderValue::Str(read_string(r)?),
        HeaderKind::Byte => HeaderValue::Byte(r.read_u8().map_err(eof_as_malformed)?),
    };

    Ok(value)
}

// Обрыв заголовка - это ошибка формата, а не I/O
fn eof_as_malformed(e: std::io::Error) -> FilbankError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        FilbankError::malformed("header truncated")
    } else {
        FilbankError::Io(e)
    }
}
