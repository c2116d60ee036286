//! Заголовок sigproc filterbank файла.
//!
//! Заголовок - последовательность записей `ключ значение`, обрамлённая
//! ключевыми словами `HEADER_START` / `HEADER_END`. Ключ - строка с префиксом
//! длины (`u32` little-endian), тип значения определяется таблицей
//! [`HEADER_SCHEMA`]. Сразу за `HEADER_END` начинаются данные.

use std::io::{Cursor, Read};

use filbank_types::{schema_kind, FilbankError, FilbankResult, Header, HeaderValue, HEADER_SCHEMA};
use log::warn;

use crate::binary::{read_keyword, read_value, write_keyword, write_value, MAX_STRING_LEN};

/// Ключевое слово начала заголовка
pub const HEADER_START: &str = "HEADER_START";

/// Ключевое слово конца заголовка
pub const HEADER_END: &str = "HEADER_END";

/// Размер блока, в котором измеряется предел заголовка
pub const HEADER_BLOCK_SIZE: usize = 512;

/// Предел заголовка по умолчанию (в 512-байтных блоках)
pub const MAX_HEADER_BLOCKS: usize = 100;

/// Кодек заголовка с ограничением на размер.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderCodec {
    /// Заголовок обязан закончиться в пределах этого числа блоков, иначе
    /// мы рискуем принять данные за заголовок.
    pub max_header_blocks: usize,
}

impl Default for HeaderCodec {
    fn default() -> Self {
        Self {
            max_header_blocks: MAX_HEADER_BLOCKS,
        }
    }
}

impl HeaderCodec {
    pub fn new(max_header_blocks: usize) -> Self {
        Self { max_header_blocks }
    }

    pub fn max_header_bytes(&self) -> usize {
        self.max_header_blocks * HEADER_BLOCK_SIZE
    }

    /// Разбирает заголовок. Возвращает заголовок и его длину в байтах
    /// (смещение начала данных).
    pub fn parse(
        &self,
        bytes: &[u8],
    ) -> FilbankResult<(Header, usize)> {
        let limit = bytes.len().min(self.max_header_bytes());
        let truncated_by_limit = bytes.len() > limit;
        let mut cur = Cursor::new(&bytes[..limit]);

        let first = read_keyword(&mut cur).map_err(|e| self.limit_error(e, truncated_by_limit))?;
        if first != HEADER_START {
            return Err(FilbankError::malformed(format!(
                "expected {HEADER_START}, found '{first}'"
            )));
        }

        let mut header = Header::new();

        loop {
            let key = read_keyword(&mut cur).map_err(|e| self.limit_error(e, truncated_by_limit))?;

            if key == HEADER_END {
                break;
            }

            let kind = schema_kind(&key)
                .ok_or_else(|| FilbankError::malformed(format!("unknown keyword '{key}'")))?;
            let value = read_value(&mut cur, kind).map_err(|e| self.limit_error(e, truncated_by_limit))?;

            header.insert(key, value);
        }

        Ok((header, cur.position() as usize))
    }

    /// Читает заголовок из потока (не более `max_header_bytes` байт).
    ///
    /// Поток после вызова стоит в неопределённой позиции; для доступа к
    /// данным используйте возвращённую длину заголовка.
    pub fn read_from<R: Read>(
        &self,
        r: &mut R,
    ) -> FilbankResult<(Header, usize)> {
        // +1 байт позволяет отличить "уперлись в лимит" от "файл кончился"
        let mut buf = Vec::with_capacity(self.max_header_bytes() + 1);
        r.take(self.max_header_bytes() as u64 + 1).read_to_end(&mut buf)?;

        self.parse(&buf)
    }

    /// Сериализует заголовок. Ключи пишутся в порядке [`HEADER_SCHEMA`];
    /// ключи вне таблицы пропускаются с предупреждением.
    pub fn serialize(
        &self,
        header: &Header,
    ) -> FilbankResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(HEADER_BLOCK_SIZE);

        write_keyword(&mut buf, HEADER_START)?;

        for (key, kind) in HEADER_SCHEMA {
            let Some(value) = header.get(key) else {
                continue;
            };

            if value.kind() != Some(*kind) {
                return Err(FilbankError::malformed(format!(
                    "key {key} expects {kind:?}, got {value:?}"
                )));
            }

            // Иначе записанный файл не прочитается обратно
            if let HeaderValue::Str(text) = value {
                if text.len() > MAX_STRING_LEN {
                    return Err(FilbankError::malformed(format!(
                        "key {key} is {} bytes long, limit is {MAX_STRING_LEN}",
                        text.len()
                    )));
                }
            }

            write_keyword(&mut buf, key)?;
            write_value(&mut buf, value)?;
        }

        for (key, _) in header.iter().filter(|(k, _)| schema_kind(k).is_none()) {
            warn!("Header key '{key}' has no sigproc encoding, skipped");
        }

        write_keyword(&mut buf, HEADER_END)?;

        if buf.len() > self.max_header_bytes() {
            return Err(FilbankError::malformed(format!(
                "serialized header is {} bytes, limit is {} blocks",
                buf.len(),
                self.max_header_blocks
            )));
        }

        Ok(buf)
    }

    fn limit_error(
        &self,
        e: FilbankError,
        truncated_by_limit: bool,
    ) -> FilbankError {
        match e {
            FilbankError::MalformedHeader(_) if truncated_by_limit => FilbankError::malformed(format!(
                "{HEADER_END} not found within {} blocks of {HEADER_BLOCK_SIZE} bytes",
                self.max_header_blocks
            )),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use filbank_types::Angle;

    use super::*;

    fn full_header() -> Header {
        let mut h = Header::new_filterbank(1420.0, -0.5, 4, 57_000.25, 18.253611008, 32).unwrap();

        h.insert("telescope_id", HeaderValue::Int(6));
        h.insert("machine_id", HeaderValue::Int(10));
        h.insert("data_type", HeaderValue::Int(1));
        h.insert("source_name", HeaderValue::Str("Voyager1".into()));
        h.insert("rawdatafile", HeaderValue::Str("guppi_58000.raw".into()));
        h.insert("src_raj", HeaderValue::Angle(Angle(171_010.0)));
        h.insert("src_dej", HeaderValue::Angle(Angle(122_559.5)));
        h.insert("az_start", HeaderValue::Double(0.0));
        h.insert("za_start", HeaderValue::Double(0.0));
        h.insert("signed", HeaderValue::Byte(0));
        h
    }

    #[test]
    fn test_header_round_trip() {
        let codec = HeaderCodec::default();
        let header = full_header();

        let bytes = codec.serialize(&header).unwrap();
        let (parsed, len) = codec.parse(&bytes).unwrap();

        assert_eq!(len, bytes.len());
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_header_byte_layout() {
        let codec = HeaderCodec::default();
        let mut h = Header::new();
        h.insert("nbits", HeaderValue::Int(8));

        let bytes = codec.serialize(&h).unwrap();

        // u32 LE длина + "HEADER_START"
        assert_eq!(&bytes[0..4], &[12, 0, 0, 0], "keyword length LE");
        assert_eq!(&bytes[4..16], b"HEADER_START");
        assert_eq!(&bytes[16..20], &[5, 0, 0, 0]);
        assert_eq!(&bytes[20..25], b"nbits");
        assert_eq!(&bytes[25..29], &[8, 0, 0, 0], "nbits value LE");
        assert_eq!(&bytes[29..33], &[10, 0, 0, 0]);
        assert_eq!(&bytes[33..43], b"HEADER_END");
        assert_eq!(bytes.len(), 43);
    }

    #[test]
    fn test_data_follows_header() {
        let codec = HeaderCodec::default();
        let mut bytes = codec.serialize(&full_header()).unwrap();
        let header_len = bytes.len();
        bytes.extend_from_slice(&[0xAB; 64]);

        let (_, len) = codec.parse(&bytes).unwrap();
        assert_eq!(len, header_len);
    }

    #[test]
    fn test_missing_header_start() {
        let codec = HeaderCodec::default();
        let mut bytes = Vec::new();
        write_keyword(&mut bytes, "nbits").unwrap();

        let err = codec.parse(&bytes).unwrap_err();
        assert!(err.to_string().contains("HEADER_START"));
    }

    #[test]
    fn test_unknown_keyword_rejected() {
        let codec = HeaderCodec::default();
        let mut bytes = Vec::new();
        write_keyword(&mut bytes, HEADER_START).unwrap();
        write_keyword(&mut bytes, "mystery_key").unwrap();
        bytes.extend_from_slice(&1i32.to_le_bytes());
        write_keyword(&mut bytes, HEADER_END).unwrap();

        let err = codec.parse(&bytes).unwrap_err();
        assert!(matches!(err, FilbankError::MalformedHeader(_)));
        assert!(err.to_string().contains("mystery_key"));
    }

    #[test]
    fn test_non_ascii_keyword_rejected() {
        let codec = HeaderCodec::default();
        let mut bytes = Vec::new();
        write_keyword(&mut bytes, HEADER_START).unwrap();
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&[0xD0, 0x9A, 0xD0, 0x9B]);

        let err = codec.parse(&bytes).unwrap_err();
        assert!(err.to_string().contains("non-ASCII"));
    }

    #[test]
    fn test_header_end_beyond_block_limit() {
        // Заголовок без HEADER_END, за которым идут "данные"
        let codec = HeaderCodec::new(1);
        let mut bytes = Vec::new();
        write_keyword(&mut bytes, HEADER_START).unwrap();
        for _ in 0..40 {
            write_keyword(&mut bytes, "tsamp").unwrap();
            bytes.extend_from_slice(&1.0f64.to_le_bytes());
        }
        write_keyword(&mut bytes, HEADER_END).unwrap();
        assert!(bytes.len() > HEADER_BLOCK_SIZE);

        let err = codec.parse(&bytes).unwrap_err();
        assert!(err.to_string().contains("not found within 1 blocks"), "{err}");

        // С большим лимитом тот же заголовок разбирается
        assert!(HeaderCodec::new(2).parse(&bytes).is_ok());
    }

    #[test]
    fn test_truncated_header() {
        let codec = HeaderCodec::default();
        let bytes = codec.serialize(&full_header()).unwrap();

        let err = codec.parse(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_serialize_skips_opaque_keys() {
        let codec = HeaderCodec::default();
        let mut h = full_header();
        h.insert("CLASS", HeaderValue::Opaque("\"FILTERBANK\"".into()));

        let bytes = codec.serialize(&h).unwrap();
        let (parsed, _) = codec.parse(&bytes).unwrap();

        assert!(!parsed.contains("CLASS"));
        assert_eq!(parsed, full_header());
    }

    #[test]
    fn test_serialize_rejects_mistyped_value() {
        let codec = HeaderCodec::default();
        let mut h = full_header();
        h.insert("nchans", HeaderValue::Str("four".into()));

        assert!(codec.serialize(&h).is_err());
    }

    #[test]
    fn test_serialize_rejects_overlong_string() {
        let codec = HeaderCodec::default();
        let mut h = full_header();

        h.insert("source_name", HeaderValue::Str("x".repeat(MAX_STRING_LEN)));
        let bytes = codec.serialize(&h).unwrap();
        assert_eq!(codec.parse(&bytes).unwrap().0, h);

        h.insert("source_name", HeaderValue::Str("x".repeat(MAX_STRING_LEN + 1)));
        assert!(matches!(
            codec.serialize(&h),
            Err(FilbankError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_read_from_stream() {
        let codec = HeaderCodec::default();
        let mut bytes = codec.serialize(&full_header()).unwrap();
        let header_len = bytes.len();
        bytes.extend(std::iter::repeat(7u8).take(100_000));

        let (h, len) = codec.read_from(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(len, header_len);
        assert_eq!(h.nchans().unwrap(), 4);
    }
}
