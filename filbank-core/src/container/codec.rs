//! Кадр чанка: `[u32 BE длина][payload][u32 BE CRC32 payload]`.
//!
//! Payload - байты чанка после преобразования [`Codec`]: без изменений,
//! LZ4 или перестановка байтов по разрядам (shuffle) с последующим LZ4.

use byteorder::{BigEndian, ByteOrder};
use filbank_types::{Codec, FilbankError, FilbankResult};
use log::warn;

/// Служебные байты кадра: длина + CRC
pub const FRAME_OVERHEAD: usize = 8;

/// Проверяет, собрано ли преобразование в этой сборке.
pub fn check_available(codec: Codec) -> FilbankResult<()> {
    if codec.is_compressed() && !cfg!(feature = "lz4") {
        return Err(FilbankError::CodecUnavailable(format!(
            "{codec} requires the `lz4` feature"
        )));
    }

    Ok(())
}

/// Преобразование, которое реально будет использовано при записи.
/// Недоступное сжатие деградирует до записи без сжатия.
pub fn effective_codec(requested: Codec) -> Codec {
    match check_available(requested) {
        Ok(()) => requested,
        Err(e) => {
            warn!("{e}; writing uncompressed chunks");
            Codec::None
        }
    }
}

/// Кодирует сырые байты чанка в кадр.
pub fn encode_chunk(
    codec: Codec,
    raw: &[u8],
    elem_size: usize,
) -> FilbankResult<Vec<u8>> {
    let payload = match codec {
        Codec::None => raw.to_vec(),
        Codec::Lz4 => compress(raw)?,
        Codec::ShuffleLz4 => compress(&shuffle(raw, elem_size))?,
    };

    let mut frame = vec![0u8; payload.len() + FRAME_OVERHEAD];
    let end = 4 + payload.len();

    BigEndian::write_u32(&mut frame[0..4], payload.len() as u32);
    frame[4..end].copy_from_slice(&payload);
    BigEndian::write_u32(&mut frame[end..], crc32fast::hash(&payload));

    Ok(frame)
}

/// Декодирует кадр; результат обязан иметь длину `expected_len`.
pub fn decode_chunk(
    codec: Codec,
    frame: &[u8],
    elem_size: usize,
    expected_len: usize,
) -> FilbankResult<Vec<u8>> {
    if frame.len() < FRAME_OVERHEAD {
        return Err(FilbankError::corrupted(format!(
            "chunk frame of {} bytes is too short",
            frame.len()
        )));
    }

    let len = BigEndian::read_u32(&frame[0..4]) as usize;
    if len + FRAME_OVERHEAD != frame.len() {
        return Err(FilbankError::corrupted(format!(
            "chunk frame declares {len} payload bytes, frame has {}",
            frame.len() - FRAME_OVERHEAD
        )));
    }

    let payload = &frame[4..4 + len];
    let stored_crc = BigEndian::read_u32(&frame[4 + len..]);
    let computed_crc = crc32fast::hash(payload);

    if stored_crc != computed_crc {
        return Err(FilbankError::corrupted(format!(
            "chunk CRC mismatch: stored {stored_crc:#010x}, computed {computed_crc:#010x}"
        )));
    }

    let raw = match codec {
        Codec::None => payload.to_vec(),
        Codec::Lz4 => decompress(payload)?,
        Codec::ShuffleLz4 => unshuffle(&decompress(payload)?, elem_size),
    };

    if raw.len() != expected_len {
        return Err(FilbankError::corrupted(format!(
            "chunk decoded to {} bytes, expected {expected_len}",
            raw.len()
        )));
    }

    Ok(raw)
}

/// Группирует i-е байты всех элементов вместе: сначала все младшие
/// байты, затем вторые и так далее.
pub fn shuffle(
    bytes: &[u8],
    elem_size: usize,
) -> Vec<u8> {
    if elem_size < 2 || bytes.len() % elem_size != 0 {
        return bytes.to_vec();
    }

    let n = bytes.len() / elem_size;
    let mut out = vec![0u8; bytes.len()];

    for (i, elem) in bytes.chunks_exact(elem_size).enumerate() {
        for (j, &b) in elem.iter().enumerate() {
            out[j * n + i] = b;
        }
    }

    out
}

/// Обратная перестановка к [`shuffle`].
pub fn unshuffle(
    bytes: &[u8],
    elem_size: usize,
) -> Vec<u8> {
    if elem_size < 2 || bytes.len() % elem_size != 0 {
        return bytes.to_vec();
    }

    let n = bytes.len() / elem_size;
    let mut out = vec![0u8; bytes.len()];

    for (i, elem) in out.chunks_exact_mut(elem_size).enumerate() {
        for (j, b) in elem.iter_mut().enumerate() {
            *b = bytes[j * n + i];
        }
    }

    out
}

#[cfg(feature = "lz4")]
fn compress(raw: &[u8]) -> FilbankResult<Vec<u8>> {
    Ok(lz4_flex::compress_prepend_size(raw))
}

#[cfg(feature = "lz4")]
fn decompress(payload: &[u8]) -> FilbankResult<Vec<u8>> {
    lz4_flex::decompress_size_prepended(payload)
        .map_err(|e| FilbankError::corrupted(format!("LZ4 decompression failed: {e}")))
}

#[cfg(not(feature = "lz4"))]
fn compress(_raw: &[u8]) -> FilbankResult<Vec<u8>> {
    Err(FilbankError::CodecUnavailable("lz4 support not compiled in".into()))
}

#[cfg(not(feature = "lz4"))]
fn decompress(_payload: &[u8]) -> FilbankResult<Vec<u8>> {
    Err(FilbankError::CodecUnavailable("lz4 support not compiled in".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Vec<u8> {
        (0..n as u32).flat_map(|v| (v * 3).to_le_bytes()).collect()
    }

    #[test]
    fn test_frame_layout_uncompressed() {
        let frame = encode_chunk(Codec::None, &[1, 2, 3], 1).unwrap();

        assert_eq!(&frame[0..4], &[0, 0, 0, 3], "payload length BE");
        assert_eq!(&frame[4..7], &[1, 2, 3]);
        assert_eq!(BigEndian::read_u32(&frame[7..]), crc32fast::hash(&[1, 2, 3]));
    }

    #[test]
    fn test_shuffle_layout() {
        let bytes = [0x01, 0xA1, 0x02, 0xA2, 0x03, 0xA3];
        let shuffled = shuffle(&bytes, 2);

        assert_eq!(shuffled, vec![0x01, 0x02, 0x03, 0xA1, 0xA2, 0xA3]);
        assert_eq!(unshuffle(&shuffled, 2), bytes.to_vec());
    }

    #[test]
    fn test_all_codecs_restore_bytes() {
        let raw = ramp(4_096);

        for codec in [Codec::None, Codec::Lz4, Codec::ShuffleLz4] {
            let codec = effective_codec(codec);
            let frame = encode_chunk(codec, &raw, 4).unwrap();
            let back = decode_chunk(codec, &frame, 4, raw.len()).unwrap();
            assert_eq!(back, raw, "{codec}");
        }
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn test_shuffle_compresses_better() {
        let raw = ramp(16_384);

        let plain = encode_chunk(Codec::Lz4, &raw, 4).unwrap();
        let shuffled = encode_chunk(Codec::ShuffleLz4, &raw, 4).unwrap();

        assert!(shuffled.len() < plain.len());
        assert!(shuffled.len() < raw.len() / 2);
    }

    #[test]
    fn test_crc_detects_corruption() {
        let raw = ramp(256);
        let mut frame = encode_chunk(Codec::None, &raw, 4).unwrap();
        frame[10] ^= 0xFF;

        let err = decode_chunk(Codec::None, &frame, 4, raw.len()).unwrap_err();
        assert!(err.to_string().contains("CRC mismatch"), "{err}");
    }

    #[test]
    fn test_truncated_frame() {
        let frame = encode_chunk(Codec::None, &ramp(16), 4).unwrap();

        assert!(matches!(
            decode_chunk(Codec::None, &frame[..frame.len() - 1], 4, 64),
            Err(FilbankError::Corrupted(_))
        ));
        assert!(decode_chunk(Codec::None, &frame[..3], 4, 64).is_err());
    }

    #[test]
    fn test_unexpected_decoded_length() {
        let frame = encode_chunk(Codec::None, &ramp(16), 4).unwrap();
        assert!(decode_chunk(Codec::None, &frame, 4, 32).is_err());
    }

    #[cfg(not(feature = "lz4"))]
    #[test]
    fn test_codec_unavailable_falls_back() {
        assert!(matches!(
            check_available(Codec::Lz4),
            Err(FilbankError::CodecUnavailable(_))
        ));
        assert_eq!(effective_codec(Codec::ShuffleLz4), Codec::None);
    }
}
