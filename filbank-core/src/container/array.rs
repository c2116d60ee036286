//! Трёхмерный массив, нарезанный на чанки в [`BlobStore`].

use filbank_types::{Codec, FilbankError, FilbankResult, Region, SampleFormat, Shape3};
use serde::{Deserialize, Serialize};

use super::{
    codec::{decode_chunk, encode_chunk},
    store::BlobStore,
};

/// Подписи осей набора данных
pub const DIM_LABELS: [&str; 3] = ["time", "feed_id", "frequency"];

/// Тип элементов маски
pub const MASK_DTYPE: &str = "|u1";

/// Метаданные массива (`<name>/.array.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayMeta {
    pub shape: [usize; 3],
    pub chunks: [usize; 3],
    pub dtype: String,
    pub codec: Codec,
    pub dim_labels: Vec<String>,
}

/// Массив `name` внутри контейнера. Данные живут в хранилище, здесь только
/// геометрия и кодирование.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkedArray {
    name: String,
    shape: Shape3,
    chunks: Shape3,
    elem_size: usize,
    dtype: String,
    codec: Codec,
}

/// Итог записи региона.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub chunks: u64,
    pub bytes: u64,
}

impl ChunkedArray {
    /// Создаёт массив и записывает его метаданные.
    pub fn create<S: BlobStore + ?Sized>(
        store: &S,
        name: &str,
        shape: Shape3,
        chunks: Shape3,
        dtype: &str,
        codec: Codec,
    ) -> FilbankResult<Self> {
        let array = Self::from_meta(
            name,
            ArrayMeta {
                shape: shape.as_array(),
                chunks: chunks.as_array(),
                dtype: dtype.to_string(),
                codec,
                dim_labels: DIM_LABELS.iter().map(|s| s.to_string()).collect(),
            },
        )?;

        let json = serde_json::to_vec_pretty(&array.meta())
            .map_err(|e| FilbankError::corrupted(format!("array metadata: {e}")))?;
        store.set(&format!("{name}/.array.json"), &json)?;

        Ok(array)
    }

    /// Открывает массив по метаданным; `None`, если массива нет.
    pub fn open<S: BlobStore + ?Sized>(
        store: &S,
        name: &str,
    ) -> FilbankResult<Option<Self>> {
        let Some(bytes) = store.get(&format!("{name}/.array.json"))? else {
            return Ok(None);
        };

        let meta: ArrayMeta = serde_json::from_slice(&bytes)
            .map_err(|e| FilbankError::corrupted(format!("{name}/.array.json: {e}")))?;

        Self::from_meta(name, meta).map(Some)
    }

    fn from_meta(
        name: &str,
        meta: ArrayMeta,
    ) -> FilbankResult<Self> {
        let shape = Shape3::from_array(meta.shape);
        let chunks = Shape3::from_array(meta.chunks);

        if chunks.is_empty() {
            return Err(FilbankError::corrupted(format!(
                "array '{name}' has empty chunk shape {chunks}"
            )));
        }

        let elem_size = if meta.dtype == MASK_DTYPE {
            1
        } else {
            SampleFormat::from_dtype(&meta.dtype)?.sample_size()
        };

        Ok(Self {
            name: name.to_string(),
            shape,
            chunks,
            elem_size,
            dtype: meta.dtype,
            codec: meta.codec,
        })
    }

    pub fn meta(&self) -> ArrayMeta {
        ArrayMeta {
            shape: self.shape.as_array(),
            chunks: self.chunks.as_array(),
            dtype: self.dtype.clone(),
            codec: self.codec,
            dim_labels: DIM_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn shape(&self) -> Shape3 {
        self.shape
    }

    pub fn chunks(&self) -> Shape3 {
        self.chunks
    }

    pub fn dtype(&self) -> &str {
        &self.dtype
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn elem_size(&self) -> usize {
        self.elem_size
    }

    /// Ключ чанка `(ct, cb, cf)`.
    pub fn chunk_key(
        &self,
        idx: Shape3,
    ) -> String {
        format!("{}/c/{}.{}.{}", self.name, idx.time, idx.beam, idx.freq)
    }

    /// Читает регион; отсутствующие чанки читаются нулями.
    pub fn read_region<S: BlobStore + ?Sized>(
        &self,
        store: &S,
        region: Region,
    ) -> FilbankResult<Vec<u8>> {
        self.check_region(&region)?;

        let mut out = vec![0u8; region.shape.len() * self.elem_size];

        for idx in self.chunks_covering(&region) {
            let chunk_region = self.chunk_region(idx);
            let Some(part) = chunk_region.intersect(&region) else {
                continue;
            };
            let Some(chunk) = self.load_chunk(store, idx)? else {
                continue;
            };

            copy_rows(&chunk, &chunk_region, &mut out, &region, &part, self.elem_size);
        }

        Ok(out)
    }

    /// Пишет регион. Чанки, покрытые не полностью, дописываются поверх
    /// уже сохранённого содержимого.
    pub fn write_region<S: BlobStore + ?Sized>(
        &self,
        store: &S,
        region: Region,
        bytes: &[u8],
    ) -> FilbankResult<WriteStats> {
        self.check_region(&region)?;

        if bytes.len() != region.shape.len() * self.elem_size {
            return Err(FilbankError::incompatible(
                (region.shape, self.elem_size),
                bytes.len(),
            ));
        }

        let mut stats = WriteStats::default();

        for idx in self.chunks_covering(&region) {
            let chunk_region = self.chunk_region(idx);
            let Some(part) = chunk_region.intersect(&region) else {
                continue;
            };

            let full = Region::full(self.shape);
            let covered = chunk_region.intersect(&full) == Some(part);

            let mut chunk = if covered {
                vec![0u8; self.chunks.len() * self.elem_size]
            } else {
                self.load_chunk(store, idx)?
                    .unwrap_or_else(|| vec![0u8; self.chunks.len() * self.elem_size])
            };

            copy_rows(bytes, &region, &mut chunk, &chunk_region, &part, self.elem_size);

            let frame = encode_chunk(self.codec, &chunk, self.elem_size)?;
            store.set(&self.chunk_key(idx), &frame)?;

            stats.chunks += 1;
            stats.bytes += frame.len() as u64;
        }

        Ok(stats)
    }

    fn load_chunk<S: BlobStore + ?Sized>(
        &self,
        store: &S,
        idx: Shape3,
    ) -> FilbankResult<Option<Vec<u8>>> {
        let key = self.chunk_key(idx);

        match store.get(&key)? {
            None => Ok(None),
            Some(frame) => decode_chunk(
                self.codec,
                &frame,
                self.elem_size,
                self.chunks.len() * self.elem_size,
            )
            .map(Some)
            .map_err(|e| match e {
                FilbankError::Corrupted(msg) => FilbankError::corrupted(format!("{key}: {msg}")),
                other => other,
            }),
        }
    }

    fn check_region(
        &self,
        region: &Region,
    ) -> FilbankResult<()> {
        if region.fits_in(&self.shape) {
            Ok(())
        } else {
            Err(FilbankError::incompatible(region, self.shape))
        }
    }

    // Регион чанка во всю его ширину (краевые чанки хранятся целиком)
    fn chunk_region(
        &self,
        idx: Shape3,
    ) -> Region {
        Region::new(
            Shape3::new(
                idx.time * self.chunks.time,
                idx.beam * self.chunks.beam,
                idx.freq * self.chunks.freq,
            ),
            self.chunks,
        )
    }

    fn chunks_covering(
        &self,
        region: &Region,
    ) -> Vec<Shape3> {
        if region.shape.is_empty() {
            return Vec::new();
        }

        let lo = region.origin;
        let hi = region.end();
        let c = self.chunks;

        let mut out = Vec::new();
        for t in lo.time / c.time..hi.time.div_ceil(c.time) {
            for b in lo.beam / c.beam..hi.beam.div_ceil(c.beam) {
                for f in lo.freq / c.freq..hi.freq.div_ceil(c.freq) {
                    out.push(Shape3::new(t, b, f));
                }
            }
        }

        out
    }
}

// Копирует пересечение `part` из буфера региона `src_region` в буфер
// региона `dst_region`, построчно по частоте.
fn copy_rows(
    src: &[u8],
    src_region: &Region,
    dst: &mut [u8],
    dst_region: &Region,
    part: &Region,
    elem_size: usize,
) {
    let row = part.shape.freq * elem_size;

    for t in part.origin.time..part.end().time {
        for b in part.origin.beam..part.end().beam {
            let s = offset(src_region, t, b, part.origin.freq) * elem_size;
            let d = offset(dst_region, t, b, part.origin.freq) * elem_size;
            dst[d..d + row].copy_from_slice(&src[s..s + row]);
        }
    }
}

fn offset(
    region: &Region,
    t: usize,
    b: usize,
    f: usize,
) -> usize {
    let s = region.shape;
    let o = region.origin;

    ((t - o.time) * s.beam + (b - o.beam)) * s.freq + (f - o.freq)
}
