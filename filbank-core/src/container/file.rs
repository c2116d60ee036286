//! Filterbank контейнер: наборы `data` и `mask` формы `(time, beam, freq)`
//! плюс атрибуты заголовка.
//!
//! Каналы в контейнере всегда лежат по возрастанию частоты; атрибуты
//! `fch1`/`foff` сохраняют ориентацию исходного файла.

use filbank_types::{
    schema_kind, Angle, Codec, FilbankError, FilbankResult, Header, HeaderKind, HeaderValue,
    Region, SampleFormat, Shape3,
};
use log::{debug, info, warn};
use serde_json::{Map, Value};

use super::{
    array::{ChunkedArray, WriteStats, MASK_DTYPE},
    codec::effective_codec,
    store::BlobStore,
};
use crate::{
    axis::AxisDirection,
    config::FilbankConfig,
    data::{Blob, DataSelection},
    selection::{ResolvedSelection, SelectionRequest},
};

/// Значение атрибута `CLASS`
pub const CLASS: &str = "FILTERBANK";

/// Версия раскладки контейнера
pub const CONTAINER_VERSION: &str = "1.0";

const ROOT_ATTRS: &str = ".attrs.json";
const DATA_ATTRS: &str = "data/.attrs.json";

/// Писатель контейнера.
pub struct ContainerWriter<S: BlobStore> {
    store: S,
    header: Header,
    format: SampleFormat,
    data: ChunkedArray,
    mask: ChunkedArray,
    stats: WriteStats,
    finalized: bool,
}

/// Читатель контейнера с разрешённой выборкой.
pub struct FilterbankContainer<S: BlobStore> {
    store: S,
    header: Header,
    format: SampleFormat,
    data: ChunkedArray,
    mask: Option<ChunkedArray>,
    selection: ResolvedSelection,
    config: FilbankConfig,
}

////////////////////////////////////////////////////////////////////////////////
// Атрибуты заголовка
////////////////////////////////////////////////////////////////////////////////

/// Заголовок как JSON объект атрибутов.
pub fn header_to_attrs(header: &Header) -> Map<String, Value> {
    let mut attrs = Map::new();

    for (key, value) in header.iter() {
        let v = match value {
            HeaderValue::Int(v) => Value::from(*v),
            HeaderValue::Double(v) => Value::from(*v),
            HeaderValue::Angle(a) => Value::from(a.0),
            HeaderValue::Str(s) => Value::from(s.as_str()),
            HeaderValue::Byte(b) => Value::from(*b),
            HeaderValue::Opaque(json) => serde_json::from_str(json).unwrap_or_else(|_| Value::from(json.as_str())),
        };
        attrs.insert(key.clone(), v);
    }

    attrs
}

/// Заголовок из JSON атрибутов. Ключи вне таблицы sigproc сохраняются как
/// `HeaderValue::Opaque`.
pub fn header_from_attrs(attrs: &Map<String, Value>) -> FilbankResult<Header> {
    let mut header = Header::new();

    for (key, v) in attrs {
        let bad = || FilbankError::malformed(format!("attribute {key} has unexpected value {v}"));

        let value = match schema_kind(key) {
            Some(HeaderKind::Int) => {
                let n = v.as_i64().ok_or_else(bad)?;
                HeaderValue::Int(i32::try_from(n).map_err(|_| bad())?)
            }
            Some(HeaderKind::Double) => HeaderValue::Double(v.as_f64().ok_or_else(bad)?),
            Some(HeaderKind::Angle) => HeaderValue::Angle(Angle(v.as_f64().ok_or_else(bad)?)),
            Some(HeaderKind::Str) => HeaderValue::Str(v.as_str().ok_or_else(bad)?.to_string()),
            Some(HeaderKind::Byte) => {
                let n = v.as_u64().ok_or_else(bad)?;
                HeaderValue::Byte(u8::try_from(n).map_err(|_| bad())?)
            }
            None => HeaderValue::Opaque(v.to_string()),
        };

        header.insert(key.clone(), value);
    }

    Ok(header)
}

fn read_json<S: BlobStore + ?Sized>(
    store: &S,
    key: &str,
) -> FilbankResult<Option<Map<String, Value>>> {
    let Some(bytes) = store.get(key)? else {
        return Ok(None);
    };

    match serde_json::from_slice(&bytes) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(other) => Err(FilbankError::corrupted(format!(
            "{key}: expected an object, found {other}"
        ))),
        Err(e) => Err(FilbankError::corrupted(format!("{key}: {e}"))),
    }
}

fn write_json<S: BlobStore + ?Sized>(
    store: &S,
    key: &str,
    map: Map<String, Value>,
) -> FilbankResult<()> {
    let bytes = serde_json::to_vec_pretty(&Value::Object(map))
        .map_err(|e| FilbankError::corrupted(format!("{key}: {e}")))?;

    store.set(key, &bytes)
}

////////////////////////////////////////////////////////////////////////////////
// ContainerWriter
////////////////////////////////////////////////////////////////////////////////

impl<S: BlobStore> ContainerWriter<S> {
    /// Создаёт наборы `data` и `mask`. Атрибуты пишутся в [`finalize`].
    ///
    /// [`finalize`]: ContainerWriter::finalize
    pub fn create(
        store: S,
        header: Header,
        shape: Shape3,
        chunks: Shape3,
        codec: Codec,
    ) -> FilbankResult<Self> {
        header.validate()?;

        let format = header.sample_format()?;
        if header.nchans()? != shape.freq || header.nifs()? != shape.beam {
            return Err(FilbankError::incompatible(
                (header.nchans()?, header.nifs()?),
                shape,
            ));
        }

        let codec = effective_codec(codec);
        let data = ChunkedArray::create(&store, "data", shape, chunks, format.dtype(), codec)?;
        let mask = ChunkedArray::create(&store, "mask", shape, chunks, MASK_DTYPE, codec)?;

        info!("Container {shape}, chunks {chunks}, {} samples, codec {codec}", format.dtype());

        Ok(Self {
            store,
            header,
            format,
            data,
            mask,
            stats: WriteStats::default(),
            finalized: false,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn shape(&self) -> Shape3 {
        self.data.shape()
    }

    pub fn chunks(&self) -> Shape3 {
        self.data.chunks()
    }

    pub fn codec(&self) -> Codec {
        self.data.codec()
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// Записано чанков и байт (с учётом маски).
    pub fn stats(&self) -> WriteStats {
        self.stats
    }

    /// Пишет блоб в регион `blob.region` (координаты контейнера). Маска
    /// пишется только при наличии флагов.
    pub fn write_blob(
        &mut self,
        blob: &Blob,
    ) -> FilbankResult<WriteStats> {
        blob.check()?;

        if blob.format != self.format {
            return Err(FilbankError::incompatible(blob.format, self.format));
        }

        let mut stats = self.data.write_region(&self.store, blob.region, &blob.data)?;

        if blob.has_flags() {
            if let Some(mask) = &blob.mask {
                let m = self.mask.write_region(&self.store, blob.region, mask)?;
                stats.chunks += m.chunks;
                stats.bytes += m.bytes;
            }
        }

        self.stats.chunks += stats.chunks;
        self.stats.bytes += stats.bytes;
        Ok(stats)
    }

    /// Пишет атрибуты заголовка и корня.
    pub fn finalize(&mut self) -> FilbankResult<()> {
        if self.finalized {
            return Ok(());
        }

        write_json(&self.store, DATA_ATTRS, header_to_attrs(&self.header))?;

        let mut root = Map::new();
        root.insert("CLASS".into(), Value::from(CLASS));
        root.insert("VERSION".into(), Value::from(CONTAINER_VERSION));
        write_json(&self.store, ROOT_ATTRS, root)?;

        self.finalized = true;
        debug!("Container finalized: {} chunks, {} bytes", self.stats.chunks, self.stats.bytes);
        Ok(())
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

////////////////////////////////////////////////////////////////////////////////
// FilterbankContainer
////////////////////////////////////////////////////////////////////////////////

impl<S: BlobStore> FilterbankContainer<S> {
    /// Открывает контейнер и разрешает выборку.
    pub fn open(
        store: S,
        request: &SelectionRequest,
        config: &FilbankConfig,
    ) -> FilbankResult<Self> {
        match read_json(&store, ROOT_ATTRS)?.and_then(|m| m.get("CLASS").cloned()) {
            Some(Value::String(c)) if c == CLASS => {}
            Some(other) => warn!("Container CLASS is {other}, expected {CLASS}"),
            None => warn!("Container has no CLASS attribute"),
        }

        let data = ChunkedArray::open(&store, "data")?
            .ok_or_else(|| FilbankError::corrupted("container has no 'data' array"))?;
        let mask = ChunkedArray::open(&store, "mask")?;

        let attrs = read_json(&store, DATA_ATTRS)?
            .ok_or_else(|| FilbankError::malformed("container has no header attributes"))?;
        let header = header_from_attrs(&attrs)?;
        header.validate()?;

        let format = SampleFormat::from_dtype(data.dtype())?;
        if format != header.sample_format()? {
            return Err(FilbankError::corrupted(format!(
                "data dtype {} disagrees with nbits {}",
                data.dtype(),
                header.nbits()?
            )));
        }

        let shape = data.shape();
        if shape.freq != header.nchans()? || shape.beam != header.nifs()? {
            return Err(FilbankError::corrupted(format!(
                "data shape {shape} disagrees with header nchans {} nifs {}",
                header.nchans()?,
                header.nifs()?
            )));
        }

        let selection = ResolvedSelection::resolve(&header, shape.time, request)?;

        Ok(Self {
            store,
            header,
            format,
            data,
            mask,
            selection,
            config: config.clone(),
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// Форма набора `data`.
    pub fn shape(&self) -> Shape3 {
        self.data.shape()
    }

    pub fn chunks(&self) -> Shape3 {
        self.data.chunks()
    }

    pub fn codec(&self) -> Codec {
        self.data.codec()
    }

    pub fn n_ints_in_file(&self) -> usize {
        self.data.shape().time
    }

    pub fn selection(&self) -> &ResolvedSelection {
        &self.selection
    }

    pub fn selection_shape(&self) -> Shape3 {
        self.selection.shape()
    }

    pub fn freqs(&self) -> &[f64] {
        &self.selection.freqs
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.selection.timestamps
    }

    /// Регион выборки в координатах контейнера (частота по возрастанию).
    pub fn selection_region(&self) -> Region {
        self.selection
            .storage_region(self.shape().freq, AxisDirection::Ascending)
    }

    pub fn selection_bytes(&self) -> u64 {
        self.selection_shape().bytes(self.format.sample_size())
    }

    /// Выборка больше лимита чтения в память.
    pub fn is_heavy(&self) -> bool {
        self.selection_bytes() > self.config.max_data_array_bytes()
    }

    /// Читает регион контейнера вместе с маской.
    pub fn read_blob(
        &self,
        region: Region,
    ) -> FilbankResult<Blob> {
        let data = self.data.read_region(&self.store, region)?;
        let mut blob = Blob::new(region, self.format, data);

        if let Some(mask) = &self.mask {
            let m = mask.read_region(&self.store, region)?;
            if m.iter().any(|&b| b != 0) {
                blob = blob.with_mask(m);
            }
        }

        Ok(blob)
    }

    /// Читает всю выборку в память.
    pub fn read_selection(&self) -> FilbankResult<DataSelection> {
        if self.is_heavy() {
            return Err(FilbankError::SelectionTooLarge {
                bytes: self.selection_bytes(),
                limit: self.config.max_data_array_bytes(),
            });
        }

        let blob = self.read_blob(self.selection_region())?;

        DataSelection::from_blob(
            blob,
            false,
            self.selection.freqs.clone(),
            self.selection.timestamps.clone(),
            self.header.foff()?,
        )
    }

    pub fn into_store(self) -> S {
        self.store
    }
}
