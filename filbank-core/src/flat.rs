//! Плоский sigproc файл: заголовок, затем отсчёты `[time][beam][freq]`
//! little-endian.

use std::{
    fs::{File, OpenOptions},
    io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use filbank_types::{FilbankError, FilbankResult, Header, Region, SampleFormat, Shape3};
use log::{debug, info, warn};

use crate::{
    axis::AxisDirection,
    config::FilbankConfig,
    data::{Blob, DataSelection},
    format::HeaderCodec,
    selection::{ResolvedSelection, SelectionRequest},
};

/// Читатель плоского файла с разрешённой выборкой.
#[derive(Debug)]
pub struct FilterbankReader {
    path: PathBuf,
    file: File,
    header: Header,
    header_len: u64,
    file_len: u64,
    format: SampleFormat,
    file_shape: Shape3,
    selection: ResolvedSelection,
    config: FilbankConfig,
}

/// Писатель плоского файла. Файл сразу получает итоговый размер, регионы
/// можно писать в любом порядке.
#[derive(Debug)]
pub struct FilterbankWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    header_len: u64,
    format: SampleFormat,
    shape: Shape3,
    direction: AxisDirection,
    position: u64,
    mask_warned: bool,
}

////////////////////////////////////////////////////////////////////////////////
// FilterbankReader
////////////////////////////////////////////////////////////////////////////////

impl FilterbankReader {
    /// Открывает файл, разбирает заголовок и разрешает выборку.
    pub fn open<P: AsRef<Path>>(
        path: P,
        request: &SelectionRequest,
        config: &FilbankConfig,
    ) -> FilbankResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_len = file.metadata()?.len();

        let codec = HeaderCodec::new(config.max_header_blocks);
        let (header, header_len) = codec.read_from(&mut BufReader::new(&file))?;
        header.validate()?;

        let format = header.sample_format()?;
        let nchans = header.nchans()?;
        let nifs = header.nifs()?;
        let header_len = header_len as u64;

        let row_bytes = (nifs * nchans * format.sample_size()) as u64;
        let data_len = file_len.saturating_sub(header_len);
        let n_ints = (data_len / row_bytes) as usize;

        if data_len % row_bytes != 0 {
            warn!(
                "{}: {} trailing bytes do not form a full integration, ignored",
                path.display(),
                data_len % row_bytes
            );
        }

        let file_shape = Shape3::new(n_ints, nifs, nchans);
        let selection = ResolvedSelection::resolve(&header, n_ints, request)?;

        debug!(
            "Opened {}: header {header_len} bytes, file shape {file_shape}, selection {}",
            path.display(),
            selection.shape()
        );

        Ok(Self {
            path,
            file,
            header,
            header_len,
            file_len,
            format,
            file_shape,
            selection,
            config: config.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Длина заголовка = смещение начала данных.
    pub fn header_len(&self) -> u64 {
        self.header_len
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// Форма данных файла `(n_ints, nifs, nchans)`.
    pub fn file_shape(&self) -> Shape3 {
        self.file_shape
    }

    pub fn n_ints_in_file(&self) -> usize {
        self.file_shape.time
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

    /// Порядок каналов на диске.
    pub fn storage_order(&self) -> AxisDirection {
        self.selection.direction
    }

    /// Регион выборки в координатах файла.
    pub fn selection_region(&self) -> Region {
        self.selection
            .storage_region(self.file_shape.freq, self.storage_order())
    }

    pub fn selection_bytes(&self) -> u64 {
        self.selection_shape().bytes(self.format.sample_size())
    }

    /// Выборка больше лимита чтения в память.
    pub fn is_heavy(&self) -> bool {
        self.selection_bytes() > self.config.max_data_array_bytes()
    }

    /// Читает регион файла. Строки `(time, beam)` читаются отдельно, если
    /// регион не покрывает полосу целиком.
    pub fn read_blob(
        &self,
        region: Region,
    ) -> FilbankResult<Blob> {
        if !region.fits_in(&self.file_shape) {
            return Err(FilbankError::incompatible(region, self.file_shape));
        }

        let ss = self.format.sample_size();
        let Region { origin, shape } = region;
        let mut data = vec![0u8; shape.len() * ss];
        let mut file = &self.file;

        let full_rows = shape.freq == self.file_shape.freq && shape.beam == self.file_shape.beam;

        if full_rows {
            file.seek(SeekFrom::Start(self.offset(origin.time, 0, 0)))?;
            file.read_exact(&mut data)?;
        } else {
            let row = shape.freq * ss;

            for (i, buf) in data.chunks_exact_mut(row).enumerate() {
                let t = origin.time + i / shape.beam;
                let b = origin.beam + i % shape.beam;

                file.seek(SeekFrom::Start(self.offset(t, b, origin.freq)))?;
                file.read_exact(buf)?;
            }
        }

        Ok(Blob::new(region, self.format, data))
    }

    /// Читает всю выборку в память; частота по возрастанию.
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
            self.storage_order().is_descending(),
            self.selection.freqs.clone(),
            self.selection.timestamps.clone(),
            self.header.foff()?,
        )
    }

    fn offset(
        &self,
        t: usize,
        b: usize,
        f: usize,
    ) -> u64 {
        let idx = (t * self.file_shape.beam + b) * self.file_shape.freq + f;
        self.header_len + (idx * self.format.sample_size()) as u64
    }
}

////////////////////////////////////////////////////////////////////////////////
// FilterbankWriter
////////////////////////////////////////////////////////////////////////////////

impl FilterbankWriter {
    /// Создаёт файл: заголовок и место под `n_ints` интеграций.
    pub fn create<P: AsRef<Path>>(
        path: P,
        header: &Header,
        n_ints: usize,
    ) -> FilbankResult<Self> {
        Self::create_with_codec(path, header, n_ints, &HeaderCodec::default())
    }

    pub fn create_with_codec<P: AsRef<Path>>(
        path: P,
        header: &Header,
        n_ints: usize,
        codec: &HeaderCodec,
    ) -> FilbankResult<Self> {
        header.validate()?;

        let path = path.as_ref().to_path_buf();
        let format = header.sample_format()?;
        let shape = Shape3::new(n_ints, header.nifs()?, header.nchans()?);
        let head = codec.serialize(header)?;
        let header_len = head.len() as u64;

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(header_len + shape.bytes(format.sample_size()))?;

        let mut writer = BufWriter::new(file);
        writer.write_all(&head)?;

        info!(
            "Creating {}: shape {shape}, {} bytes per sample",
            path.display(),
            format.sample_size()
        );

        Ok(Self {
            path,
            writer,
            header_len,
            format,
            shape,
            direction: AxisDirection::from_foff(header.foff()?),
            position: header_len,
            mask_warned: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn shape(&self) -> Shape3 {
        self.shape
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn header_len(&self) -> u64 {
        self.header_len
    }

    /// Порядок каналов в файле (знак `foff`).
    pub fn direction(&self) -> AxisDirection {
        self.direction
    }

    /// Пишет блоб в регион `blob.region`. Маска в плоском формате не
    /// хранится и отбрасывается.
    pub fn write_blob(
        &mut self,
        blob: &Blob,
    ) -> FilbankResult<u64> {
        blob.check()?;

        if blob.format != self.format {
            return Err(FilbankError::incompatible(blob.format, self.format));
        }
        if !blob.region.fits_in(&self.shape) {
            return Err(FilbankError::incompatible(blob.region, self.shape));
        }

        if blob.has_flags() && !self.mask_warned {
            warn!("{}: flat format has no mask, flags dropped", self.path.display());
            self.mask_warned = true;
        }

        let ss = self.format.sample_size();
        let Region { origin, shape } = blob.region;

        if shape.freq == self.shape.freq && shape.beam == self.shape.beam {
            let offset = self.offset(origin.time, 0, 0);
            self.write_at(offset, &blob.data)?;
        } else {
            for (i, row) in blob.data.chunks_exact(shape.freq * ss).enumerate() {
                let t = origin.time + i / shape.beam;
                let b = origin.beam + i % shape.beam;
                let offset = self.offset(t, b, origin.freq);
                self.write_at(offset, row)?;
            }
        }

        Ok(blob.data.len() as u64)
    }

    /// Сбрасывает буфер и синхронизирует файл.
    pub fn finish(&mut self) -> FilbankResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    fn write_at(
        &mut self,
        offset: u64,
        bytes: &[u8],
    ) -> FilbankResult<()> {
        if offset != self.position {
            self.writer.seek(SeekFrom::Start(offset))?;
        }

        self.writer.write_all(bytes)?;
        self.position = offset + bytes.len() as u64;
        Ok(())
    }

    fn offset(
        &self,
        t: usize,
        b: usize,
        f: usize,
    ) -> u64 {
        let idx = (t * self.shape.beam + b) * self.shape.freq + f;
        self.header_len + (idx * self.format.sample_size()) as u64
    }
}
