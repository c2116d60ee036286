//! Поблобовая конвертация плоский файл ↔ чанковый контейнер.
//!
//! Поток чтения подкачивает один блоб вперёд через `bounded(1)` канал, запись
//! идёт в вызывающем потоке. Одновременно в памяти не больше двух блобов.

use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use filbank_types::{
    ChunkShape, Codec, FilbankError, FilbankResult, Header, Region, SampleFormat, Shape3,
};
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::{
    axis::AxisDirection,
    config::FilbankConfig,
    container::{
        BlobStore, ContainerWriter, FilesystemStore, FilterbankContainer, WriteStats,
    },
    data::Blob,
    flat::{FilterbankReader, FilterbankWriter},
    geometry::{chunk_shape, mirror_channel_range, BlobPlan},
    metrics::{ConversionMetrics, MetricsSummary},
    selection::{ResolvedSelection, SelectionRequest},
    spectral::{blank_dc_rows, estimate_coarse_channels},
};

/// Источник блобов: плоский файл или контейнер с разрешённой выборкой.
pub trait BlobSource {
    fn header(&self) -> &Header;

    fn format(&self) -> SampleFormat;

    /// Полная форма данных источника.
    fn dataset_shape(&self) -> Shape3;

    fn selection(&self) -> &ResolvedSelection;

    /// Порядок каналов в хранилище источника.
    fn storage_order(&self) -> AxisDirection;

    /// Читает регион в координатах хранилища источника.
    fn read_blob(
        &self,
        region: Region,
    ) -> FilbankResult<Blob>;

    fn selection_region(&self) -> Region {
        self.selection()
            .storage_region(self.dataset_shape().freq, self.storage_order())
    }

    /// Строки отчёта `info`: поля заголовка и производные величины.
    fn info_lines(&self) -> Vec<(String, String)> {
        let mut lines = self.header().info_lines();
        let sel = self.selection();

        lines.push(("data_shape".into(), self.dataset_shape().to_string()));
        lines.push(("selection_shape".into(), sel.shape().to_string()));

        if let (Some(lo), Some(hi)) = (sel.freqs.first(), sel.freqs.last()) {
            lines.push(("freq_range_mhz".into(), format!("{lo:.6} .. {hi:.6}")));
        }
        if let (Some(t0), Some(t1)) = (sel.timestamps.first(), sel.timestamps.last()) {
            lines.push(("time_range_mjd".into(), format!("{t0:.8} .. {t1:.8}")));
        }

        lines
    }
}

/// Приёмник блобов.
pub trait BlobSink {
    /// Объявленная форма приёмника.
    fn shape(&self) -> Shape3;

    fn format(&self) -> SampleFormat;

    /// Порядок каналов в хранилище приёмника.
    fn storage_order(&self) -> AxisDirection;

    /// Пишет блоб в регион `blob.region` (координаты приёмника).
    fn write_blob(
        &mut self,
        blob: &Blob,
    ) -> FilbankResult<WriteStats>;

    /// Дописывает заголовок/атрибуты и сбрасывает данные.
    fn finalize(&mut self) -> FilbankResult<()>;
}

/// Состояние конвертации.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Planning,
    Streaming,
    Finalizing,
    Done,
}

/// Направление конвертации.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionMode {
    FlatToChunked,
    ChunkedToFlat,
}

/// Итог конвертации.
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub mode: ConversionMode,
    pub plan: BlobPlan,
    /// Кодек чанков (для записи в контейнер)
    pub codec: Option<Codec>,
    /// Обработано блобов (может быть меньше `plan.count` при остановке)
    pub blobs: usize,
    /// Конвертация прервана флагом остановки
    pub interrupted: bool,
    pub metrics: MetricsSummary,
}

/// Движок конвертации.
pub struct ConversionEngine {
    config: FilbankConfig,
    metrics: Arc<ConversionMetrics>,
    stop_flag: Arc<AtomicBool>,
    state: Mutex<EngineState>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl ConversionEngine {
    pub fn new(config: FilbankConfig) -> Self {
        Self::with_stop_flag(config, Arc::new(AtomicBool::new(false)))
    }

    /// Движок с внешним флагом остановки (например, от Ctrl+C).
    pub fn with_stop_flag(
        config: FilbankConfig,
        stop_flag: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            metrics: ConversionMetrics::new(),
            stop_flag,
            state: Mutex::new(EngineState::Planning),
        }
    }

    pub fn config(&self) -> &FilbankConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<ConversionMetrics> {
        self.metrics.clone()
    }

    /// Флаг остановки. Установка в `true` завершает цикл между блобами.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// План чанков и блобов для выборки источника.
    pub fn plan<Src: BlobSource + ?Sized>(
        &self,
        source: &Src,
        chunk: ChunkShape,
    ) -> BlobPlan {
        let selection = source.selection().shape();

        BlobPlan::new(
            chunk,
            source.dataset_shape(),
            selection,
            source.format().sample_size(),
            self.config.blob_mb,
        )
    }

    /// Переносит выборку источника в приёмник блоб за блобом.
    ///
    /// Ошибка ввода/вывода прерывает конвертацию; уже записанное остаётся
    /// на диске.
    pub fn convert<Src, Dst>(
        &self,
        source: &Src,
        sink: &mut Dst,
        plan: &BlobPlan,
        mode: ConversionMode,
    ) -> FilbankResult<ConversionReport>
    where
        Src: BlobSource + Sync + ?Sized,
        Dst: BlobSink + ?Sized,
    {
        self.set_state(EngineState::Planning);
        let started = Instant::now();

        let selection = source.selection().shape();
        if selection != sink.shape() || source.format() != sink.format() {
            return Err(FilbankError::incompatible(
                (selection, source.format()),
                (sink.shape(), sink.format()),
            ));
        }
        if plan.selection != selection {
            return Err(FilbankError::incompatible(plan.selection, selection));
        }

        let sink_order = sink.storage_order();
        let flip = source.storage_order() != sink_order;
        let dc_coarse = self.dc_coarse_channels(source, plan)?;

        info!(
            "Converting {selection} as {} blobs of {} ({:?}, flip {flip})",
            plan.count, plan.blob, plan.order
        );

        self.set_state(EngineState::Streaming);
        let (blobs, interrupted) =
            self.stream(source, sink, plan, flip, sink_order, dc_coarse)?;

        self.set_state(EngineState::Finalizing);
        sink.finalize()?;
        self.set_state(EngineState::Done);

        let metrics = self.metrics.summary(&started);
        info!("Conversion done: {blobs}/{} blobs in {:.1}s", plan.count, metrics.duration_secs);

        Ok(ConversionReport {
            mode,
            plan: *plan,
            codec: None,
            blobs,
            interrupted,
            metrics,
        })
    }

    /// Плоский файл → контейнер в `store`.
    pub fn flat_to_container<S: BlobStore>(
        &self,
        input: &Path,
        store: S,
        request: &SelectionRequest,
    ) -> FilbankResult<(ConversionReport, S)> {
        let reader = FilterbankReader::open(input, request, &self.config)?;
        let plan = self.plan(&reader, chunk_shape(&input.to_string_lossy()));

        let header = reader.selection().sub_header(reader.header())?;
        let mut writer =
            ContainerWriter::create(store, header, plan.selection, plan.chunk, self.config.codec)?;

        let mut report = self.convert(&reader, &mut writer, &plan, ConversionMode::FlatToChunked)?;
        report.codec = Some(writer.codec());

        Ok((report, writer.into_store()))
    }

    /// Контейнер в `store` → плоский файл.
    pub fn container_to_flat<S: BlobStore>(
        &self,
        store: S,
        output: &Path,
        request: &SelectionRequest,
    ) -> FilbankResult<ConversionReport> {
        let container = FilterbankContainer::open(store, request, &self.config)?;
        let plan = self.plan(&container, ChunkShape::Fixed(container.chunks()));

        let header = container.selection().sub_header(container.header())?;
        let mut writer = FilterbankWriter::create(output, &header, plan.selection.time)?;

        self.convert(&container, &mut writer, &plan, ConversionMode::ChunkedToFlat)
    }

    /// Конвертация по путям: контейнер - каталог файловой системы.
    pub fn convert_path(
        &self,
        input: &Path,
        output: &Path,
        mode: ConversionMode,
        request: &SelectionRequest,
    ) -> FilbankResult<ConversionReport> {
        match mode {
            ConversionMode::FlatToChunked => {
                let store = FilesystemStore::create(output)?;
                self.flat_to_container(input, store, request).map(|(r, _)| r)
            }
            ConversionMode::ChunkedToFlat => {
                let store = FilesystemStore::open(input)?;
                self.container_to_flat(store, output, request)
            }
        }
    }

    fn stream<Src, Dst>(
        &self,
        source: &Src,
        sink: &mut Dst,
        plan: &BlobPlan,
        flip: bool,
        sink_order: AxisDirection,
        dc_coarse: Option<usize>,
    ) -> FilbankResult<(usize, bool)>
    where
        Src: BlobSource + Sync + ?Sized,
        Dst: BlobSink + ?Sized,
    {
        let base = source.selection_region();
        let width = plan.selection.freq;
        let metrics = &self.metrics;
        let stop = &self.stop_flag;

        std::thread::scope(|scope| {
            let (tx, rx) = crossbeam_channel::bounded::<FilbankResult<(Region, Blob)>>(1);

            // Поток чтения
            scope.spawn(move || {
                for local in plan.regions() {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }

                    let region = Region::new(
                        Shape3::new(
                            base.origin.time + local.origin.time,
                            base.origin.beam + local.origin.beam,
                            base.origin.freq + local.origin.freq,
                        ),
                        local.shape,
                    );

                    let res = source.read_blob(region).map(|blob| {
                        metrics.blobs_read.fetch_add(1, Ordering::Relaxed);
                        metrics
                            .bytes_read
                            .fetch_add(blob.data.len() as u64, Ordering::Relaxed);
                        (local, blob)
                    });

                    let failed = res.is_err();
                    if tx.send(res).is_err() || failed {
                        break;
                    }
                }
            });

            // Цикл записи (текущий поток)
            let mut written = 0usize;

            for res in rx.iter() {
                let (local, mut blob) = res?;

                let origin_freq = if flip {
                    blob.reverse_channels();
                    mirror_channel_range(local.origin.freq, local.shape.freq, width)
                } else {
                    local.origin.freq
                };
                blob.region = Region::new(
                    Shape3::new(local.origin.time, local.origin.beam, origin_freq),
                    local.shape,
                );

                if let Some(n_coarse) = dc_coarse {
                    blank_blob(&mut blob, n_coarse, sink_order)?;
                }

                let stats = sink.write_blob(&blob)?;
                written += 1;

                metrics.blobs_written.fetch_add(1, Ordering::Relaxed);
                metrics.bytes_written.fetch_add(stats.bytes, Ordering::Relaxed);
                metrics.chunks_written.fetch_add(stats.chunks, Ordering::Relaxed);
                if let Some(mask) = &blob.mask {
                    let flagged = mask.iter().filter(|&&m| m != 0).count() as u64;
                    metrics.samples_flagged.fetch_add(flagged, Ordering::Relaxed);
                }

                info!("Blob {written}/{} written at {}", plan.count, blob.region.origin);
            }

            let interrupted = stop.load(Ordering::Relaxed) && written < plan.count;
            if interrupted {
                warn!("Stop signal received after {written} of {} blobs", plan.count);
            }

            Ok((written, interrupted))
        })
    }

    /// Число грубых каналов для DC-бланкинга или `None`, если бланкинг не
    /// выполняется.
    fn dc_coarse_channels<Src: BlobSource + ?Sized>(
        &self,
        source: &Src,
        plan: &BlobPlan,
    ) -> FilbankResult<Option<usize>> {
        if !self.config.blank_dc {
            return Ok(None);
        }

        let nchans = source.dataset_shape().freq;
        if plan.blob.freq != nchans {
            warn!(
                "DC blanking skipped: blobs of {} channels do not span the {nchans}-channel band",
                plan.blob.freq
            );
            return Ok(None);
        }

        let bw = nchans as f64 * source.header().foff()?.abs();
        let n_coarse = estimate_coarse_channels(bw, self.config.coarse_channel_bw_mhz);

        if n_coarse == 0 || nchans % n_coarse != 0 || nchans / n_coarse < 2 {
            warn!("DC blanking skipped: {n_coarse} coarse channels do not tile {nchans} channels");
            return Ok(None);
        }

        debug!("DC blanking with {n_coarse} coarse channels over {bw} MHz");

        Ok(Some(n_coarse))
    }

    fn set_state(
        &self,
        state: EngineState,
    ) {
        debug!("Engine state -> {state:?}");
        *self.state.lock() = state;
    }
}

/// Бланкинг DC по строкам блоба: блоб содержит лишь часть интеграций,
/// поэтому медиана считается для каждого спектра отдельно. Грубые каналы
/// отсчитываются по возрастанию частоты.
fn blank_blob(
    blob: &mut Blob,
    n_coarse: usize,
    order: AxisDirection,
) -> FilbankResult<()> {
    let descending = order.is_descending();

    if descending {
        blob.reverse_channels();
    }

    let mut data = blob.to_array()?;
    blank_dc_rows(&mut data, n_coarse)?;
    blob.store_array(&data);

    if descending {
        blob.reverse_channels();
    }

    Ok(())
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl BlobSource for FilterbankReader {
    fn header(&self) -> &Header {
        FilterbankReader::header(self)
    }

    fn format(&self) -> SampleFormat {
        FilterbankReader::format(self)
    }

    fn dataset_shape(&self) -> Shape3 {
        self.file_shape()
    }

    fn selection(&self) -> &ResolvedSelection {
        FilterbankReader::selection(self)
    }

    fn storage_order(&self) -> AxisDirection {
        FilterbankReader::storage_order(self)
    }

    fn read_blob(
        &self,
        region: Region,
    ) -> FilbankResult<Blob> {
        FilterbankReader::read_blob(self, region)
    }
}

impl<S: BlobStore> BlobSource for FilterbankContainer<S> {
    fn header(&self) -> &Header {
        FilterbankContainer::header(self)
    }

    fn format(&self) -> SampleFormat {
        FilterbankContainer::format(self)
    }

    fn dataset_shape(&self) -> Shape3 {
        self.shape()
    }

    fn selection(&self) -> &ResolvedSelection {
        FilterbankContainer::selection(self)
    }

    fn storage_order(&self) -> AxisDirection {
        AxisDirection::Ascending
    }

    fn read_blob(
        &self,
        region: Region,
    ) -> FilbankResult<Blob> {
        FilterbankContainer::read_blob(self, region)
    }
}

impl BlobSink for FilterbankWriter {
    fn shape(&self) -> Shape3 {
        FilterbankWriter::shape(self)
    }

    fn format(&self) -> SampleFormat {
        FilterbankWriter::format(self)
    }

    fn storage_order(&self) -> AxisDirection {
        self.direction()
    }

    fn write_blob(
        &mut self,
        blob: &Blob,
    ) -> FilbankResult<WriteStats> {
        let bytes = FilterbankWriter::write_blob(self, blob)?;
        Ok(WriteStats { chunks: 0, bytes })
    }

    fn finalize(&mut self) -> FilbankResult<()> {
        self.finish()
    }
}

impl<S: BlobStore> BlobSink for ContainerWriter<S> {
    fn shape(&self) -> Shape3 {
        ContainerWriter::shape(self)
    }

    fn format(&self) -> SampleFormat {
        ContainerWriter::format(self)
    }

    fn storage_order(&self) -> AxisDirection {
        AxisDirection::Ascending
    }

    fn write_blob(
        &mut self,
        blob: &Blob,
    ) -> FilbankResult<WriteStats> {
        ContainerWriter::write_blob(self, blob)
    }

    fn finalize(&mut self) -> FilbankResult<()> {
        ContainerWriter::finalize(self)
    }
}
