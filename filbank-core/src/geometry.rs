//! Геометрия ввода/вывода: чанки контейнера и блобы конвертации.
//!
//! Чанк - маленький тайл, сжимаемый независимо. Блоб - крупная единица
//! чтения/записи, кратная чанку и ограниченная бюджетом памяти.

use filbank_types::{BlobShape, ChunkShape, Region, Shape3};
use log::{debug, warn};

/// Бюджет блоба по умолчанию, МиБ
pub const MAX_BLOB_MB: usize = 256;

/// Целевой размер тайла, который контейнер выбирает сам (`ChunkShape::Auto`)
pub const AUTO_CHUNK_BYTES: usize = 1 << 20;

const MIB: u64 = 1 << 20;

/// Пресеты чанков по префиксам имён продуктов gpuspec.
const CHUNK_PRESETS: &[(&str, Shape3)] = &[
    // Высокое частотное разрешение
    ("gpuspec.0000.", Shape3::new(1, 1, 1_048_576)),
    // Высокое временное разрешение
    ("gpuspec.0001.", Shape3::new(512, 1, 2_048)),
    // Промежуточное разрешение
    ("gpuspec.0002.", Shape3::new(10, 1, 65_536)),
];

/// Порядок обхода блобов.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOrder {
    /// Блоб уже полосы: соседние блобы идут по частоте
    FrequencyMajor,
    /// Блоб покрывает всю полосу: блобы идут по времени
    TimeMajor,
}

/// Полный план конвертации одной выборки.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobPlan {
    pub chunk: Shape3,
    pub blob: BlobShape,
    pub selection: Shape3,
    pub count: usize,
    pub order: StreamOrder,
}

/// Пресет чанка по имени файла (или иной подсказке о продукте).
pub fn chunk_shape(hint: &str) -> ChunkShape {
    let name = hint.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(hint);

    match CHUNK_PRESETS.iter().find(|(prefix, _)| name.contains(prefix)) {
        Some((_, shape)) => ChunkShape::Fixed(*shape),
        None => {
            warn!("Unknown data product '{name}', container picks chunking");
            ChunkShape::Auto
        }
    }
}

/// Тайлинг контейнера по умолчанию: строки частоты целиком (до ~1 МиБ) и
/// столько интеграций, сколько помещается в тайл.
pub fn default_chunk_shape(
    dataset: Shape3,
    sample_size: usize,
) -> Shape3 {
    let per_tile = (AUTO_CHUNK_BYTES / sample_size.max(1)).max(1);
    let freq = dataset.freq.clamp(1, per_tile);
    let time = (per_tile / freq).clamp(1, dataset.time.max(1));

    Shape3::new(time, 1, freq)
}

/// Форма блоба по чанку, числу каналов и бюджету (МиБ):
/// `freq = min(n, chunk.freq * budget)`,
/// `time = chunk.time * budget * chunk.freq / freq`. Луч всегда один.
pub fn blob_shape(
    chunk: Shape3,
    n_channels: usize,
    budget_mb: usize,
) -> BlobShape {
    let budget = budget_mb.max(1);
    let freq = n_channels.min(chunk.freq * budget).max(1);
    let time = (chunk.time * budget * chunk.freq / freq).max(1);

    Shape3::new(time, 1, freq)
}

/// Вписывает блоб в выборку и в байтовый потолок.
///
/// Время обрезается по выборке. Если блоб всё ещё больше бюджета, сначала
/// уменьшается время (кратно чанку, если это возможно), затем частота.
pub fn fit_to_budget(
    blob: BlobShape,
    chunk: Shape3,
    selection: Shape3,
    sample_size: usize,
    budget_mb: usize,
) -> BlobShape {
    let budget = budget_mb.max(1) as u64 * MIB;
    let ss = sample_size.max(1) as u64;

    let mut fitted = Shape3::new(
        blob.time.clamp(1, selection.time.max(1)),
        1,
        blob.freq.clamp(1, selection.freq.max(1)),
    );

    if fitted.bytes(sample_size) <= budget {
        return fitted;
    }

    let row_bytes = fitted.freq as u64 * ss;
    let max_rows = (budget / row_bytes) as usize;

    if max_rows >= 1 {
        fitted.time = if max_rows >= chunk.time {
            max_rows / chunk.time * chunk.time
        } else {
            max_rows
        };
    } else {
        // Одна строка частоты не влезает: режем полосу
        let max_chans = ((budget / ss) as usize).max(1);
        fitted.time = 1;
        fitted.freq = if max_chans >= chunk.freq {
            max_chans / chunk.freq * chunk.freq
        } else {
            max_chans
        };
    }

    debug!("Blob {blob} shrunk to {fitted} for {budget_mb} MiB budget");
    fitted
}

/// Число блобов, покрывающих выборку.
pub fn blob_count(
    blob: BlobShape,
    selection: Shape3,
) -> usize {
    selection.time.div_ceil(blob.time.max(1))
        * selection.beam.div_ceil(blob.beam.max(1))
        * selection.freq.div_ceil(blob.freq.max(1))
}

impl BlobPlan {
    /// Планирует чанки и блобы для выборки `selection` из набора `dataset`.
    ///
    /// Чанк описывает хранилище выборки и обрезается по ней; полоса блоба
    /// считается по полной частотной оси набора.
    pub fn new(
        chunk: ChunkShape,
        dataset: Shape3,
        selection: Shape3,
        sample_size: usize,
        budget_mb: usize,
    ) -> Self {
        let chunk = chunk
            .resolve(|| default_chunk_shape(selection, sample_size))
            .min(&selection);
        let chunk = Shape3::new(chunk.time.max(1), chunk.beam.max(1), chunk.freq.max(1));

        let blob = blob_shape(chunk, dataset.freq.max(selection.freq), budget_mb);
        let blob = fit_to_budget(blob, chunk, selection, sample_size, budget_mb);

        let order = if blob.freq < selection.freq {
            StreamOrder::FrequencyMajor
        } else {
            StreamOrder::TimeMajor
        };

        let count = blob_count(blob, selection);

        debug!("Plan: chunk {chunk}, blob {blob}, {count} blobs, {order:?}");

        Self {
            chunk,
            blob,
            selection,
            count,
            order,
        }
    }

    /// Регион блоба `index` в координатах выборки (начало в нуле).
    pub fn region(
        &self,
        index: usize,
    ) -> Region {
        let n_freq = self.selection.freq.div_ceil(self.blob.freq);
        let n_beam = self.selection.beam.div_ceil(self.blob.beam);

        let f = index % n_freq;
        let rest = index / n_freq;
        let b = rest % n_beam;
        let t = rest / n_beam;

        let origin = Shape3::new(t * self.blob.time, b * self.blob.beam, f * self.blob.freq);
        let shape = Shape3::new(
            self.blob.time.min(self.selection.time - origin.time),
            self.blob.beam.min(self.selection.beam - origin.beam),
            self.blob.freq.min(self.selection.freq - origin.freq),
        );

        Region::new(origin, shape)
    }

    /// Все регионы по порядку: частота меняется быстрее всего, затем луч,
    /// затем время.
    pub fn regions(&self) -> impl Iterator<Item = Region> + '_ {
        (0..self.count).map(|i| self.region(i))
    }
}

/// Начало отражённого диапазона каналов: `[c_start, c_start + w)` оси
/// длины `n` переходит в `[n - c_start - w, n - c_start)`.
pub fn mirror_channel_range(
    c_start: usize,
    w: usize,
    n: usize,
) -> usize {
    n - (c_start % n) - w
}
