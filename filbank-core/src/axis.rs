//! Частотная и временная оси по заголовку.

use std::ops::Range;

use filbank_types::{Axis, FilbankResult, Header};
use log::debug;

use crate::selection::{resolve, IndexWindow};

/// Секунд в сутках (временная ось в MJD).
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Направление частотной оси в порядке хранения.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisDirection {
    Ascending,
    Descending,
}

/// Частотная ось выборки.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyAxis {
    /// Частоты по возрастанию, МГц
    pub values: Vec<f64>,
    /// Диапазон каналов в порядке файла
    pub range: Range<usize>,
    /// Направление оси на диске
    pub direction: AxisDirection,
}

impl AxisDirection {
    pub fn from_foff(foff: f64) -> Self {
        if foff < 0.0 {
            AxisDirection::Descending
        } else {
            AxisDirection::Ascending
        }
    }

    pub fn is_descending(&self) -> bool {
        matches!(self, AxisDirection::Descending)
    }
}

/// Строит частотную ось для окна `[f_start, f_stop]` (МГц).
///
/// Индексы считаются как `floor((f - fch1) / foff)`; при `foff < 0` пара
/// индексов упорядочивается, а последовательность `fch1 + foff*i`
/// разворачивается, так что `values` всегда по возрастанию, а `range`
/// остаётся в порядке файла.
pub fn frequency_axis(
    header: &Header,
    f_start: Option<f64>,
    f_stop: Option<f64>,
) -> FilbankResult<FrequencyAxis> {
    let fch1 = header.fch1()?;
    let foff = header.foff()?;
    let nchans = header.nchans()?;
    let direction = AxisDirection::from_foff(foff);

    let to_index = |f: f64| ((f - fch1) / foff).floor() as i64;

    let window = IndexWindow::new(f_start.map(to_index), f_stop.map(to_index));
    let range = resolve(window, nchans, direction, Axis::Frequency)?;

    debug!(
        "Frequency window {f_start:?}..{f_stop:?} MHz -> channels {range:?} ({direction:?})"
    );

    let mut values: Vec<f64> = range.clone().map(|i| fch1 + foff * i as f64).collect();

    if direction.is_descending() {
        values.reverse();
    }

    Ok(FrequencyAxis {
        values,
        range,
        direction,
    })
}

/// Метки времени (MJD) для интеграций `range`: `tstart + i*tsamp/86400`.
pub fn time_axis(
    header: &Header,
    range: Range<usize>,
) -> FilbankResult<Vec<f64>> {
    let tstart = header.tstart()?;
    let tsamp = header.tsamp()?;

    Ok(range
        .map(|i| tstart + i as f64 * tsamp / SECONDS_PER_DAY)
        .collect())
}
