//! Разрешение окон выборки в диапазоны индексов.
//!
//! Окно задаётся в индексах на диске (частота уже пересчитана из МГц, см.
//! [`crate::axis`]); результат - полуинтервал `start..stop`, всегда
//! `start < stop`, внутри `[0, axis_length]`.

use std::ops::Range;

use filbank_types::{Axis, FilbankError, FilbankResult, Header, HeaderValue, Region, Shape3};
use log::{debug, warn};

use crate::axis::{frequency_axis, time_axis, AxisDirection};

/// Окно по одной оси в индексах на диске. Отсутствующая граница означает
/// край оси (какой именно - зависит от направления).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexWindow {
    pub start: Option<i64>,
    pub stop: Option<i64>,
}

/// Пользовательский запрос: частоты в МГц, время в номерах интеграций.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SelectionRequest {
    pub f_start: Option<f64>,
    pub f_stop: Option<f64>,
    pub t_start: Option<u64>,
    pub t_stop: Option<u64>,
}

/// Разрешённая выборка: диапазоны в порядке файла и оси для вызывающего.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSelection {
    /// Каналы в порядке файла (по `fch1 + foff*i`)
    pub freq: Range<usize>,
    /// Интеграции
    pub time: Range<usize>,
    /// Число лучей/IF (выбираются все)
    pub beams: usize,
    /// Направление частотной оси в заголовке
    pub direction: AxisDirection,
    /// Частоты выборки по возрастанию, МГц
    pub freqs: Vec<f64>,
    /// Метки времени выборки, MJD
    pub timestamps: Vec<f64>,
}

impl IndexWindow {
    pub fn new(
        start: Option<i64>,
        stop: Option<i64>,
    ) -> Self {
        Self { start, stop }
    }

    pub fn full() -> Self {
        Self::default()
    }
}

impl SelectionRequest {
    pub fn full() -> Self {
        Self::default()
    }

    pub fn with_freq(
        mut self,
        f_start: Option<f64>,
        f_stop: Option<f64>,
    ) -> Self {
        self.f_start = f_start;
        self.f_stop = f_stop;
        self
    }

    pub fn with_time(
        mut self,
        t_start: Option<u64>,
        t_stop: Option<u64>,
    ) -> Self {
        self.t_start = t_start;
        self.t_stop = t_stop;
        self
    }
}

/// Разрешает окно в диапазон индексов на диске.
///
/// Недостающие границы заполняются краями оси: для возрастающей оси
/// `start -> 0`, `stop -> len`; для убывающей наоборот (частота растёт к
/// нулевому индексу). Перевёрнутая пара упорядочивается. Окно, частично
/// выходящее за ось, обрезается; окно целиком вне оси - ошибка.
pub fn resolve(
    window: IndexWindow,
    axis_length: usize,
    direction: AxisDirection,
    axis: Axis,
) -> FilbankResult<Range<usize>> {
    let len = axis_length as i64;

    let (default_start, default_stop) = match direction {
        AxisDirection::Ascending => (0, len),
        AxisDirection::Descending => (len, 0),
    };

    let a = window.start.unwrap_or(default_start);
    let b = window.stop.unwrap_or(default_stop);
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };

    if lo == hi {
        return Err(FilbankError::EmptySelection { axis, at: lo });
    }

    if hi <= 0 || lo >= len {
        return Err(FilbankError::OutOfRange {
            axis,
            start: lo,
            stop: hi,
            len: axis_length,
        });
    }

    let range = lo.max(0) as usize..hi.min(len) as usize;

    if range.start != lo as usize || range.end != hi as usize {
        debug!("{axis} window [{lo}, {hi}) clamped to {range:?}");
    }

    Ok(range)
}

impl ResolvedSelection {
    /// Разрешает запрос против заголовка и числа интеграций в данных.
    pub fn resolve(
        header: &Header,
        n_ints: usize,
        request: &SelectionRequest,
    ) -> FilbankResult<Self> {
        let faxis = frequency_axis(header, request.f_start, request.f_stop)?;

        let unbounded_time = request.t_start.is_none() && request.t_stop.is_none();

        // Заголовок без данных: ось времени пуста, но файл открывается
        let time = if n_ints == 0 && unbounded_time {
            warn!("No complete integrations in data, time axis is empty");
            0..0
        } else {
            resolve(
                IndexWindow::new(
                    request.t_start.map(|t| t as i64),
                    request.t_stop.map(|t| t as i64),
                ),
                n_ints,
                AxisDirection::Ascending,
                Axis::Time,
            )?
        };
        let timestamps = time_axis(header, time.clone())?;

        Ok(Self {
            freq: faxis.range,
            time,
            beams: header.nifs()?,
            direction: faxis.direction,
            freqs: faxis.values,
            timestamps,
        })
    }

    /// Форма выборки `(time, beam, freq)`.
    pub fn shape(&self) -> Shape3 {
        Shape3::new(self.time.len(), self.beams, self.freq.len())
    }

    /// Выборка как регион хранилища, в котором каналы лежат в порядке
    /// `storage` (`n_chans` - полная частотная ось хранилища).
    pub fn storage_region(
        &self,
        n_chans: usize,
        storage: AxisDirection,
    ) -> Region {
        let f0 = if storage == self.direction {
            self.freq.start
        } else {
            n_chans - self.freq.end
        };

        Region::new(
            Shape3::new(self.time.start, 0, f0),
            self.shape(),
        )
    }

    /// Заголовок, описывающий только выбранные данные: `fch1`, `nchans`,
    /// `tstart` и `nsamples` переписываются, направление `foff` сохраняется.
    pub fn sub_header(
        &self,
        header: &Header,
    ) -> FilbankResult<Header> {
        let mut out = header.clone();

        let fch1 = header.fch1()? + header.foff()? * self.freq.start as f64;
        let tstart = header.tstart()? + self.time.start as f64 * header.tsamp()? / 86_400.0;

        out.insert("fch1", HeaderValue::Double(fch1));
        out.insert("nchans", HeaderValue::count("nchans", self.freq.len())?);
        out.insert("tstart", HeaderValue::Double(tstart));
        out.insert("nsamples", HeaderValue::count("nsamples", self.time.len())?);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults_cover_axis() {
        let r = resolve(IndexWindow::full(), 16, AxisDirection::Ascending, Axis::Time).unwrap();
        assert_eq!(r, 0..16);

        let r = resolve(IndexWindow::full(), 16, AxisDirection::Descending, Axis::Frequency).unwrap();
        assert_eq!(r, 0..16);
    }

    #[test]
    fn test_resolve_missing_bound_depends_on_direction() {
        // Убывающая ось: start без stop уходит к индексу 0
        let r = resolve(
            IndexWindow::new(Some(5), None),
            16,
            AxisDirection::Descending,
            Axis::Frequency,
        )
        .unwrap();
        assert_eq!(r, 0..5);

        let r = resolve(
            IndexWindow::new(Some(5), None),
            16,
            AxisDirection::Ascending,
            Axis::Frequency,
        )
        .unwrap();
        assert_eq!(r, 5..16);
    }

    #[test]
    fn test_resolve_reversed_pair_is_sorted() {
        let r = resolve(
            IndexWindow::new(Some(9), Some(3)),
            16,
            AxisDirection::Ascending,
            Axis::Time,
        )
        .unwrap();
        assert_eq!(r, 3..9);
    }

    #[test]
    fn test_resolve_clamps_partial_overlap() {
        let r = resolve(
            IndexWindow::new(Some(-4), Some(40)),
            16,
            AxisDirection::Ascending,
            Axis::Frequency,
        )
        .unwrap();
        assert_eq!(r, 0..16);
    }

    #[test]
    fn test_resolve_outside_axis() {
        let err = resolve(
            IndexWindow::new(Some(20), Some(30)),
            16,
            AxisDirection::Ascending,
            Axis::Time,
        )
        .unwrap_err();
        assert!(matches!(err, FilbankError::OutOfRange { axis: Axis::Time, .. }));

        let err = resolve(
            IndexWindow::new(Some(-10), Some(0)),
            16,
            AxisDirection::Ascending,
            Axis::Time,
        )
        .unwrap_err();
        assert!(matches!(err, FilbankError::OutOfRange { .. }));
    }

    #[test]
    fn test_resolve_empty_window() {
        let err = resolve(
            IndexWindow::new(Some(4), Some(4)),
            16,
            AxisDirection::Ascending,
            Axis::Frequency,
        )
        .unwrap_err();
        assert!(matches!(err, FilbankError::EmptySelection { at: 4, .. }));
    }

    #[test]
    fn test_resolved_bounds_invariant() {
        for len in [1usize, 2, 7, 64] {
            for a in -3i64..(len as i64 + 3) {
                for b in -3i64..(len as i64 + 3) {
                    if let Ok(r) = resolve(
                        IndexWindow::new(Some(a), Some(b)),
                        len,
                        AxisDirection::Ascending,
                        Axis::Time,
                    ) {
                        assert!(r.start < r.end && r.end <= len, "{a} {b} -> {r:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_selection_from_request() {
        let h = Header::new_filterbank(1420.0, -0.5, 4, 60_000.0, 86.4, 8).unwrap();
        let req = SelectionRequest::full()
            .with_freq(Some(1419.0), Some(1420.0))
            .with_time(Some(2), Some(5));

        let sel = ResolvedSelection::resolve(&h, 10, &req).unwrap();

        assert_eq!(sel.freq, 0..2);
        assert_eq!(sel.time, 2..5);
        assert_eq!(sel.shape(), Shape3::new(3, 1, 2));
        assert_eq!(sel.freqs, vec![1419.5, 1420.0]);
        assert_eq!(sel.timestamps.len(), 3);
        assert!((sel.timestamps[0] - 60_000.002).abs() < 1e-9);
    }

    #[test]
    fn test_storage_region_mirrors_descending() {
        let h = Header::new_filterbank(1420.0, -0.5, 8, 60_000.0, 1.0, 8).unwrap();
        let req = SelectionRequest::full().with_freq(Some(1418.0), Some(1419.5));
        let sel = ResolvedSelection::resolve(&h, 4, &req).unwrap();

        // индексы на диске: floor(4)=4, floor(1)=1 -> 1..4
        assert_eq!(sel.freq, 1..4);

        let native = sel.storage_region(8, AxisDirection::Descending);
        assert_eq!(native.origin.freq, 1);

        let ascending = sel.storage_region(8, AxisDirection::Ascending);
        assert_eq!(ascending.origin.freq, 4);
        assert_eq!(ascending.shape.freq, 3);
    }

    #[test]
    fn test_empty_time_axis_without_data() {
        let h = Header::new_filterbank(1420.0, -0.5, 8, 60_000.0, 1.0, 8).unwrap();

        let sel = ResolvedSelection::resolve(&h, 0, &SelectionRequest::full()).unwrap();
        assert_eq!(sel.time, 0..0);
        assert_eq!(sel.shape(), Shape3::new(0, 1, 8));
        assert!(sel.timestamps.is_empty());

        // явное окно по пустой оси остаётся ошибкой
        let req = SelectionRequest::full().with_time(Some(0), Some(1));
        assert!(matches!(
            ResolvedSelection::resolve(&h, 0, &req),
            Err(FilbankError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_sub_header_rejects_counts_beyond_int32() {
        let h = Header::new_filterbank(1420.0, -0.5, 8, 60_000.0, 1.0, 8).unwrap();
        let mut sel = ResolvedSelection::resolve(&h, 4, &SelectionRequest::full()).unwrap();
        sel.time = 0..i32::MAX as usize + 1;

        assert!(matches!(
            sel.sub_header(&h),
            Err(FilbankError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_sub_header_rewrites_coordinates() {
        let h = Header::new_filterbank(1420.0, -0.5, 8, 60_000.0, 864.0, 8).unwrap();
        let req = SelectionRequest::full()
            .with_freq(Some(1418.0), Some(1419.5))
            .with_time(Some(10), Some(20));
        let sel = ResolvedSelection::resolve(&h, 100, &req).unwrap();

        let sub = sel.sub_header(&h).unwrap();

        assert_eq!(sub.fch1().unwrap(), 1419.5);
        assert_eq!(sub.foff().unwrap(), -0.5);
        assert_eq!(sub.nchans().unwrap(), 3);
        assert_eq!(sub.int("nsamples").unwrap(), 10);
        assert!((sub.tstart().unwrap() - 60_000.1).abs() < 1e-9);
    }
}
