//! Блобы и материализованные выборки.

use filbank_types::{Axis as DataAxis, FilbankError, FilbankResult, Region, SampleFormat, Shape3};
use ndarray::{s, Array3, Axis};

use crate::spectral::{blank_dc, estimate_coarse_channels};

/// Одна единица ввода/вывода: регион в координатах хранилища источника,
/// сырые little-endian отсчёты и необязательная маска флагов.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub region: Region,
    pub format: SampleFormat,
    pub data: Vec<u8>,
    /// Один байт на отсчёт, 1 = отсчёт помечен. `None` - флагов нет.
    pub mask: Option<Vec<u8>>,
}

/// Выборка, целиком прочитанная в память. Частота по возрастанию.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSelection {
    /// `(time, beam, frequency)`
    pub data: Array3<f32>,
    /// Та же форма, 1 = отсчёт помечен
    pub mask: Array3<u8>,
    /// МГц, по возрастанию
    pub freqs: Vec<f64>,
    /// MJD
    pub timestamps: Vec<f64>,
    /// Ширина канала, МГц
    pub channel_bw_mhz: f64,
}

impl Blob {
    pub fn new(
        region: Region,
        format: SampleFormat,
        data: Vec<u8>,
    ) -> Self {
        Self {
            region,
            format,
            data,
            mask: None,
        }
    }

    pub fn with_mask(
        mut self,
        mask: Vec<u8>,
    ) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Проверяет, что размеры буферов соответствуют региону.
    pub fn check(&self) -> FilbankResult<()> {
        let n = self.region.shape.len();

        if self.data.len() != n * self.format.sample_size() {
            return Err(FilbankError::corrupted(format!(
                "blob {:?} carries {} data bytes, expected {}",
                self.region,
                self.data.len(),
                n * self.format.sample_size()
            )));
        }

        if let Some(mask) = &self.mask {
            if mask.len() != n {
                return Err(FilbankError::corrupted(format!(
                    "blob mask has {} bytes, expected {n}",
                    mask.len()
                )));
            }
        }

        Ok(())
    }

    /// Есть ли в блобе хотя бы один помеченный отсчёт.
    pub fn has_flags(&self) -> bool {
        self.mask.as_ref().is_some_and(|m| m.iter().any(|&b| b != 0))
    }

    /// Разворачивает порядок каналов в каждой строке `(time, beam)`.
    pub fn reverse_channels(&mut self) {
        let w = self.region.shape.freq;
        let ss = self.format.sample_size();

        if w < 2 {
            return;
        }

        for row in self.data.chunks_exact_mut(w * ss) {
            // Разворот байтов строки, затем обратно байтов каждого отсчёта
            row.reverse();
            for sample in row.chunks_exact_mut(ss) {
                sample.reverse();
            }
        }

        if let Some(mask) = &mut self.mask {
            for row in mask.chunks_exact_mut(w) {
                row.reverse();
            }
        }
    }

    /// Декодирует отсчёты в массив `(time, beam, frequency)`.
    pub fn to_array(&self) -> FilbankResult<Array3<f32>> {
        let s = self.region.shape;

        Array3::from_shape_vec((s.time, s.beam, s.freq), self.format.decode(&self.data))
            .map_err(|e| FilbankError::corrupted(format!("blob shape {s}: {e}")))
    }

    /// Маска как массив; без маски - нули.
    pub fn mask_array(&self) -> FilbankResult<Array3<u8>> {
        let s = self.region.shape;

        match &self.mask {
            Some(mask) => Array3::from_shape_vec((s.time, s.beam, s.freq), mask.clone())
                .map_err(|e| FilbankError::corrupted(format!("mask shape {s}: {e}"))),
            None => Ok(Array3::zeros((s.time, s.beam, s.freq))),
        }
    }

    /// Перекодирует значения массива обратно в байты блоба.
    pub fn store_array(
        &mut self,
        data: &Array3<f32>,
    ) {
        let values: Vec<f32> = data.iter().copied().collect();
        self.data = self.format.encode(&values);
    }
}

impl DataSelection {
    /// Собирает выборку из блоба хранилища. `descending` - каналы в блобе
    /// лежат по убыванию частоты и будут развёрнуты.
    pub fn from_blob(
        mut blob: Blob,
        descending: bool,
        freqs: Vec<f64>,
        timestamps: Vec<f64>,
        channel_bw_mhz: f64,
    ) -> FilbankResult<Self> {
        blob.check()?;

        if descending {
            blob.reverse_channels();
        }

        let data = blob.to_array()?;
        let mask = blob.mask_array()?;

        if freqs.len() != data.len_of(Axis(2)) || timestamps.len() != data.len_of(Axis(0)) {
            return Err(FilbankError::incompatible(
                blob.region.shape,
                (timestamps.len(), freqs.len()),
            ));
        }

        Ok(Self {
            data,
            mask,
            freqs,
            timestamps,
            channel_bw_mhz,
        })
    }

    pub fn shape(&self) -> Shape3 {
        let (t, b, f) = self.data.dim();
        Shape3::new(t, b, f)
    }

    /// Полоса выборки, МГц.
    pub fn bandwidth_mhz(&self) -> f64 {
        self.freqs.len() as f64 * self.channel_bw_mhz.abs()
    }

    /// Оценка числа грубых каналов в выборке.
    pub fn coarse_channels(
        &self,
        coarse_bw_mhz: f64,
    ) -> usize {
        estimate_coarse_channels(self.bandwidth_mhz(), coarse_bw_mhz)
    }

    /// Убирает DC-бины: одна медиана на грубый канал по всем интеграциям
    /// выборки. Имеет смысл только для полной частотной оси файла.
    pub fn blank_dc(
        &mut self,
        n_coarse_chan: usize,
    ) -> FilbankResult<()> {
        blank_dc(&mut self.data, n_coarse_chan)
    }

    /// Спектр интеграции `t` луча `beam`.
    pub fn spectrum(
        &self,
        t: usize,
        beam: usize,
    ) -> FilbankResult<Vec<f32>> {
        let s = self.shape();

        let (axis, index, len) = if t >= s.time {
            (DataAxis::Time, t, s.time)
        } else {
            (DataAxis::Beam, beam, s.beam)
        };

        if index >= len {
            return Err(FilbankError::OutOfRange {
                axis,
                start: index as i64,
                stop: index as i64 + 1,
                len,
            });
        }

        Ok(self.data.slice(s![t, beam, ..]).to_vec())
    }

    /// Спектр, усреднённый по времени, для луча `beam`.
    pub fn mean_spectrum(
        &self,
        beam: usize,
    ) -> Vec<f32> {
        let s = self.shape();

        if s.time == 0 || beam >= s.beam {
            return Vec::new();
        }

        self.data
            .index_axis(Axis(1), beam)
            .mean_axis(Axis(0))
            .map(|m| m.to_vec())
            .unwrap_or_default()
    }
}
