//! Коррекция DC-бинов грубых каналов.
//!
//! Полоса приёмника нарезана на грубые каналы одинаковой ширины; в центре
//! каждого из них оцифровщик оставляет выброс (DC-бин). Бин заменяется
//! медианой следующих за ним каналов.

use filbank_types::{FilbankError, FilbankResult};
use log::debug;
use ndarray::{s, Array3, Axis};

/// Ширина грубого канала по умолчанию, МГц
pub const COARSE_CHANNEL_BW_MHZ: f64 = 2.9296875;

/// Сколько каналов за DC-бином берётся в медиану
pub const DC_MEDIAN_WINDOW: usize = 9;

/// Заменяет DC-бин каждого грубого канала медианой следующих
/// [`DC_MEDIAN_WINDOW`] каналов (окно обрезается по концу грубого канала).
///
/// Окно берётся сразу по всем строкам времени и луча: на грубый канал
/// вычисляется одна медиана, и ею заполняется весь столбец DC-бина.
/// Требует всю частотную ось файла.
pub fn blank_dc(
    data: &mut Array3<f32>,
    n_coarse_chan: usize,
) -> FilbankResult<()> {
    let (per_coarse, mid) = dc_layout(data.len_of(Axis(2)), n_coarse_chan)?;
    let n_rows = data.len_of(Axis(0)) * data.len_of(Axis(1));

    if n_rows == 0 {
        return Ok(());
    }

    let mut window = Vec::with_capacity(DC_MEDIAN_WINDOW * n_rows);

    for band in 0..n_coarse_chan {
        let start = band * per_coarse;
        let dc = start + mid;
        let end = (dc + 1 + DC_MEDIAN_WINDOW).min(start + per_coarse);

        window.clear();
        window.extend(data.slice(s![.., .., dc + 1..end]).iter().copied());

        let value = median(&mut window);
        data.slice_mut(s![.., .., dc]).fill(value);
    }

    Ok(())
}

/// То же, что [`blank_dc`], но медиана считается отдельно для каждого
/// спектра (строки времени и луча). Используется при поблобовой
/// конвертации, где все интеграции сразу недоступны.
pub fn blank_dc_rows(
    data: &mut Array3<f32>,
    n_coarse_chan: usize,
) -> FilbankResult<()> {
    let (per_coarse, mid) = dc_layout(data.len_of(Axis(2)), n_coarse_chan)?;
    let mut window = Vec::with_capacity(DC_MEDIAN_WINDOW);

    for mut spectrum in data.rows_mut() {
        for band in 0..n_coarse_chan {
            let start = band * per_coarse;
            let dc = start + mid;
            let end = (dc + 1 + DC_MEDIAN_WINDOW).min(start + per_coarse);

            window.clear();
            window.extend((dc + 1..end).map(|i| spectrum[i]));

            spectrum[dc] = median(&mut window);
        }
    }

    Ok(())
}

// (каналов в грубом канале, смещение DC-бина от начала грубого канала)
fn dc_layout(
    n_chan: usize,
    n_coarse_chan: usize,
) -> FilbankResult<(usize, usize)> {
    if n_coarse_chan == 0 || n_chan % n_coarse_chan != 0 {
        return Err(FilbankError::InvalidCoarseChannels(format!(
            "{n_coarse_chan} coarse channels do not divide {n_chan} channels"
        )));
    }

    let per_coarse = n_chan / n_coarse_chan;
    if per_coarse < 2 {
        return Err(FilbankError::InvalidCoarseChannels(format!(
            "{per_coarse} channel(s) per coarse channel, need at least 2"
        )));
    }

    let mid = per_coarse / 2 - 1;
    debug!("Blanking DC bins: {n_coarse_chan} coarse channels of {per_coarse}, offset {mid}");

    Ok((per_coarse, mid))
}

/// Оценка числа грубых каналов в полосе: `round(bandwidth / coarse_bw)`.
pub fn estimate_coarse_channels(
    bandwidth_mhz: f64,
    coarse_bw_mhz: f64,
) -> usize {
    if coarse_bw_mhz <= 0.0 {
        return 0;
    }

    (bandwidth_mhz.abs() / coarse_bw_mhz).round() as usize
}

// Медиана; для чётного числа - среднее двух средних значений
fn median(values: &mut [f32]) -> f32 {
    values.sort_unstable_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}
