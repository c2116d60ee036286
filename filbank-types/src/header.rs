//! Модель sigproc заголовка: таблица известных ключей и типизированные
//! значения.

use std::collections::BTreeMap;

use crate::{FilbankError, FilbankResult, SampleFormat};

/// Тип значения ключа заголовка.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    /// 32-битное целое (little-endian)
    Int,
    /// 64-битное число с плавающей точкой
    Double,
    /// Угол в упакованном sigproc виде `ddmmss.s` (f64)
    Angle,
    /// Строка с префиксом длины
    Str,
    /// Один байт
    Byte,
}

/// Таблица известных ключей sigproc в каноническом порядке записи.
pub const HEADER_SCHEMA: &[(&str, HeaderKind)] = &[
    ("telescope_id", HeaderKind::Int),
    ("machine_id", HeaderKind::Int),
    ("data_type", HeaderKind::Int),
    ("rawdatafile", HeaderKind::Str),
    ("source_name", HeaderKind::Str),
    ("barycentric", HeaderKind::Int),
    ("pulsarcentric", HeaderKind::Int),
    ("az_start", HeaderKind::Double),
    ("za_start", HeaderKind::Double),
    ("src_raj", HeaderKind::Angle),
    ("src_dej", HeaderKind::Angle),
    ("tstart", HeaderKind::Double),
    ("tsamp", HeaderKind::Double),
    ("nbits", HeaderKind::Int),
    ("nsamples", HeaderKind::Int),
    ("fch1", HeaderKind::Double),
    ("foff", HeaderKind::Double),
    ("nchans", HeaderKind::Int),
    ("nifs", HeaderKind::Int),
    ("refdm", HeaderKind::Double),
    ("period", HeaderKind::Double),
    ("nbeams", HeaderKind::Int),
    ("ibeam", HeaderKind::Int),
    ("signed", HeaderKind::Byte),
];

/// Возвращает тип известного ключа или `None`.
pub fn schema_kind(key: &str) -> Option<HeaderKind> {
    HEADER_SCHEMA
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, kind)| *kind)
}

/// Угол в упакованном sigproc представлении (`hhmmss.s` для RA, `ddmmss.s`
/// для DEC).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Angle(pub f64);

/// Значение поля заголовка.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Int(i32),
    Double(f64),
    Angle(Angle),
    Str(String),
    Byte(u8),
    /// Атрибут контейнера вне таблицы ключей (JSON текст). В плоский файл не
    /// записывается.
    Opaque(String),
}

/// Заголовок filterbank файла: отображение имя поля → типизированное значение.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    fields: BTreeMap<String, HeaderValue>,
}

impl Angle {
    /// Раскладывает упакованное значение на (знак, градусы/часы, минуты,
    /// секунды).
    pub fn components(self) -> (f64, u32, u32, f64) {
        let sign = if self.0 < 0.0 { -1.0 } else { 1.0 };
        let v = self.0.abs();
        let whole = (v / 10_000.0).floor();
        let minutes = ((v - whole * 10_000.0) / 100.0).floor();
        let seconds = v - whole * 10_000.0 - minutes * 100.0;

        (sign, whole as u32, minutes as u32, seconds)
    }

    /// Значение в единицах старшего разряда (часы или градусы).
    pub fn to_units(self) -> f64 {
        let (sign, whole, minutes, seconds) = self.components();

        sign * (whole as f64 + minutes as f64 / 60.0 + seconds / 3600.0)
    }

    /// Строка вида `12:34:56.7800`.
    pub fn to_sexagesimal(self) -> String {
        let (sign, whole, minutes, seconds) = self.components();
        let prefix = if sign < 0.0 { "-" } else { "" };

        format!("{prefix}{whole:02}:{minutes:02}:{seconds:07.4}")
    }
}

impl HeaderValue {
    /// Целое поле-счётчик. Значения, не влезающие в `int32`, отклоняются.
    pub fn count(
        key: &str,
        n: usize,
    ) -> FilbankResult<Self> {
        i32::try_from(n)
            .map(HeaderValue::Int)
            .map_err(|_| FilbankError::malformed(format!("{key} = {n} does not fit into int32")))
    }

    pub fn kind(&self) -> Option<HeaderKind> {
        match self {
            HeaderValue::Int(_) => Some(HeaderKind::Int),
            HeaderValue::Double(_) => Some(HeaderKind::Double),
            HeaderValue::Angle(_) => Some(HeaderKind::Angle),
            HeaderValue::Str(_) => Some(HeaderKind::Str),
            HeaderValue::Byte(_) => Some(HeaderKind::Byte),
            HeaderValue::Opaque(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Int(v) => Some(*v as f64),
            HeaderValue::Double(v) => Some(*v),
            HeaderValue::Angle(a) => Some(a.0),
            HeaderValue::Byte(v) => Some(*v as f64),
            HeaderValue::Str(_) | HeaderValue::Opaque(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HeaderValue::Int(v) => Some(*v as i64),
            HeaderValue::Byte(v) => Some(*v as i64),
            _ => None,
        }
    }
}

impl std::fmt::Display for HeaderValue {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            HeaderValue::Int(v) => write!(f, "{v}"),
            HeaderValue::Double(v) => write!(f, "{v}"),
            HeaderValue::Angle(a) => write!(f, "{}", a.to_sexagesimal()),
            HeaderValue::Str(s) => write!(f, "{s}"),
            HeaderValue::Byte(v) => write!(f, "{v}"),
            HeaderValue::Opaque(s) => write!(f, "{s}"),
        }
    }
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Минимальный заголовок с координатными полями.
    pub fn new_filterbank(
        fch1: f64,
        foff: f64,
        nchans: usize,
        tstart: f64,
        tsamp: f64,
        nbits: u32,
    ) -> FilbankResult<Self> {
        let mut h = Header::new();

        h.insert("fch1", HeaderValue::Double(fch1));
        h.insert("foff", HeaderValue::Double(foff));
        h.insert("nchans", HeaderValue::count("nchans", nchans)?);
        h.insert("tstart", HeaderValue::Double(tstart));
        h.insert("tsamp", HeaderValue::Double(tsamp));
        h.insert("nbits", HeaderValue::count("nbits", nbits as usize)?);
        h.insert("nifs", HeaderValue::Int(1));
        Ok(h)
    }

    pub fn insert<K: Into<String>>(
        &mut self,
        key: K,
        value: HeaderValue,
    ) -> Option<HeaderValue> {
        self.fields.insert(key.into(), value)
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Option<&HeaderValue> {
        self.fields.get(key)
    }

    pub fn remove(
        &mut self,
        key: &str,
    ) -> Option<HeaderValue> {
        self.fields.remove(key)
    }

    pub fn contains(
        &self,
        key: &str,
    ) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &HeaderValue)> {
        self.fields.iter()
    }

    /// Числовое поле как f64.
    pub fn double(
        &self,
        key: &str,
    ) -> FilbankResult<f64> {
        self.get(key)
            .ok_or_else(|| FilbankError::malformed(format!("missing key {key}")))?
            .as_f64()
            .ok_or_else(|| FilbankError::malformed(format!("key {key} is not numeric")))
    }

    /// Целое поле.
    pub fn int(
        &self,
        key: &str,
    ) -> FilbankResult<i64> {
        self.get(key)
            .ok_or_else(|| FilbankError::malformed(format!("missing key {key}")))?
            .as_i64()
            .ok_or_else(|| FilbankError::malformed(format!("key {key} is not an integer")))
    }

    pub fn fch1(&self) -> FilbankResult<f64> {
        self.double("fch1")
    }

    pub fn foff(&self) -> FilbankResult<f64> {
        self.double("foff")
    }

    pub fn tstart(&self) -> FilbankResult<f64> {
        self.double("tstart")
    }

    pub fn tsamp(&self) -> FilbankResult<f64> {
        self.double("tsamp")
    }

    pub fn nchans(&self) -> FilbankResult<usize> {
        let n = self.int("nchans")?;

        if n <= 0 {
            return Err(FilbankError::malformed(format!("nchans must be > 0, got {n}")));
        }

        Ok(n as usize)
    }

    /// Число IF/лучей; отсутствующий ключ означает один.
    pub fn nifs(&self) -> FilbankResult<usize> {
        match self.get("nifs") {
            None => Ok(1),
            Some(_) => {
                let n = self.int("nifs")?;
                if n <= 0 {
                    return Err(FilbankError::malformed(format!("nifs must be > 0, got {n}")));
                }
                Ok(n as usize)
            }
        }
    }

    pub fn nbits(&self) -> FilbankResult<u32> {
        let n = self.int("nbits")?;

        u32::try_from(n).map_err(|_| FilbankError::malformed(format!("invalid nbits {n}")))
    }

    pub fn sample_format(&self) -> FilbankResult<SampleFormat> {
        SampleFormat::from_nbits(self.nbits()?)
    }

    pub fn source_name(&self) -> Option<&str> {
        match self.get("source_name") {
            Some(HeaderValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Проверяет инварианты координатных полей.
    pub fn validate(&self) -> FilbankResult<()> {
        self.sample_format()?;
        self.nchans()?;
        self.nifs()?;
        self.fch1()?;

        let foff = self.foff()?;
        if foff == 0.0 || !foff.is_finite() {
            return Err(FilbankError::malformed(format!("invalid foff {foff}")));
        }

        let tsamp = self.tsamp()?;
        if tsamp <= 0.0 || !tsamp.is_finite() {
            return Err(FilbankError::malformed(format!("invalid tsamp {tsamp}")));
        }

        self.tstart()?;
        Ok(())
    }

    /// Строки отчёта `info`: (ключ, значение), углы в sexagesimal.
    pub fn info_lines(&self) -> Vec<(String, String)> {
        self.iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }
}
