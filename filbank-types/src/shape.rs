//! Трёхмерные формы `(time, beam, freq)`: чанки, блобы и регионы.

use serde::{Deserialize, Serialize};

/// Протяжённость (или координата) по осям `(time, beam, freq)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape3 {
    pub time: usize,
    pub beam: usize,
    pub freq: usize,
}

/// Размер тайла контейнера.
///
/// `Auto` означает, что контейнер выбирает тайлинг сам (см.
/// `default_chunk_shape` в filbank-core).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkShape {
    Fixed(Shape3),
    Auto,
}

/// Единица чтения/записи при конвертации.
pub type BlobShape = Shape3;

/// Прямоугольная область: начало и протяжённость.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Region {
    pub origin: Shape3,
    pub shape: Shape3,
}

impl Shape3 {
    pub const fn new(
        time: usize,
        beam: usize,
        freq: usize,
    ) -> Self {
        Self { time, beam, freq }
    }

    pub fn as_array(&self) -> [usize; 3] {
        [self.time, self.beam, self.freq]
    }

    pub fn from_array(a: [usize; 3]) -> Self {
        Self::new(a[0], a[1], a[2])
    }

    /// Число элементов.
    pub fn len(&self) -> usize {
        self.time * self.beam * self.freq
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Размер в байтах при заданном размере выборки.
    pub fn bytes(
        &self,
        sample_size: usize,
    ) -> u64 {
        self.len() as u64 * sample_size as u64
    }

    /// Поэлементный минимум.
    pub fn min(
        &self,
        other: &Shape3,
    ) -> Shape3 {
        Shape3::new(
            self.time.min(other.time),
            self.beam.min(other.beam),
            self.freq.min(other.freq),
        )
    }
}

impl std::fmt::Display for Shape3 {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.time, self.beam, self.freq)
    }
}

impl ChunkShape {
    /// Конкретная форма: фиксированная или подобранная `auto`.
    pub fn resolve<F: FnOnce() -> Shape3>(
        self,
        auto: F,
    ) -> Shape3 {
        match self {
            ChunkShape::Fixed(s) => s,
            ChunkShape::Auto => auto(),
        }
    }
}

impl Region {
    pub fn new(
        origin: Shape3,
        shape: Shape3,
    ) -> Self {
        Self { origin, shape }
    }

    /// Регион, покрывающий всю форму.
    pub fn full(shape: Shape3) -> Self {
        Self::new(Shape3::default(), shape)
    }

    /// Исключительная верхняя граница.
    pub fn end(&self) -> Shape3 {
        Shape3::new(
            self.origin.time + self.shape.time,
            self.origin.beam + self.shape.beam,
            self.origin.freq + self.shape.freq,
        )
    }

    /// Пересечение двух регионов.
    pub fn intersect(
        &self,
        other: &Region,
    ) -> Option<Region> {
        let a0 = self.origin.as_array();
        let a1 = self.end().as_array();
        let b0 = other.origin.as_array();
        let b1 = other.end().as_array();

        let mut origin = [0usize; 3];
        let mut shape = [0usize; 3];

        for d in 0..3 {
            let lo = a0[d].max(b0[d]);
            let hi = a1[d].min(b1[d]);
            if lo >= hi {
                return None;
            }
            origin[d] = lo;
            shape[d] = hi - lo;
        }

        Some(Region::new(Shape3::from_array(origin), Shape3::from_array(shape)))
    }

    /// Содержится ли регион целиком внутри формы.
    pub fn fits_in(
        &self,
        shape: &Shape3,
    ) -> bool {
        let end = self.end();
        end.time <= shape.time && end.beam <= shape.beam && end.freq <= shape.freq
    }
}
