use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

/// Метрики конвертации, обновляемые lock-free из потока чтения и потока
/// записи.
#[derive(Debug, Default)]
pub struct ConversionMetrics {
    pub blobs_read: AtomicU64,
    pub blobs_written: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
    pub chunks_written: AtomicU64,
    pub samples_flagged: AtomicU64,
}

/// Snapshot метрик для отображения / тестирования.
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub duration_secs: f64,
    pub blobs_read: u64,
    pub blobs_written: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub chunks_written: u64,
    pub samples_flagged: u64,
    pub read_speed_mbps: f64,
    pub compression_ratio: f64,
}

impl ConversionMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Скорость чтения в МБ/с.
    pub fn read_speed_mbps(
        &self,
        elapsed: &Instant,
    ) -> f64 {
        let secs = elapsed.elapsed().as_secs_f64();

        if secs < 1e-9 {
            return 0.0;
        }

        self.bytes_read.load(Ordering::Relaxed) as f64 / secs / 1_000_000.0
    }

    /// Отношение прочитанных байт к записанным (>1 - данные сжались).
    pub fn compression_ratio(&self) -> f64 {
        let written = self.bytes_written.load(Ordering::Relaxed);

        if written == 0 {
            0.0
        } else {
            self.bytes_read.load(Ordering::Relaxed) as f64 / written as f64
        }
    }

    /// Итоговая сводка для вывода в конце конвертации.
    pub fn summary(
        &self,
        elapsed: &Instant,
    ) -> MetricsSummary {
        MetricsSummary {
            duration_secs: elapsed.elapsed().as_secs_f64(),
            blobs_read: self.blobs_read.load(Ordering::Relaxed),
            blobs_written: self.blobs_written.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            chunks_written: self.chunks_written.load(Ordering::Relaxed),
            samples_flagged: self.samples_flagged.load(Ordering::Relaxed),
            read_speed_mbps: self.read_speed_mbps(elapsed),
            compression_ratio: self.compression_ratio(),
        }
    }
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(f, "  Duration      : {:.1}s", self.duration_secs)?;
        writeln!(
            f,
            "  Blobs         : {} read, {} written",
            self.blobs_read, self.blobs_written
        )?;
        writeln!(f, "  Bytes read    : {:.1} MB", self.bytes_read as f64 / 1e6)?;
        writeln!(
            f,
            "  Bytes written : {:.1} MB",
            self.bytes_written as f64 / 1e6
        )?;
        writeln!(f, "  Chunks        : {}", self.chunks_written)?;
        writeln!(f, "  Flagged       : {}", self.samples_flagged)?;
        writeln!(f, "  Read speed    : {:.1} MB/s", self.read_speed_mbps)?;
        writeln!(f, "  Ratio         : {:.2}x", self.compression_ratio)?;
        write!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")
    }
}
