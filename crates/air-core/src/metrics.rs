//! Session telemetry: atomic counters shared between the tick/fill/prep
//! threads and whichever control-plane caller asks for `get_metrics`.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct SessionMetrics {
    pub frames_emitted_total: AtomicU64,
    pub pad_frames_emitted_total: AtomicU64,
    pub decode_faults_total: AtomicU64,
    /// A seam committed to pad because the prepared successor was not
    /// ready and the queue's next segment was not itself a pad — a
    /// genuine miss, distinct from an expected inline pad segment.
    pub seam_miss_count: AtomicU64,
    /// A seam committed to pad because the queue's next segment actually
    /// is a `Segment::Pad` — expected, not a miss.
    pub seam_inline_pad_count: AtomicU64,
    /// A seam committed to the prepared successor on schedule.
    pub seam_normal_count: AtomicU64,
    /// Every `OverrideCommit` decision, miss or inline pad alike — the
    /// coarse count of times the tick loop forced a pad rather than
    /// waiting for `NormalCommit`.
    pub seam_override_count: AtomicU64,
    /// The tick loop discovered a lookahead buffer empty after it had
    /// already committed to this tick's origin — see
    /// `air_core::seam_rule::vacuum_exception`.
    pub vacuum_exceptions_total: AtomicU64,
    pub buffer_underruns_total: AtomicU64,
    /// Current depth of the active content producer's video lookahead
    /// buffer. Zero while a pad producer is active.
    pub video_buffer_depth: AtomicU64,
    /// Current depth of the active content producer's audio lookahead
    /// buffer. Zero while a pad producer is active.
    pub audio_buffer_depth: AtomicU64,
    pub bytes_sent_total: AtomicU64,
    pub bytes_dropped_total: AtomicU64,
    pub deadline_late_count: AtomicU64,
    pub clock_drift_us: AtomicI64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub frames_emitted_total: u64,
    pub pad_frames_emitted_total: u64,
    pub decode_faults_total: u64,
    pub seam_miss_count: u64,
    pub seam_inline_pad_count: u64,
    pub seam_normal_count: u64,
    pub seam_override_count: u64,
    pub vacuum_exceptions_total: u64,
    pub buffer_underruns_total: u64,
    pub video_buffer_depth: u64,
    pub audio_buffer_depth: u64,
    pub bytes_sent_total: u64,
    pub bytes_dropped_total: u64,
    pub deadline_late_count: u64,
    pub clock_drift_us: i64,
}

impl SessionMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_emitted_total: self.frames_emitted_total.load(Ordering::Relaxed),
            pad_frames_emitted_total: self.pad_frames_emitted_total.load(Ordering::Relaxed),
            decode_faults_total: self.decode_faults_total.load(Ordering::Relaxed),
            seam_miss_count: self.seam_miss_count.load(Ordering::Relaxed),
            seam_inline_pad_count: self.seam_inline_pad_count.load(Ordering::Relaxed),
            seam_normal_count: self.seam_normal_count.load(Ordering::Relaxed),
            seam_override_count: self.seam_override_count.load(Ordering::Relaxed),
            vacuum_exceptions_total: self.vacuum_exceptions_total.load(Ordering::Relaxed),
            buffer_underruns_total: self.buffer_underruns_total.load(Ordering::Relaxed),
            video_buffer_depth: self.video_buffer_depth.load(Ordering::Relaxed),
            audio_buffer_depth: self.audio_buffer_depth.load(Ordering::Relaxed),
            bytes_sent_total: self.bytes_sent_total.load(Ordering::Relaxed),
            bytes_dropped_total: self.bytes_dropped_total.load(Ordering::Relaxed),
            deadline_late_count: self.deadline_late_count.load(Ordering::Relaxed),
            clock_drift_us: self.clock_drift_us.load(Ordering::Relaxed),
        }
    }
}
