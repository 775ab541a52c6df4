//! Tick loop: the sole place that advances the session clock, decides
//! seams, and stamps session frame index / PTS onto whatever the active
//! producer supplies.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use air_core::clock::OutputClock;
use air_core::metrics::SessionMetrics;
use air_core::model::{AudioFrame, ProgramFormat, SessionFrameIndex, TransitionSpec, VideoFrame};
use air_core::seam_rule::{decide_seam, vacuum_exception, SeamDecision, SeamInputs};
use air_core::transition;

use crate::buffer::LookaheadBuffer;
use crate::clock_wait::ClockWait;
use crate::mux::MuxSinkAdapter;
use crate::pad::PadProducer;
use crate::seam::SeamPreparer;
use crate::sink::Sink;

pub enum PollOutcome<T> {
    Ready(T),
    Underrun,
    Eof,
}

/// What the tick loop needs from whatever is currently on air — a content
/// segment's buffers or the pad producer.
pub trait TickProducer {
    fn poll_video(&mut self) -> PollOutcome<Vec<u8>>;
    fn poll_audio(&mut self) -> PollOutcome<Vec<i16>>;
    fn is_depleted(&self) -> bool;
    fn ct_ms(&self) -> u64;
    fn duration_ms(&self) -> u64;
    fn transition(&self) -> TransitionSpec;
    fn advance_ms(&mut self, ms: u64);

    /// Loudness trim in dB; `0.0` (unity) for anything that isn't a
    /// gain-bearing content segment.
    fn gain_db(&self) -> f32 {
        0.0
    }
    /// Lookahead depth remaining, for the `video_buffer_depth`/
    /// `audio_buffer_depth` gauges. Zero for producers with no buffer of
    /// their own (the pad producer).
    fn video_depth(&self) -> usize {
        0
    }
    fn audio_depth(&self) -> usize {
        0
    }
}

pub struct ContentProducer {
    video_buf: Arc<LookaheadBuffer<Vec<u8>>>,
    audio_buf: Arc<LookaheadBuffer<Vec<i16>>>,
    transition: TransitionSpec,
    gain_db: f32,
    duration_ms: u64,
    ct_ms: u64,
}

impl ContentProducer {
    pub fn new(
        video_buf: Arc<LookaheadBuffer<Vec<u8>>>,
        audio_buf: Arc<LookaheadBuffer<Vec<i16>>>,
        transition: TransitionSpec,
        gain_db: f32,
        duration_ms: u64,
        initial_ct_ms: u64,
    ) -> Self {
        Self { video_buf, audio_buf, transition, gain_db, duration_ms, ct_ms: initial_ct_ms }
    }
}

impl TickProducer for ContentProducer {
    fn poll_video(&mut self) -> PollOutcome<Vec<u8>> {
        match self.video_buf.try_pop() {
            Some(v) => PollOutcome::Ready(v),
            None if self.ct_ms >= self.duration_ms => PollOutcome::Eof,
            None => PollOutcome::Underrun,
        }
    }

    fn poll_audio(&mut self) -> PollOutcome<Vec<i16>> {
        match self.audio_buf.try_pop() {
            Some(a) => PollOutcome::Ready(a),
            None if self.ct_ms >= self.duration_ms => PollOutcome::Eof,
            None => PollOutcome::Underrun,
        }
    }

    fn is_depleted(&self) -> bool {
        self.ct_ms >= self.duration_ms
    }

    fn ct_ms(&self) -> u64 {
        self.ct_ms
    }

    fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    fn transition(&self) -> TransitionSpec {
        self.transition
    }

    fn advance_ms(&mut self, ms: u64) {
        self.ct_ms += ms;
    }

    fn gain_db(&self) -> f32 {
        self.gain_db
    }

    fn video_depth(&self) -> usize {
        self.video_buf.depth()
    }

    fn audio_depth(&self) -> usize {
        self.audio_buf.depth()
    }
}

pub struct PadTickProducer {
    pad: Arc<PadProducer>,
    duration_ms: u64,
    ct_ms: u64,
}

impl PadTickProducer {
    pub fn new(pad: Arc<PadProducer>, duration_ms: u64, initial_ct_ms: u64) -> Self {
        Self { pad, duration_ms, ct_ms: initial_ct_ms }
    }
}

impl TickProducer for PadTickProducer {
    fn poll_video(&mut self) -> PollOutcome<Vec<u8>> {
        if self.ct_ms >= self.duration_ms {
            return PollOutcome::Eof;
        }
        PollOutcome::Ready(self.pad.video_bytes())
    }

    fn poll_audio(&mut self) -> PollOutcome<Vec<i16>> {
        if self.ct_ms >= self.duration_ms {
            return PollOutcome::Eof;
        }
        PollOutcome::Ready(self.pad.audio_samples())
    }

    fn is_depleted(&self) -> bool {
        self.ct_ms >= self.duration_ms
    }

    fn ct_ms(&self) -> u64 {
        self.ct_ms
    }

    fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    fn transition(&self) -> TransitionSpec {
        TransitionSpec::NONE
    }

    fn advance_ms(&mut self, ms: u64) {
        self.ct_ms += ms;
    }
}

/// Result of one pure tick, before any encoding/sink I/O.
pub struct EmittedFrame {
    pub video: VideoFrame,
    pub audio: Option<AudioFrame>,
}

pub struct TickLoop {
    clock: OutputClock,
    wait: ClockWait,
    index: SessionFrameIndex,
    active: Box<dyn TickProducer + Send>,
    /// Bumped every `set_active` call — the frame-visible half of the
    /// `origin(i) == active(i)` invariant (the decision half lives in
    /// `air_core::seam_rule`).
    origin_index: u64,
    pad: Arc<PadProducer>,
    metrics: Arc<SessionMetrics>,
}

impl TickLoop {
    pub fn new(clock: OutputClock, active: Box<dyn TickProducer + Send>, metrics: Arc<SessionMetrics>, pad: Arc<PadProducer>) -> Self {
        Self { clock, wait: ClockWait::start_now(), index: SessionFrameIndex(0), active, origin_index: 0, pad, metrics }
    }

    /// Decide whether to keep the active producer, commit to the preparer's
    /// result, or force a pad. Returns the decision so the caller (which
    /// owns the block queue) can swap `self.active` accordingly.
    pub fn decide(&self, preparer: &SeamPreparer) -> SeamDecision {
        decide_seam(SeamInputs {
            current_depleted: self.active.is_depleted(),
            next_ready: preparer.is_ready(),
            audio_depth_ok: true,
        })
    }

    pub fn is_active_depleted(&self) -> bool {
        self.active.is_depleted()
    }

    pub fn set_active(&mut self, active: Box<dyn TickProducer + Send>) {
        self.origin_index += 1;
        self.active = active;
    }

    pub fn origin_index(&self) -> u64 {
        self.origin_index
    }

    pub fn index(&self) -> SessionFrameIndex {
        self.index
    }

    /// Pure per-tick step: poll the active producer, apply transition alpha
    /// and segment gain, stamp video/audio frames, advance the content-time
    /// and session-frame counters. No encoding or sink I/O — kept separate
    /// from `run_once` so seam/pad/gain behavior can be proven by direct
    /// unit test without opening real encoders.
    pub fn advance(&mut self, frame_format: &ProgramFormat) -> EmittedFrame {
        let nominal_ms = 1000 * frame_format.video.fps.den as u64 / frame_format.video.fps.num as u64;

        let mut vacuum = false;
        let video_data = match self.active.poll_video() {
            PollOutcome::Ready(v) => v,
            PollOutcome::Underrun => {
                self.metrics.buffer_underruns_total.fetch_add(1, Ordering::Relaxed);
                vacuum = true;
                self.pad.video_bytes()
            }
            PollOutcome::Eof => self.pad.video_bytes(),
        };
        let audio_samples = match self.active.poll_audio() {
            PollOutcome::Ready(a) => a,
            PollOutcome::Underrun => {
                vacuum = true;
                self.pad.audio_samples()
            }
            PollOutcome::Eof => Vec::new(),
        };
        if vacuum {
            let _ = vacuum_exception();
            self.metrics.vacuum_exceptions_total.fetch_add(1, Ordering::Relaxed);
        }

        self.metrics.video_buffer_depth.store(self.active.video_depth() as u64, Ordering::Relaxed);
        self.metrics.audio_buffer_depth.store(self.active.audio_depth() as u64, Ordering::Relaxed);

        let ct_ms = self.active.ct_ms();
        let alpha = transition::alpha(ct_ms, self.active.duration_ms(), &self.active.transition());
        let mut video_data = video_data;
        transition::apply_video_alpha(&mut video_data, frame_format.video.width, frame_format.video.height, alpha);
        let mut audio_samples = audio_samples;
        transition::apply_audio_alpha(&mut audio_samples, alpha);
        transition::apply_gain_db(&mut audio_samples, self.active.gain_db());

        let pts = self.clock.pts_90k(self.index);
        let video_frame = VideoFrame {
            data: video_data,
            width: frame_format.video.width,
            height: frame_format.video.height,
            session_frame_index: self.index,
            pts_90k: pts,
            origin_segment_index: self.origin_index,
            ct_ms,
            alpha,
        };

        let audio_frame = if !audio_samples.is_empty() {
            Some(AudioFrame {
                samples: audio_samples,
                sample_rate: frame_format.audio.sample_rate,
                channels: frame_format.audio.channels,
                pts_90k: pts,
                origin_segment_index: self.origin_index,
                ct_ms,
                alpha,
            })
        } else {
            None
        };

        self.metrics.frames_emitted_total.fetch_add(1, Ordering::Relaxed);
        self.active.advance_ms(nominal_ms);
        self.index = self.index.next();

        EmittedFrame { video: video_frame, audio: audio_frame }
    }

    /// Run one tick: pull video/audio from the active producer, stamp them,
    /// encode, and hand off to the sink. Returns after the clock wait for
    /// this frame completes.
    pub fn run_once(&mut self, mux: &mut MuxSinkAdapter, sink: &dyn Sink, frame_format: &ProgramFormat) -> anyhow::Result<()> {
        let EmittedFrame { video, audio } = self.advance(frame_format);

        mux.consume_video(&video, sink)?;
        if let Some(audio) = audio {
            mux.consume_audio(&audio, sink)?;
        }

        match self.wait.wait_for_frame(&self.clock, self.index) {
            crate::clock_wait::WaitOutcome::Late(d) => {
                self.metrics.deadline_late_count.fetch_add(1, Ordering::Relaxed);
                let us = d.as_micros() as i64;
                self.metrics.clock_drift_us.store(us, Ordering::Relaxed);
            }
            crate::clock_wait::WaitOutcome::OnTime => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use air_core::model::{AudioFormat, RationalFps, VideoFormat};

    struct FixedProducer {
        duration_ms: u64,
        ct_ms: u64,
        width: u32,
        height: u32,
    }

    impl TickProducer for FixedProducer {
        fn poll_video(&mut self) -> PollOutcome<Vec<u8>> {
            if self.ct_ms >= self.duration_ms {
                return PollOutcome::Eof;
            }
            PollOutcome::Ready(vec![200u8; (self.width * self.height) as usize * 3 / 2])
        }
        fn poll_audio(&mut self) -> PollOutcome<Vec<i16>> {
            if self.ct_ms >= self.duration_ms {
                return PollOutcome::Eof;
            }
            PollOutcome::Ready(vec![1000i16; 10])
        }
        fn is_depleted(&self) -> bool {
            self.ct_ms >= self.duration_ms
        }
        fn ct_ms(&self) -> u64 {
            self.ct_ms
        }
        fn duration_ms(&self) -> u64 {
            self.duration_ms
        }
        fn transition(&self) -> TransitionSpec {
            TransitionSpec::NONE
        }
        fn advance_ms(&mut self, ms: u64) {
            self.ct_ms += ms;
        }
    }

    fn format25() -> ProgramFormat {
        ProgramFormat {
            video: VideoFormat { width: 4, height: 2, fps: RationalFps::FILM_25 },
            audio: AudioFormat { sample_rate: 48000, channels: 2 },
        }
    }

    fn pad_producer(format: ProgramFormat) -> Arc<PadProducer> {
        Arc::new(PadProducer::new(format, 1600))
    }

    #[test]
    fn seam_decision_matches_depletion_and_readiness() {
        let format = ProgramFormat {
            video: VideoFormat { width: 4, height: 2, fps: RationalFps::NTSC_30 },
            audio: AudioFormat { sample_rate: 48000, channels: 2 },
        };
        let metrics = Arc::new(SessionMetrics::default());
        let preparer = SeamPreparer::new(format, 3, Arc::clone(&metrics));
        let producer = Box::new(FixedProducer { duration_ms: 0, ct_ms: 0, width: 4, height: 2 });
        let tick = TickLoop::new(OutputClock::new(RationalFps::NTSC_30), producer, Arc::clone(&metrics), pad_producer(format));
        // Depleted immediately (duration 0), preparer never armed -> OverrideCommit.
        assert_eq!(tick.decide(&preparer), SeamDecision::OverrideCommit);
        preparer.shutdown();
    }

    /// Scenario 1: a single long-running content segment emits exactly one
    /// frame per `advance()` call, with strictly increasing PTS, for a
    /// 150-frame run.
    #[test]
    fn emits_150_frames_with_strictly_increasing_pts() {
        let format = format25();
        let metrics = Arc::new(SessionMetrics::default());
        let producer = Box::new(FixedProducer { duration_ms: 1_000_000, ct_ms: 0, width: 4, height: 2 });
        let mut tick = TickLoop::new(OutputClock::new(format.video.fps), producer, Arc::clone(&metrics), pad_producer(format));

        let mut last_pts = None;
        for _ in 0..150 {
            let frame = tick.advance(&format);
            if let Some(last) = last_pts {
                assert!(frame.video.pts_90k > last, "pts must strictly increase");
            }
            last_pts = Some(frame.video.pts_90k);
        }
        assert_eq!(tick.index(), SessionFrameIndex(150));
        assert_eq!(metrics.frames_emitted_total.load(Ordering::Relaxed), 150);
    }

    /// Scenario 2: content depletes, the tick loop overrides to pad, then a
    /// second content segment commits normally — every frame's
    /// `origin_segment_index` matches whichever producer was active when it
    /// was stamped, and `set_active` is the only thing that bumps it.
    #[test]
    fn origin_segment_index_tracks_each_seam_commit() {
        let format = format25();
        let metrics = Arc::new(SessionMetrics::default());
        let pad = pad_producer(format);
        let first = Box::new(FixedProducer { duration_ms: 80, ct_ms: 0, width: 4, height: 2 }); // depletes after 2 frames @ 40ms
        let mut tick = TickLoop::new(OutputClock::new(format.video.fps), first, Arc::clone(&metrics), Arc::clone(&pad));

        let f0 = tick.advance(&format);
        let f1 = tick.advance(&format);
        assert_eq!(f0.video.origin_segment_index, 0);
        assert_eq!(f1.video.origin_segment_index, 0);
        assert!(tick.is_active_depleted());

        tick.set_active(Box::new(PadTickProducer::new(Arc::clone(&pad), 40, 0)));
        let pad_frame = tick.advance(&format);
        assert_eq!(pad_frame.video.origin_segment_index, 1);

        let second = Box::new(FixedProducer { duration_ms: 1_000_000, ct_ms: 0, width: 4, height: 2 });
        tick.set_active(second);
        let content_frame = tick.advance(&format);
        assert_eq!(content_frame.video.origin_segment_index, 2);
    }

    /// Scenario 3: a producer seeded with a mid-block join offset reports
    /// that offset as `ct_ms` on its very first emitted frame.
    #[test]
    fn mid_block_join_floor_is_visible_on_first_frame() {
        let format = format25();
        let metrics = Arc::new(SessionMetrics::default());
        let joined = Box::new(PadTickProducer::new(pad_producer(format), 10_000, 4_000));
        let mut tick = TickLoop::new(OutputClock::new(format.video.fps), joined, Arc::clone(&metrics), pad_producer(format));

        let frame = tick.advance(&format);
        assert_eq!(frame.video.ct_ms, 4_000);
    }

    /// Scenario 5: when the active producer underruns, the tick loop
    /// substitutes true-black pad content and counts both a buffer
    /// underrun and a vacuum exception rather than emitting raw zero bytes.
    #[test]
    fn underrun_falls_back_to_pad_and_counts_vacuum_exception() {
        struct StallingProducer;
        impl TickProducer for StallingProducer {
            fn poll_video(&mut self) -> PollOutcome<Vec<u8>> {
                PollOutcome::Underrun
            }
            fn poll_audio(&mut self) -> PollOutcome<Vec<i16>> {
                PollOutcome::Underrun
            }
            fn is_depleted(&self) -> bool {
                false
            }
            fn ct_ms(&self) -> u64 {
                0
            }
            fn duration_ms(&self) -> u64 {
                1_000_000
            }
            fn transition(&self) -> TransitionSpec {
                TransitionSpec::NONE
            }
            fn advance_ms(&mut self, _ms: u64) {}
        }

        let format = format25();
        let metrics = Arc::new(SessionMetrics::default());
        let pad = pad_producer(format);
        let mut tick = TickLoop::new(OutputClock::new(format.video.fps), Box::new(StallingProducer), Arc::clone(&metrics), Arc::clone(&pad));

        let frame = tick.advance(&format);
        let yl = (format.video.width * format.video.height) as usize;
        assert!(frame.video.data[..yl].iter().all(|&b| b == 0), "underrun video must be true black");
        assert!(frame.video.data[yl..].iter().all(|&b| b == 128), "underrun chroma must be neutral, not zero-tinted");
        assert_eq!(metrics.buffer_underruns_total.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.vacuum_exceptions_total.load(Ordering::Relaxed), 1);
    }
}
