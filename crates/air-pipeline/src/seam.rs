//! Seam preparer: one background worker, one slot. `arm()` requests
//! preparation of the next non-pad segment; the worker opens its decoder and
//! starts filling fresh lookahead buffers, then posts the result into the
//! slot. The tick loop polls the slot — it never blocks on it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use air_core::metrics::SessionMetrics;
use air_core::model::{AspectPolicy, AudioFormat, ProgramFormat, Segment, TransitionSpec, VideoFormat};

use crate::buffer::LookaheadBuffer;
use crate::decode::SegmentDecoder;
use crate::queue::QueuedSegment;

pub struct PreparedContent {
    pub video_buf: Arc<LookaheadBuffer<Vec<u8>>>,
    pub audio_buf: Arc<LookaheadBuffer<Vec<i16>>>,
    pub transition: TransitionSpec,
    pub gain_db: f32,
    pub segment_duration_ms: u64,
    /// Where this segment's producer should start its own content-time
    /// counter — nonzero only when priming picked up a mid-block join.
    pub initial_ct_ms: u64,
    pub cancel: Arc<AtomicBool>,
    /// Still open, mid-stream, exactly where priming left off. The caller
    /// hands this to a `FillWorker` to keep the buffers topped up once the
    /// segment goes active — dropping it here would strand the decode at
    /// whatever the priming pass managed to read.
    pub decoder: SegmentDecoder,
}

struct PrepareRequest {
    asset_path: PathBuf,
    asset_start_offset_ms: u64,
    duration_ms: u64,
    aspect_policy: AspectPolicy,
    transition: TransitionSpec,
    gain_db: f32,
    initial_ct_ms: u64,
}

pub struct SeamPreparer {
    slot: Arc<(Mutex<Option<PrepareRequest>>, Condvar)>,
    result: Arc<Mutex<Option<PreparedContent>>>,
    armed_for: Mutex<Option<PathBuf>>,
    shutdown: Arc<AtomicBool>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl SeamPreparer {
    pub fn new(format: ProgramFormat, lookahead_depth: usize, metrics: Arc<SessionMetrics>) -> Self {
        let slot: Arc<(Mutex<Option<PrepareRequest>>, Condvar)> = Arc::new((Mutex::new(None), Condvar::new()));
        let result: Arc<Mutex<Option<PreparedContent>>> = Arc::new(Mutex::new(None));

        let worker_slot = Arc::clone(&slot);
        let worker_result = Arc::clone(&result);
        let worker_metrics = Arc::clone(&metrics);
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_shutdown = Arc::clone(&shutdown);
        let video_fmt: VideoFormat = format.video;
        let audio_fmt: AudioFormat = format.audio;

        let worker = thread::spawn(move || {
            loop {
                let req = {
                    let (lock, cvar) = &*worker_slot;
                    let mut guard = lock.lock().unwrap();
                    while guard.is_none() {
                        if worker_shutdown.load(Ordering::Relaxed) {
                            return;
                        }
                        let (g, _timeout) = cvar.wait_timeout(guard, std::time::Duration::from_millis(100)).unwrap();
                        guard = g;
                    }
                    guard.take().unwrap()
                };
                if worker_shutdown.load(Ordering::Relaxed) {
                    return;
                }

                let video_buf = Arc::new(LookaheadBuffer::new(lookahead_depth));
                let audio_buf = Arc::new(LookaheadBuffer::new(lookahead_depth));
                let cancel = Arc::new(AtomicBool::new(false));

                match SegmentDecoder::open(&req.asset_path, req.asset_start_offset_ms, video_fmt, audio_fmt, req.aspect_policy) {
                    Ok(mut decoder) => {
                        // Prime the buffers so the tick loop has an immediate
                        // full lead once it commits to this producer.
                        for _ in 0..lookahead_depth {
                            if let Ok(Some(v)) = decoder.next_video_frame() {
                                let _ = video_buf.try_push(v.data);
                            }
                            if let Ok(Some(a)) = decoder.next_audio_frame() {
                                let _ = audio_buf.try_push(a.samples);
                            }
                        }
                        *worker_result.lock().unwrap() = Some(PreparedContent {
                            video_buf,
                            audio_buf,
                            transition: req.transition,
                            gain_db: req.gain_db,
                            segment_duration_ms: req.duration_ms,
                            initial_ct_ms: req.initial_ct_ms,
                            cancel,
                            decoder,
                        });
                    }
                    Err(e) => {
                        worker_metrics.decode_faults_total.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(error = %e, path = %req.asset_path.display(), "seam preparer decode fault");
                    }
                }
            }
        });

        Self { slot, result, armed_for: Mutex::new(None), shutdown, worker: Mutex::new(Some(worker)) }
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.slot.1.notify_all();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    /// Scan forward from `upcoming`, skipping pads, and arm preparation for
    /// the first content segment found — unless it's already armed or ready.
    /// Only the segment at index 0 can carry a nonzero `initial_ct_ms` (a
    /// mid-block join lands on the queue head or not at all).
    pub fn arm(&self, upcoming: &[QueuedSegment]) {
        let target = upcoming.iter().enumerate().find_map(|(i, qs)| match &qs.segment {
            Segment::Content { asset_path, asset_start_offset_ms, duration_ms, aspect_policy, transition, gain_db } => Some((
                PathBuf::from(asset_path),
                *asset_start_offset_ms,
                *duration_ms,
                *aspect_policy,
                *transition,
                *gain_db,
                if i == 0 { qs.initial_ct_ms } else { 0 },
            )),
            Segment::Pad { .. } => None,
        });

        let Some((path, offset, duration, aspect_policy, transition, gain_db, initial_ct_ms)) = target else {
            return;
        };

        let mut armed = self.armed_for.lock().unwrap();
        if armed.as_deref() == Some(path.as_path()) {
            return;
        }
        if self.result.lock().unwrap().is_some() {
            return;
        }
        *armed = Some(path.clone());
        drop(armed);

        let (lock, cvar) = &*self.slot;
        *lock.lock().unwrap() = Some(PrepareRequest {
            asset_path: path,
            asset_start_offset_ms: offset,
            duration_ms: duration,
            aspect_policy,
            transition,
            gain_db,
            initial_ct_ms,
        });
        cvar.notify_one();
    }

    pub fn take_ready(&self) -> Option<PreparedContent> {
        let ready = self.result.lock().unwrap().take();
        if ready.is_some() {
            *self.armed_for.lock().unwrap() = None;
        }
        ready
    }

    pub fn is_ready(&self) -> bool {
        self.result.lock().unwrap().is_some()
    }
}
