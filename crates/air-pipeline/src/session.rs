//! Top-level session: owns the tick thread, the fill thread for whichever
//! segment is currently on air, and the seam preparer for whatever comes
//! next. Implements the control-plane contract from `air-core`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Result};
use uuid::Uuid;

use air_core::clock::OutputClock;
use air_core::control::ControlPlane;
use air_core::metrics::{MetricsSnapshot, SessionMetrics};
use air_core::model::{Block, ProgramFormat, Segment};
use air_core::seam_rule::SeamDecision;

use crate::decode::FillWorker;
use crate::mux::MuxSinkAdapter;
use crate::pad::PadProducer;
use crate::queue::{apply_join_offset, QueuedSegment};
use crate::seam::{PreparedContent, SeamPreparer};
use crate::sink::{NullSink, Sink};
use crate::tick::{ContentProducer, PadTickProducer, TickLoop, TickProducer};

/// Fallback pad duration used when a seam must override to pad but the
/// queue's head is not an explicit `Segment::Pad` (a malformed or
/// not-yet-caught-up queue) — keeps the tick loop alive instead of stalling.
const FALLBACK_PAD_MS: u64 = 1000;

fn now_utc_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

struct Shared {
    queue: Mutex<VecDeque<QueuedSegment>>,
    sinks: Mutex<HashMap<Uuid, Arc<dyn Sink>>>,
    active_sink: Mutex<Arc<dyn Sink>>,
    active_sink_id: Mutex<Option<Uuid>>,
    stop: Arc<AtomicBool>,
    metrics: Arc<SessionMetrics>,
}

pub struct PipelineSession {
    shared: Arc<Shared>,
    format: ProgramFormat,
    lookahead_depth: usize,
    pcr_interval_90k: u64,
    run_handle: Mutex<Option<JoinHandle<()>>>,
}

impl PipelineSession {
    pub fn new(format: ProgramFormat, lookahead_depth: usize, pcr_interval_90k: u64) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                sinks: Mutex::new(HashMap::new()),
                active_sink: Mutex::new(Arc::new(NullSink)),
                active_sink_id: Mutex::new(None),
                stop: Arc::new(AtomicBool::new(false)),
                metrics: Arc::new(SessionMetrics::default()),
            }),
            format,
            lookahead_depth,
            pcr_interval_90k,
            run_handle: Mutex::new(None),
        }
    }

    /// Register a sink under `id` so a later `attach_sink(id)` over the
    /// control plane can activate it. `air-core`'s `ControlPlane` trait
    /// takes only a `Uuid` because it cannot depend on this crate's `Sink`
    /// trait — this is the other half of that indirection.
    pub fn register_sink(&self, id: Uuid, sink: Arc<dyn Sink>) {
        self.shared.sinks.lock().unwrap().insert(id, sink);
    }

    fn samples_per_video_frame(format: &ProgramFormat) -> usize {
        (format.audio.sample_rate as u64 * format.video.fps.den as u64 / format.video.fps.num as u64) as usize
    }

    fn run(shared: Arc<Shared>, format: ProgramFormat, lookahead_depth: usize, pcr_interval_90k: u64) -> Result<()> {
        let pad = Arc::new(PadProducer::new(format, Self::samples_per_video_frame(&format)));
        let preparer = SeamPreparer::new(format, lookahead_depth, Arc::clone(&shared.metrics));
        let mut mux = MuxSinkAdapter::new(format, pcr_interval_90k, Arc::clone(&shared.metrics))?;

        let initial: Box<dyn TickProducer + Send> = Box::new(PadTickProducer::new(Arc::clone(&pad), 0, 0));
        let mut tick_loop = TickLoop::new(OutputClock::new(format.video.fps), initial, Arc::clone(&shared.metrics), Arc::clone(&pad));

        let mut fill_handle: Option<JoinHandle<()>> = None;
        let mut fill_cancel: Option<Arc<AtomicBool>> = None;

        while !shared.stop.load(Ordering::Relaxed) {
            {
                let mut q = shared.queue.lock().unwrap();
                preparer.arm(q.make_contiguous());
            }

            match tick_loop.decide(&preparer) {
                SeamDecision::Defer => {}
                SeamDecision::NormalCommit => {
                    shared.metrics.seam_normal_count.fetch_add(1, Ordering::Relaxed);
                    if let Some(PreparedContent {
                        video_buf,
                        audio_buf,
                        transition,
                        gain_db,
                        segment_duration_ms,
                        initial_ct_ms,
                        cancel,
                        decoder,
                    }) = preparer.take_ready()
                    {
                        if let Some(old_cancel) = fill_cancel.take() {
                            old_cancel.store(true, Ordering::Relaxed);
                        }
                        if let Some(h) = fill_handle.take() {
                            let _ = h.join();
                        }
                        {
                            let mut q = shared.queue.lock().unwrap();
                            q.pop_front();
                        }
                        fill_handle = Some(FillWorker::spawn(
                            decoder,
                            Arc::clone(&video_buf),
                            Arc::clone(&audio_buf),
                            Arc::clone(&cancel),
                            Arc::clone(&shared.metrics),
                        ));
                        fill_cancel = Some(cancel);
                        tick_loop.set_active(Box::new(ContentProducer::new(
                            video_buf,
                            audio_buf,
                            transition,
                            gain_db,
                            segment_duration_ms,
                            initial_ct_ms,
                        )));
                    }
                }
                SeamDecision::OverrideCommit => {
                    shared.metrics.seam_override_count.fetch_add(1, Ordering::Relaxed);
                    let (duration_ms, initial_ct_ms) = {
                        let mut q = shared.queue.lock().unwrap();
                        match q.front() {
                            // The queue's own next segment is a pad — this
                            // is an expected inline pad transition, not a
                            // miss on the prepared successor.
                            Some(QueuedSegment { segment: Segment::Pad { duration_ms }, initial_ct_ms }) => {
                                let d = *duration_ms;
                                let ct = *initial_ct_ms;
                                q.pop_front();
                                shared.metrics.seam_inline_pad_count.fetch_add(1, Ordering::Relaxed);
                                (d, ct)
                            }
                            // The queue's next segment is content that simply
                            // was not ready in time (or there is nothing
                            // queued at all) — a genuine seam miss.
                            _ => {
                                shared.metrics.seam_miss_count.fetch_add(1, Ordering::Relaxed);
                                (FALLBACK_PAD_MS, 0)
                            }
                        }
                    };
                    tick_loop.set_active(Box::new(PadTickProducer::new(Arc::clone(&pad), duration_ms, initial_ct_ms)));
                }
            }

            let sink = Arc::clone(&*shared.active_sink.lock().unwrap());
            tick_loop.run_once(&mut mux, sink.as_ref(), &format)?;
        }

        if let Some(cancel) = fill_cancel {
            cancel.store(true, Ordering::Relaxed);
        }
        if let Some(h) = fill_handle {
            let _ = h.join();
        }
        preparer.shutdown();
        Ok(())
    }
}

impl ControlPlane for PipelineSession {
    fn start_channel(&self) -> Result<()> {
        let mut handle = self.run_handle.lock().unwrap();
        if handle.is_some() {
            bail!("channel already started");
        }
        self.shared.stop.store(false, Ordering::Relaxed);
        let shared = Arc::clone(&self.shared);
        let format = self.format;
        let lookahead_depth = self.lookahead_depth;
        let pcr_interval_90k = self.pcr_interval_90k;
        *handle = Some(thread::spawn(move || {
            if let Err(e) = PipelineSession::run(shared, format, lookahead_depth, pcr_interval_90k) {
                tracing::error!(error = %e, "tick loop exited with fatal error");
            }
        }));
        Ok(())
    }

    fn stop_channel(&self) -> Result<()> {
        self.shared.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.run_handle.lock().unwrap().take() {
            let _ = h.join();
        }
        Ok(())
    }

    fn submit_block(&self, block: Block) -> Result<()> {
        let elapsed_ms = match block.start_utc_ms {
            Some(start) => now_utc_ms().saturating_sub(start),
            None => 0,
        };
        let queued = apply_join_offset(block.segments.into(), elapsed_ms);
        let mut q = self.shared.queue.lock().unwrap();
        q.extend(queued);
        Ok(())
    }

    fn attach_sink(&self, sink_id: Uuid) -> Result<()> {
        let sinks = self.shared.sinks.lock().unwrap();
        let sink = sinks.get(&sink_id).cloned().ok_or_else(|| anyhow::anyhow!("sink {sink_id} not registered"))?;
        *self.shared.active_sink.lock().unwrap() = sink;
        *self.shared.active_sink_id.lock().unwrap() = Some(sink_id);
        Ok(())
    }

    fn detach_sink(&self, sink_id: Uuid) -> Result<()> {
        let mut active_id = self.shared.active_sink_id.lock().unwrap();
        if *active_id == Some(sink_id) {
            *self.shared.active_sink.lock().unwrap() = Arc::new(NullSink);
            *active_id = None;
        }
        Ok(())
    }

    fn get_metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use air_core::model::{AudioFormat, RationalFps, VideoFormat};

    fn format() -> ProgramFormat {
        ProgramFormat {
            video: VideoFormat { width: 4, height: 2, fps: RationalFps::FILM_25 },
            audio: AudioFormat { sample_rate: 48000, channels: 2 },
        }
    }

    #[test]
    fn unregistered_sink_cannot_be_attached() {
        let session = PipelineSession::new(format(), 2, 90_000);
        assert!(session.attach_sink(Uuid::new_v4()).is_err());
    }

    #[test]
    fn detach_of_inactive_sink_is_a_no_op() {
        let session = PipelineSession::new(format(), 2, 90_000);
        assert!(session.detach_sink(Uuid::new_v4()).is_ok());
    }

    #[test]
    fn submit_block_enqueues_its_segments() {
        let session = PipelineSession::new(format(), 2, 90_000);
        let block = Block { id: Uuid::new_v4(), segments: vec![Segment::Pad { duration_ms: 500 }], start_utc_ms: None, end_utc_ms: None };
        session.submit_block(block).unwrap();
        assert_eq!(session.shared.queue.lock().unwrap().len(), 1);
    }

    #[test]
    fn submit_block_with_past_start_utc_joins_mid_block() {
        let session = PipelineSession::new(format(), 2, 90_000);
        let block = Block {
            id: Uuid::new_v4(),
            segments: vec![Segment::Pad { duration_ms: 2_000 }, Segment::Pad { duration_ms: 10_000 }],
            start_utc_ms: Some(now_utc_ms().saturating_sub(4_000)),
            end_utc_ms: None,
        };
        session.submit_block(block).unwrap();
        let q = session.shared.queue.lock().unwrap();
        assert_eq!(q.len(), 1, "the first 2000ms pad should be fully elapsed and dropped");
        assert!(q[0].initial_ct_ms >= 1_900 && q[0].initial_ct_ms <= 2_100, "got {}", q[0].initial_ct_ms);
    }
}
