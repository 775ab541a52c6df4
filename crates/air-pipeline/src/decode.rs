//! Segment decoder: opens one content segment's asset, seeks to its start
//! offset, and yields frames already scaled/resampled to the program format.
//!
//! Generalizes the stateful per-clip decoder pattern: one open per segment,
//! sequential `next_*` calls, no per-frame re-seek.

use std::path::Path;

use anyhow::{anyhow, Result};
use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::{input, Pixel};
use ffmpeg::media::Type;
use ffmpeg::software::resampling;
use ffmpeg::software::scaling::{context::Context as SwsContext, flag::Flags};
use ffmpeg::util::channel_layout::ChannelLayout;
use ffmpeg::util::format::sample::{Sample, Type as SampleType};

use air_core::model::{AspectPolicy, AudioFormat, VideoFormat};

use crate::helpers::letterbox::{composite_letterboxed, fit_within};
use crate::helpers::seek::seek_to_secs;
use crate::helpers::yuv::extract_yuv;

pub struct RawVideo {
    pub data: Vec<u8>,
    pub pts_secs: f64,
}

pub struct RawAudio {
    pub samples: Vec<i16>,
    pub pts_secs: f64,
}

pub struct SegmentDecoder {
    ictx: ffmpeg::format::context::Input,
    video_decoder: ffmpeg::decoder::video::Video,
    video_idx: usize,
    audio_decoder: Option<ffmpeg::decoder::audio::Audio>,
    audio_idx: Option<usize>,
    scaler: SwsContext,
    /// Dimensions the scaler above actually outputs — equal to `out_video`
    /// under `AspectPolicy::Stretch`, smaller (and centered via
    /// `composite_letterboxed`) under `AspectPolicy::Preserve`.
    scaled_dims: (u32, u32),
    resampler: Option<resampling::Context>,
    out_video: VideoFormat,
    out_audio: AudioFormat,
    pub video_eof: bool,
    pub audio_eof: bool,
}

impl SegmentDecoder {
    pub fn open(path: &Path, start_offset_ms: u64, video: VideoFormat, audio: AudioFormat, aspect_policy: AspectPolicy) -> Result<Self> {
        let mut ictx = input(path)?;
        let video_idx = ictx
            .streams()
            .best(Type::Video)
            .ok_or_else(|| anyhow!("no video stream in {}", path.display()))?
            .index();
        let audio_idx = ictx.streams().best(Type::Audio).map(|s| s.index());

        seek_to_secs(&mut ictx, start_offset_ms as f64 / 1000.0, "segment decode");

        let video_decoder = {
            let stream = ictx.stream(video_idx).unwrap();
            let ctx = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
            ctx.decoder().video()?
        };

        let audio_decoder = match audio_idx {
            Some(idx) => {
                let stream = ictx.stream(idx).unwrap();
                match ffmpeg::codec::context::Context::from_parameters(stream.parameters()) {
                    Ok(ctx) => ctx.decoder().audio().ok(),
                    Err(_) => None,
                }
            }
            None => None,
        };

        let scaled_dims = match aspect_policy {
            AspectPolicy::Stretch => (video.width, video.height),
            AspectPolicy::Preserve => fit_within(video_decoder.width(), video_decoder.height(), video.width, video.height),
        };

        let scaler = SwsContext::get(
            video_decoder.format(),
            video_decoder.width(),
            video_decoder.height(),
            Pixel::YUV420P,
            scaled_dims.0,
            scaled_dims.1,
            Flags::BILINEAR,
        )?;

        Ok(Self {
            ictx,
            video_decoder,
            video_idx,
            audio_decoder,
            audio_idx,
            scaler,
            scaled_dims,
            resampler: None,
            out_video: video,
            out_audio: audio,
            video_eof: false,
            audio_eof: audio_idx.is_none(),
        })
    }

    pub fn next_video_frame(&mut self) -> Result<Option<RawVideo>> {
        if self.video_eof {
            return Ok(None);
        }
        loop {
            let (stream, packet) = match self.ictx.packets().next() {
                Some(Ok(p)) => p,
                Some(Err(_)) => continue,
                None => {
                    self.video_eof = true;
                    return Ok(None);
                }
            };
            if stream.index() != self.video_idx {
                continue;
            }
            self.video_decoder.send_packet(&packet)?;
            let mut decoded = ffmpeg::util::frame::video::Video::empty();
            if self.video_decoder.receive_frame(&mut decoded).is_ok() {
                let tb = stream.time_base();
                let pts_secs = decoded
                    .pts()
                    .map(|p| p as f64 * tb.numerator() as f64 / tb.denominator() as f64)
                    .unwrap_or(0.0);
                let mut out = ffmpeg::util::frame::video::Video::empty();
                self.scaler.run(&decoded, &mut out)?;
                let (sw, sh) = self.scaled_dims;
                let scaled = extract_yuv(&out, sw as usize, sh as usize, (sw / 2) as usize, (sh / 2) as usize);
                let data = if (sw, sh) == (self.out_video.width, self.out_video.height) {
                    scaled
                } else {
                    composite_letterboxed(&scaled, sw, sh, self.out_video.width, self.out_video.height)
                };
                return Ok(Some(RawVideo { data, pts_secs }));
            }
        }
    }

    /// Drains one decoded+resampled audio access unit, if available, without
    /// reading more packets. The fill worker calls this between video pulls
    /// so both streams advance roughly in lockstep.
    pub fn next_audio_frame(&mut self) -> Result<Option<RawAudio>> {
        if self.audio_eof {
            return Ok(None);
        }
        let audio_idx = match self.audio_idx {
            Some(i) => i,
            None => {
                self.audio_eof = true;
                return Ok(None);
            }
        };
        loop {
            let (stream, packet) = match self.ictx.packets().next() {
                Some(Ok(p)) => p,
                Some(Err(_)) => continue,
                None => {
                    self.audio_eof = true;
                    return Ok(None);
                }
            };
            if stream.index() != audio_idx {
                continue;
            }
            let dec = match &mut self.audio_decoder {
                Some(d) => d,
                None => continue,
            };
            if dec.send_packet(&packet).is_err() {
                continue;
            }
            let mut raw = ffmpeg::util::frame::audio::Audio::empty();
            if dec.receive_frame(&mut raw).is_ok() {
                let tb = stream.time_base();
                let pts_secs = raw
                    .pts()
                    .map(|p| p as f64 * tb.numerator() as f64 / tb.denominator() as f64)
                    .unwrap_or(0.0);
                let target_fmt = Sample::I16(SampleType::Packed);
                let target_layout = if self.out_audio.channels >= 2 {
                    ChannelLayout::STEREO
                } else {
                    ChannelLayout::MONO
                };
                let needs_resample = raw.format() != target_fmt
                    || raw.rate() != self.out_audio.sample_rate
                    || raw.ch_layout().channels() != self.out_audio.channels as i32;

                let samples = if needs_resample {
                    let src_layout = if raw.ch_layout().channels() >= 2 {
                        raw.ch_layout()
                    } else {
                        ChannelLayout::MONO
                    };
                    let rs = self.resampler.get_or_insert_with(|| {
                        resampling::Context::get2(
                            raw.format(),
                            src_layout,
                            raw.rate(),
                            target_fmt,
                            target_layout,
                            self.out_audio.sample_rate,
                        )
                        .expect("create audio resampler")
                    });
                    let mut resampled = ffmpeg::util::frame::audio::Audio::empty();
                    if rs.run(&raw, &mut resampled).is_ok() && resampled.samples() > 0 {
                        interleaved_i16(&resampled)
                    } else {
                        Vec::new()
                    }
                } else {
                    interleaved_i16(&raw)
                };
                return Ok(Some(RawAudio { samples, pts_secs }));
            }
        }
    }
}

fn interleaved_i16(frame: &ffmpeg::util::frame::audio::Audio) -> Vec<i16> {
    let data = frame.data(0);
    data.chunks_exact(2).map(|b| i16::from_ne_bytes([b[0], b[1]])).collect()
}

/// Drives a `SegmentDecoder` on its own thread, pushing decoded content into
/// the lookahead buffers with symmetric backpressure: whichever buffer is
/// behind gets the next push. Used both by the seam preparer's priming pass
/// and, once a segment becomes active, to keep it topped up.
pub struct FillWorker {
    pub video_buf: std::sync::Arc<crate::buffer::LookaheadBuffer<Vec<u8>>>,
    pub audio_buf: std::sync::Arc<crate::buffer::LookaheadBuffer<Vec<i16>>>,
    pub cancel: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl FillWorker {
    pub fn spawn(
        mut decoder: SegmentDecoder,
        video_buf: std::sync::Arc<crate::buffer::LookaheadBuffer<Vec<u8>>>,
        audio_buf: std::sync::Arc<crate::buffer::LookaheadBuffer<Vec<i16>>>,
        cancel: std::sync::Arc<std::sync::atomic::AtomicBool>,
        metrics: std::sync::Arc<air_core::metrics::SessionMetrics>,
    ) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            use std::sync::atomic::Ordering;
            loop {
                if cancel.load(Ordering::Relaxed) {
                    return;
                }
                let video_behind = video_buf.depth() <= audio_buf.depth();
                if video_behind {
                    match decoder.next_video_frame() {
                        Ok(Some(v)) => {
                            if !video_buf.push_blocking(v.data, &cancel) {
                                return;
                            }
                        }
                        Ok(None) => {
                            if decoder.audio_eof {
                                return;
                            }
                        }
                        Err(e) => {
                            metrics.decode_faults_total.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(error = %e, "decode fault on video, stopping fill");
                            return;
                        }
                    }
                } else {
                    match decoder.next_audio_frame() {
                        Ok(Some(a)) => {
                            if !audio_buf.push_blocking(a.samples, &cancel) {
                                return;
                            }
                        }
                        Ok(None) => {
                            if decoder.video_eof {
                                return;
                            }
                        }
                        Err(e) => {
                            metrics.decode_faults_total.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(error = %e, "decode fault on audio, stopping fill");
                            return;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    // Exercised indirectly through `crate::tick` integration tests with a
    // synthetic producer — `SegmentDecoder` itself needs a real media file
    // and is not unit tested here.
}
