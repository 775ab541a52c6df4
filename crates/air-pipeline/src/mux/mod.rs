//! Mux / sink adapter: H.264 + AAC encoders feeding a hand-rolled MPEG-TS
//! packetizer, handed off to a non-blocking `Sink`.
//!
//! Unlike a file-muxer pipeline, AIR's encoders are never attached to an
//! `ffmpeg` output context — there is no file to own the stream metadata.
//! Packets come straight out of `encoder::Video`/`encoder::Audio` and are
//! framed by `mux::ts` instead.

pub mod adts;
pub mod crc32;
pub mod ts;

use std::sync::Arc;

use air_core::metrics::SessionMetrics;
use air_core::model::{AudioFrame, ProgramFormat, VideoFrame};

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::{self, Id as CodecId};
use ffmpeg::format::sample::Type as SampleType;
use ffmpeg::format::{Pixel, Sample};
use ffmpeg::util::channel_layout::{ChannelLayout, ChannelLayoutMask};
use ffmpeg::util::rational::Rational;

use crate::helpers::yuv::write_yuv;
use crate::sink::Sink;
use ts::{TsConfig, TsMuxer};

const AAC_BIT_RATE: usize = 128_000;

/// Stereo FLTP ring buffer feeding the AAC encoder's fixed frame size.
/// Generalized directly from the teacher's clip-encode audio FIFO.
struct AudioFifo {
    left: Vec<f32>,
    right: Vec<f32>,
}

impl AudioFifo {
    fn new() -> Self {
        Self { left: Vec::new(), right: Vec::new() }
    }

    fn len(&self) -> usize {
        self.left.len()
    }

    fn push_i16(&mut self, samples: &[i16], channels: u16) {
        if channels >= 2 {
            for pair in samples.chunks_exact(2) {
                self.left.push(pair[0] as f32 / i16::MAX as f32);
                self.right.push(pair[1] as f32 / i16::MAX as f32);
            }
        } else {
            for &s in samples {
                let v = s as f32 / i16::MAX as f32;
                self.left.push(v);
                self.right.push(v);
            }
        }
    }

    fn pop_frame(&mut self, n: usize, sample_idx: i64) -> ffmpeg::util::frame::audio::Audio {
        let available = self.left.len().min(n);
        let mut frame = ffmpeg::util::frame::audio::Audio::new(Sample::F32(SampleType::Planar), n, ChannelLayoutMask::STEREO);
        frame.set_rate(48_000);
        frame.set_pts(Some(sample_idx));
        unsafe {
            let ldst = std::slice::from_raw_parts_mut(frame.data_mut(0).as_mut_ptr() as *mut f32, n);
            ldst[..available].copy_from_slice(&self.left[..available]);
            if available < n {
                ldst[available..].fill(0.0);
            }
            let rdst = std::slice::from_raw_parts_mut(frame.data_mut(1).as_mut_ptr() as *mut f32, n);
            rdst[..available].copy_from_slice(&self.right[..available]);
            if available < n {
                rdst[available..].fill(0.0);
            }
        }
        self.left.drain(..available);
        self.right.drain(..available);
        frame
    }
}

pub struct TsEncoder {
    video_encoder: ffmpeg::encoder::Video,
    audio_encoder: ffmpeg::encoder::Audio,
    fifo: AudioFifo,
    audio_frame_size: usize,
    out_sample_idx: i64,
    sample_rate: u32,
    channels: u16,
}

impl TsEncoder {
    pub fn open(format: ProgramFormat) -> anyhow::Result<Self> {
        let h264 = ffmpeg::encoder::find(CodecId::H264).ok_or_else(|| anyhow::anyhow!("H.264 encoder not found"))?;
        let video_ctx = codec::context::Context::new_with_codec(h264);
        let mut video_enc = video_ctx.encoder().video()?;
        video_enc.set_width(format.video.width);
        video_enc.set_height(format.video.height);
        video_enc.set_format(Pixel::YUV420P);
        let fps_tb = Rational::new(format.video.fps.den as i32, format.video.fps.num as i32);
        video_enc.set_time_base(fps_tb);
        video_enc.set_frame_rate(Some(Rational::new(format.video.fps.num as i32, format.video.fps.den as i32)));
        video_enc.set_bit_rate(0);

        let mut opts = ffmpeg::Dictionary::new();
        opts.set("crf", "21");
        opts.set("preset", "veryfast");
        opts.set("tune", "zerolatency");
        let mut video_encoder = video_enc.open_as_with(h264, opts)?;
        video_encoder.set_aspect_ratio(Rational::new(1, 1));

        let aac = ffmpeg::encoder::find(CodecId::AAC).ok_or_else(|| anyhow::anyhow!("AAC encoder not found"))?;
        let audio_ctx = codec::context::Context::new_with_codec(aac);
        let mut audio_enc = audio_ctx.encoder().audio()?;
        audio_enc.set_rate(format.audio.sample_rate as i32);
        audio_enc.set_ch_layout(if format.audio.channels >= 2 { ChannelLayout::STEREO } else { ChannelLayout::MONO });
        audio_enc.set_format(Sample::F32(SampleType::Planar));
        audio_enc.set_bit_rate(AAC_BIT_RATE);
        let audio_encoder = audio_enc.open_as_with(aac, ffmpeg::Dictionary::new())?;
        let audio_frame_size = (audio_encoder.frame_size() as usize).max(1024);

        Ok(Self {
            video_encoder,
            audio_encoder,
            fifo: AudioFifo::new(),
            audio_frame_size,
            out_sample_idx: 0,
            sample_rate: format.audio.sample_rate,
            channels: format.audio.channels,
        })
    }

    pub fn encode_video(&mut self, frame: &VideoFrame) -> anyhow::Result<Vec<(Vec<u8>, bool, u64)>> {
        let mut av_frame = ffmpeg::util::frame::video::Video::new(Pixel::YUV420P, frame.width, frame.height);
        write_yuv(
            &frame.data,
            &mut av_frame,
            frame.width as usize,
            frame.height as usize,
            (frame.width / 2) as usize,
            (frame.height / 2) as usize,
        );
        av_frame.set_pts(Some(frame.session_frame_index.0 as i64));

        self.video_encoder.send_frame(&av_frame)?;
        self.drain_video()
    }

    fn drain_video(&mut self) -> anyhow::Result<Vec<(Vec<u8>, bool, u64)>> {
        let mut out = Vec::new();
        let mut pkt = ffmpeg::Packet::empty();
        while self.video_encoder.receive_packet(&mut pkt).is_ok() {
            let pts = pkt.pts().unwrap_or(0) as u64;
            out.push((pkt.data().unwrap_or(&[]).to_vec(), pkt.is_key(), pts));
        }
        Ok(out)
    }

    pub fn encode_audio(&mut self, frame: &AudioFrame) -> anyhow::Result<Vec<Vec<u8>>> {
        self.fifo.push_i16(&frame.samples, frame.channels);
        let mut out = Vec::new();
        while self.fifo.len() >= self.audio_frame_size {
            let av_frame = self.fifo.pop_frame(self.audio_frame_size, self.out_sample_idx);
            self.out_sample_idx += self.audio_frame_size as i64;
            self.audio_encoder.send_frame(&av_frame)?;
            let mut pkt = ffmpeg::Packet::empty();
            while self.audio_encoder.receive_packet(&mut pkt).is_ok() {
                let raw = pkt.data().unwrap_or(&[]).to_vec();
                out.push(adts::wrap_adts(&raw, self.sample_rate, self.channels));
            }
        }
        Ok(out)
    }
}

/// Ties encoder output, TS packetization, and the attached sink together.
/// `consume` never blocks: a sink rejection is counted and dropped.
pub struct MuxSinkAdapter {
    encoder: TsEncoder,
    muxer: TsMuxer,
    metrics: Arc<SessionMetrics>,
}

impl MuxSinkAdapter {
    pub fn new(format: ProgramFormat, pcr_interval_90k: u64, metrics: Arc<SessionMetrics>) -> anyhow::Result<Self> {
        Ok(Self {
            encoder: TsEncoder::open(format)?,
            muxer: TsMuxer::new(TsConfig { pcr_interval_90k, ..TsConfig::default() }),
            metrics,
        })
    }

    pub fn consume_video(&mut self, frame: &VideoFrame, sink: &dyn Sink) -> anyhow::Result<()> {
        for (au, keyframe, pts) in self.encoder.encode_video(frame)? {
            for pkt in self.muxer.mux_video(&au, pts, pts, keyframe) {
                self.hand_off(&pkt, sink);
            }
        }
        Ok(())
    }

    pub fn consume_audio(&mut self, frame: &AudioFrame, sink: &dyn Sink) -> anyhow::Result<()> {
        for au in self.encoder.encode_audio(frame)? {
            for pkt in self.muxer.mux_audio(&au, frame.pts_90k) {
                self.hand_off(&pkt, sink);
            }
        }
        Ok(())
    }

    fn hand_off(&self, pkt: &[u8; ts::TS_PACKET_SIZE], sink: &dyn Sink) {
        use std::sync::atomic::Ordering;
        if sink.try_consume_bytes(pkt) {
            self.metrics.bytes_sent_total.fetch_add(pkt.len() as u64, Ordering::Relaxed);
        } else {
            self.metrics.bytes_dropped_total.fetch_add(pkt.len() as u64, Ordering::Relaxed);
        }
    }
}
