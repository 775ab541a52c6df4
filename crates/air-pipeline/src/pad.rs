//! Pad producer: pre-baked black video and silent audio, stamped fresh from
//! the tick loop's counters on every call. No per-frame allocation.

use air_core::clock::OutputClock;
use air_core::model::{AudioFormat, AudioFrame, ProgramFormat, SessionFrameIndex, VideoFormat, VideoFrame};

pub struct PadProducer {
    video_template: Vec<u8>,
    video_format: VideoFormat,
    audio_template: Vec<i16>,
    audio_format: AudioFormat,
}

fn y_len(w: u32, h: u32) -> usize {
    (w * h) as usize
}

fn uv_len(w: u32, h: u32) -> usize {
    ((w / 2) * (h / 2)) as usize
}

impl PadProducer {
    pub fn new(format: ProgramFormat, samples_per_audio_quantum: usize) -> Self {
        let v = format.video;
        let mut video_template = vec![0u8; y_len(v.width, v.height) + uv_len(v.width, v.height) * 2];
        // Luma 0 is black; chroma must be 128 (neutral), not 0.
        for b in &mut video_template[y_len(v.width, v.height)..] {
            *b = 128;
        }
        Self {
            video_template,
            video_format: v,
            audio_template: vec![0i16; samples_per_audio_quantum * format.audio.channels as usize],
            audio_format: format.audio,
        }
    }

    pub fn next_video_frame(&self, clock: &OutputClock, index: SessionFrameIndex) -> VideoFrame {
        VideoFrame {
            data: self.video_template.clone(),
            width: self.video_format.width,
            height: self.video_format.height,
            session_frame_index: index,
            pts_90k: clock.pts_90k(index),
        }
    }

    pub fn next_audio_quantum(&self, pts_90k: u64) -> AudioFrame {
        AudioFrame {
            samples: self.audio_template.clone(),
            sample_rate: self.audio_format.sample_rate,
            channels: self.audio_format.channels,
            pts_90k,
        }
    }

    /// Raw black video bytes with no PTS stamp, for callers that stamp the
    /// frame themselves (the tick loop, driving its own `OutputClock`).
    pub fn video_bytes(&self) -> Vec<u8> {
        self.video_template.clone()
    }

    /// Raw silent audio samples with no PTS stamp.
    pub fn audio_samples(&self) -> Vec<i16> {
        self.audio_template.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use air_core::model::RationalFps;

    fn fmt() -> ProgramFormat {
        ProgramFormat {
            video: VideoFormat { width: 4, height: 2, fps: RationalFps::NTSC_30 },
            audio: AudioFormat { sample_rate: 48000, channels: 2 },
        }
    }

    #[test]
    fn black_video_is_luma_zero_chroma_neutral() {
        let pad = PadProducer::new(fmt(), 1600);
        let clock = OutputClock::new(RationalFps::NTSC_30);
        let frame = pad.next_video_frame(&clock, SessionFrameIndex(0));
        let yl = y_len(4, 2);
        assert!(frame.data[..yl].iter().all(|&b| b == 0));
        assert!(frame.data[yl..].iter().all(|&b| b == 128));
    }

    #[test]
    fn silent_audio_is_all_zero() {
        let pad = PadProducer::new(fmt(), 1600);
        let quantum = pad.next_audio_quantum(0);
        assert!(quantum.samples.iter().all(|&s| s == 0));
    }
}
