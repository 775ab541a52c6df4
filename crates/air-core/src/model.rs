//! Shared data model: program format, blocks/segments, frames, and the
//! rational frame-rate type the clock and PTS math are built on.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A frame rate expressed as an exact rational, e.g. 30000/1001 for 29.97 fps.
/// Never collapsed to a float — `deadline`/`pts_90k` depend on exactness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RationalFps {
    pub num: u32,
    pub den: u32,
}

impl RationalFps {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    pub const NTSC_30: Self = Self::new(30000, 1001);
    pub const FILM_25: Self = Self::new(25, 1);
}

/// Wall/content time since session start, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentTimeMs(pub u64);

/// Monotonic count of frames emitted since session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionFrameIndex(pub u64);

impl SessionFrameIndex {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub fps: RationalFps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramFormat {
    pub video: VideoFormat,
    pub audio: AudioFormat,
}

impl ProgramFormat {
    /// `preserve` keeps source aspect inside the program frame with pillar/
    /// letterbox bars; `stretch` fills the frame, distorting if needed.
    pub fn matches(&self, other: &ProgramFormat) -> bool {
        self == other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectPolicy {
    Preserve,
    Stretch,
}

/// A crossfade-style fade applied at the head and/or tail of a segment.
/// Both durations may be zero (no fade).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionSpec {
    pub fade_in_ms: u32,
    pub fade_out_ms: u32,
}

impl TransitionSpec {
    pub const NONE: Self = Self { fade_in_ms: 0, fade_out_ms: 0 };
}

/// A source asset segment or a generated pad segment within a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Segment {
    Content {
        asset_path: String,
        asset_start_offset_ms: u64,
        duration_ms: u64,
        aspect_policy: AspectPolicy,
        transition: TransitionSpec,
        /// Loudness trim applied on top of any transition fade, in dB.
        /// `0.0` is unity gain. Negative attenuates, positive boosts.
        #[serde(default)]
        gain_db: f32,
    },
    Pad {
        duration_ms: u64,
    },
}

impl Segment {
    pub fn duration_ms(&self) -> u64 {
        match self {
            Segment::Content { duration_ms, .. } => *duration_ms,
            Segment::Pad { duration_ms } => *duration_ms,
        }
    }

    pub fn is_pad(&self) -> bool {
        matches!(self, Segment::Pad { .. })
    }

    pub fn transition(&self) -> TransitionSpec {
        match self {
            Segment::Content { transition, .. } => *transition,
            Segment::Pad { .. } => TransitionSpec::NONE,
        }
    }
}

/// A scheduled unit of playout: an ordered list of segments with no gaps
/// between them. Submitted by the control plane ahead of playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: Uuid,
    pub segments: Vec<Segment>,
    /// Wall-clock UTC ms the block's first segment is scheduled to start.
    /// `None` means "play as soon as the queue reaches it" — the common
    /// case for a block submitted just-in-time with no fixed air time.
    /// When set and already in the past at submission, the session joins
    /// the block mid-stream: elapsed segments are dropped and the first
    /// surviving one starts part-way through (see `air_pipeline::queue`).
    #[serde(default)]
    pub start_utc_ms: Option<u64>,
    /// Wall-clock UTC ms the block is expected to finish by. Advisory —
    /// the session does not truncate a segment in flight to hit it.
    #[serde(default)]
    pub end_utc_ms: Option<u64>,
}

impl Block {
    pub fn total_duration_ms(&self) -> u64 {
        self.segments.iter().map(Segment::duration_ms).sum()
    }
}

#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Packed YUV420P, no stride padding: Y plane then U then V.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub session_frame_index: SessionFrameIndex,
    pub pts_90k: u64,
    /// Identifies which producer activation emitted this frame. Bumped by
    /// `TickLoop::set_active` every seam commit, so `origin_segment_index`
    /// on two consecutive frames differing is exactly a seam; the
    /// `origin(i) == active(i)` invariant is then directly checkable on the
    /// frame itself instead of only provable structurally in `seam_rule`.
    pub origin_segment_index: u64,
    /// Content time into the active segment, in ms, at the moment this
    /// frame was stamped.
    pub ct_ms: u64,
    /// Transition alpha applied to this frame, 0.0 (fully neutral) to 1.0
    /// (unmodified content).
    pub alpha: f32,
}

#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Interleaved signed 16-bit PCM samples.
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
    pub pts_90k: u64,
    pub origin_segment_index: u64,
    pub ct_ms: u64,
    pub alpha: f32,
}
