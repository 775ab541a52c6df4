//! In-process format probing, used at session start to fail fast on a
//! content segment whose asset does not conform to the program format.

use std::path::Path;

use anyhow::{anyhow, Result};
use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::input;
use ffmpeg::media::Type;

pub struct ProbedFormat {
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
}

pub fn probe_asset(path: &Path) -> Result<ProbedFormat> {
    let ictx = input(path)?;
    let stream = ictx
        .streams()
        .best(Type::Video)
        .ok_or_else(|| anyhow!("no video stream in {}", path.display()))?;

    let (width, height) = unsafe {
        let p = stream.parameters().as_ptr();
        ((*p).width as u32, (*p).height as u32)
    };

    let mut duration_secs = ictx.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64;
    if duration_secs <= 0.0 {
        let tb = stream.time_base();
        duration_secs = stream.duration() as f64 * tb.numerator() as f64 / tb.denominator() as f64;
    }

    Ok(ProbedFormat { width, height, duration_secs })
}
