//! ADTS framing for AAC access units. ffmpeg's AAC encoder emits raw LATM/
//! bare AAC frames; MPEG-TS elementary streams need each access unit
//! self-delimited, which H.264's Annex-B bitstream already is but AAC is
//! not — ADTS is the standard fix.

const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

fn sample_rate_index(rate: u32) -> u8 {
    SAMPLE_RATES.iter().position(|&r| r == rate).unwrap_or(4) as u8 // default 44100
}

/// Prepend a 7-byte ADTS header (no CRC) to a raw AAC-LC access unit.
pub fn wrap_adts(aac: &[u8], sample_rate: u32, channels: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(aac.len() + 7);
    let profile: u8 = 1; // AAC-LC, MPEG-4 object type - 1
    let freq_idx = sample_rate_index(sample_rate);
    let chan_cfg = channels as u8;
    let frame_len = (aac.len() + 7) as u16;

    out.push(0xFF);
    out.push(0xF1); // MPEG-4, no CRC
    out.push((profile << 6) | (freq_idx << 2) | (chan_cfg >> 2));
    out.push(((chan_cfg & 0x03) << 6) | ((frame_len >> 11) as u8));
    out.push((frame_len >> 3) as u8);
    out.push((((frame_len & 0x07) as u8) << 5) | 0x1F);
    out.push(0xFC);
    out.extend_from_slice(aac);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_has_adts_sync() {
        let framed = wrap_adts(&[0u8; 4], 48000, 2);
        assert_eq!(framed[0], 0xFF);
        assert_eq!(framed[1] & 0xF0, 0xF0);
        assert_eq!(framed.len(), 11);
    }

    #[test]
    fn unknown_sample_rate_falls_back_to_44100_index() {
        assert_eq!(sample_rate_index(12345), 4);
    }
}
