//! MPEG-TS packetizer: PAT/PMT generation with real CRC-32, PES
//! encapsulation with PTS/DTS, 188-byte fragmentation with per-PID
//! continuity counters, and PCR adaptation-field insertion on the video PID
//! at an independent cadence from the media itself.
//!
//! Generalized from a reference AAC-into-TS muxer: this version drives both
//! elementary streams, computes real PAT/PMT CRCs instead of leaving them
//! zeroed, and adds PCR, which the reference left entirely absent.

use air_core::clock::PTS_HZ;

use super::crc32::crc32_mpeg2;

pub const TS_PACKET_SIZE: usize = 188;
pub const SYNC_BYTE: u8 = 0x47;

pub const STREAM_TYPE_H264: u8 = 0x1B;
pub const STREAM_TYPE_AAC_ADTS: u8 = 0x0F;
const STREAM_ID_VIDEO: u8 = 0xE0;
const STREAM_ID_AUDIO: u8 = 0xC0;
const PCR_HZ: u64 = 27_000_000;

#[derive(Debug, Clone, Copy)]
pub struct TsConfig {
    pub video_pid: u16,
    pub audio_pid: u16,
    pub pmt_pid: u16,
    pub pcr_pid: u16,
    pub transport_stream_id: u16,
    pub program_number: u16,
    pub pcr_interval_90k: u64,
    pub psi_interval_packets: u64,
}

impl Default for TsConfig {
    fn default() -> Self {
        Self {
            video_pid: 0x0100,
            audio_pid: 0x0101,
            pmt_pid: 0x1000,
            pcr_pid: 0x0100,
            transport_stream_id: 1,
            program_number: 1,
            pcr_interval_90k: PTS_HZ * 40 / 1000, // 40ms default
            psi_interval_packets: 40,
        }
    }
}

pub struct TsMuxer {
    config: TsConfig,
    video_cc: u8,
    audio_cc: u8,
    pat_cc: u8,
    pmt_cc: u8,
    packets_emitted: u64,
    last_pcr_90k: Option<u64>,
}

impl TsMuxer {
    pub fn new(config: TsConfig) -> Self {
        Self {
            config,
            video_cc: 0,
            audio_cc: 0,
            pat_cc: 0,
            pmt_cc: 0,
            packets_emitted: 0,
            last_pcr_90k: None,
        }
    }

    fn psi_due(&self) -> bool {
        self.packets_emitted % self.config.psi_interval_packets == 0
    }

    pub fn mux_video(&mut self, access_unit: &[u8], pts_90k: u64, dts_90k: u64, keyframe: bool) -> Vec<[u8; TS_PACKET_SIZE]> {
        let mut out = Vec::new();
        if self.psi_due() {
            out.push(self.generate_pat());
            out.push(self.generate_pmt());
        }
        let pcr = self.pcr_due(pts_90k);
        let pes = build_pes(STREAM_ID_VIDEO, access_unit, pts_90k, Some(dts_90k));
        let cc = &mut self.video_cc;
        out.extend(fragment_pes(&pes, self.config.video_pid, cc, keyframe, pcr));
        self.packets_emitted += out.len() as u64;
        out
    }

    pub fn mux_audio(&mut self, adts_frame: &[u8], pts_90k: u64) -> Vec<[u8; TS_PACKET_SIZE]> {
        let mut out = Vec::new();
        if self.psi_due() {
            out.push(self.generate_pat());
            out.push(self.generate_pmt());
        }
        let pcr = if self.config.pcr_pid == self.config.audio_pid { self.pcr_due(pts_90k) } else { None };
        let pes = build_pes(STREAM_ID_AUDIO, adts_frame, pts_90k, None);
        let cc = &mut self.audio_cc;
        out.extend(fragment_pes(&pes, self.config.audio_pid, cc, false, pcr));
        self.packets_emitted += out.len() as u64;
        out
    }

    fn pcr_due(&mut self, pts_90k: u64) -> Option<u64> {
        let due = match self.last_pcr_90k {
            None => true,
            Some(last) => pts_90k.saturating_sub(last) >= self.config.pcr_interval_90k,
        };
        if due {
            self.last_pcr_90k = Some(pts_90k);
            Some(pts_90k * (PCR_HZ / PTS_HZ))
        } else {
            None
        }
    }

    pub fn generate_pat(&mut self) -> [u8; TS_PACKET_SIZE] {
        let mut section = Vec::with_capacity(13);
        section.push(0x00); // table id: PAT
        // section_length placeholder patched below
        section.push(0x00);
        section.push(0x00);
        section.extend_from_slice(&self.config.transport_stream_id.to_be_bytes());
        section.push(0xC1); // version 0, current_next_indicator
        section.push(0x00); // section number
        section.push(0x00); // last section number
        section.extend_from_slice(&self.config.program_number.to_be_bytes());
        section.push(0xE0 | ((self.config.pmt_pid >> 8) as u8 & 0x1F));
        section.push((self.config.pmt_pid & 0xFF) as u8);

        let section_length = (section.len() - 3 + 4) as u16; // bytes after length field + CRC
        section[1] = 0xB0 | ((section_length >> 8) as u8 & 0x0F);
        section[2] = (section_length & 0xFF) as u8;

        let crc = crc32_mpeg2(&section);
        section.extend_from_slice(&crc.to_be_bytes());

        psi_packet(0x0000, &mut self.pat_cc, &section)
    }

    pub fn generate_pmt(&mut self) -> [u8; TS_PACKET_SIZE] {
        let mut section = Vec::with_capacity(24);
        section.push(0x02); // table id: PMT
        section.push(0x00);
        section.push(0x00);
        section.extend_from_slice(&self.config.program_number.to_be_bytes());
        section.push(0xC1);
        section.push(0x00);
        section.push(0x00);
        section.push(0xE0 | ((self.config.pcr_pid >> 8) as u8 & 0x1F));
        section.push((self.config.pcr_pid & 0xFF) as u8);
        section.extend_from_slice(&[0xF0, 0x00]); // program info length = 0

        for (stream_type, pid) in [
            (STREAM_TYPE_H264, self.config.video_pid),
            (STREAM_TYPE_AAC_ADTS, self.config.audio_pid),
        ] {
            section.push(stream_type);
            section.push(0xE0 | ((pid >> 8) as u8 & 0x1F));
            section.push((pid & 0xFF) as u8);
            section.extend_from_slice(&[0xF0, 0x00]); // ES info length = 0
        }

        let section_length = (section.len() - 3 + 4) as u16;
        section[1] = 0xB0 | ((section_length >> 8) as u8 & 0x0F);
        section[2] = (section_length & 0xFF) as u8;

        let crc = crc32_mpeg2(&section);
        section.extend_from_slice(&crc.to_be_bytes());

        psi_packet(self.config.pmt_pid, &mut self.pmt_cc, &section)
    }
}

fn psi_packet(pid: u16, cc: &mut u8, section: &[u8]) -> [u8; TS_PACKET_SIZE] {
    let mut packet = [0xFFu8; TS_PACKET_SIZE];
    packet[0] = SYNC_BYTE;
    packet[1] = 0x40 | ((pid >> 8) as u8 & 0x1F);
    packet[2] = (pid & 0xFF) as u8;
    packet[3] = 0x10 | *cc;
    *cc = (*cc + 1) & 0x0F;
    packet[4] = 0x00; // pointer field
    let avail = TS_PACKET_SIZE - 5;
    let n = section.len().min(avail);
    packet[5..5 + n].copy_from_slice(&section[..n]);
    packet
}

fn write_timestamp(buf: &mut Vec<u8>, prefix: u8, ts: u64) {
    buf.push(((prefix << 4) | ((ts >> 29) as u8 & 0x0E) | 0x01) as u8);
    buf.push(((ts >> 22) & 0xFF) as u8);
    buf.push((((ts >> 14) & 0xFE) | 0x01) as u8);
    buf.push(((ts >> 7) & 0xFF) as u8);
    buf.push((((ts << 1) & 0xFE) | 0x01) as u8);
}

fn build_pes(stream_id: u8, payload: &[u8], pts_90k: u64, dts_90k: Option<u64>) -> Vec<u8> {
    let mut pes = Vec::with_capacity(payload.len() + 19);
    pes.extend_from_slice(&[0x00, 0x00, 0x01, stream_id]);

    let header_len: usize = if dts_90k.is_some() { 13 } else { 8 };
    let pes_length = (payload.len() + header_len - 6).min(u16::MAX as usize) as u16;
    pes.extend_from_slice(&pes_length.to_be_bytes());
    pes.push(0x84); // marker bits + data_alignment_indicator
    pes.push(if dts_90k.is_some() { 0xC0 } else { 0x80 }); // PTS(+DTS) flags
    pes.push(if dts_90k.is_some() { 10 } else { 5 });

    if let Some(dts) = dts_90k {
        write_timestamp(&mut pes, 0x03, pts_90k);
        write_timestamp(&mut pes, 0x01, dts);
    } else {
        write_timestamp(&mut pes, 0x02, pts_90k);
    }
    pes.extend_from_slice(payload);
    pes
}

/// Pack a 6-byte PCR adaptation field value: 33-bit base at 90kHz, 9-bit
/// extension. Extension is always 0 — the base alone is already the full
/// precision this engine's 90kHz PTS domain can supply.
fn pcr_bytes(pcr_27m: u64) -> [u8; 6] {
    let base = (pcr_27m / 300) & 0x1_FFFF_FFFF;
    let ext: u64 = 0;
    [
        (base >> 25) as u8,
        (base >> 17) as u8,
        (base >> 9) as u8,
        (base >> 1) as u8,
        (((base & 1) << 7) as u8) | 0x7E | ((ext >> 8) as u8 & 0x01),
        (ext & 0xFF) as u8,
    ]
}

fn fragment_pes(pes: &[u8], pid: u16, cc: &mut u8, keyframe: bool, pcr_27m: Option<u64>) -> Vec<[u8; TS_PACKET_SIZE]> {
    let mut packets = Vec::new();
    let mut offset = 0;
    let mut first = true;

    while offset < pes.len() || first {
        let mut packet = [0xFFu8; TS_PACKET_SIZE];
        packet[0] = SYNC_BYTE;
        packet[1] = if first { 0x40 } else { 0x00 } | ((pid >> 8) as u8 & 0x1F);
        packet[2] = (pid & 0xFF) as u8;

        let mut payload_start = 4;
        if first && pcr_27m.is_some() {
            let adaptation_len = 7u8; // flags(1) + pcr(6)
            packet[3] = 0x30 | *cc;
            packet[4] = adaptation_len;
            packet[5] = if keyframe { 0x50 } else { 0x10 }; // random_access + PCR flag
            packet[6..12].copy_from_slice(&pcr_bytes(pcr_27m.unwrap()));
            payload_start = 4 + 1 + adaptation_len as usize;
        } else {
            packet[3] = 0x10 | *cc;
        }
        *cc = (*cc + 1) & 0x0F;

        let available = TS_PACKET_SIZE - payload_start;
        let remaining = pes.len() - offset;
        let to_copy = available.min(remaining);
        packet[payload_start..payload_start + to_copy].copy_from_slice(&pes[offset..offset + to_copy]);

        packets.push(packet);
        offset += to_copy;
        first = false;
    }

    packets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packets_are_sync_byte_framed() {
        let mut mux = TsMuxer::new(TsConfig::default());
        for pkt in mux.mux_video(&[0u8; 400], 0, 0, true) {
            assert_eq!(pkt.len(), TS_PACKET_SIZE);
            assert_eq!(pkt[0], SYNC_BYTE);
        }
    }

    #[test]
    fn pat_and_pmt_have_valid_crc() {
        let mut mux = TsMuxer::new(TsConfig::default());
        let pat = mux.generate_pat();
        let section_len = (((pat[5] as usize & 0x0F) << 8) | pat[6] as usize) + 3;
        let section = &pat[5..5 + section_len];
        let (body, crc_bytes) = section.split_at(section.len() - 4);
        let expected = crc32_mpeg2(body);
        assert_eq!(u32::from_be_bytes(crc_bytes.try_into().unwrap()), expected);
    }

    #[test]
    fn continuity_counter_wraps_at_sixteen() {
        let mut mux = TsMuxer::new(TsConfig { psi_interval_packets: 1_000_000, ..TsConfig::default() });
        let mut last_cc = None;
        for i in 0..20 {
            let pkts = mux.mux_video(&[0u8; 10], i * 3000, i * 3000, false);
            let cc = pkts[0][3] & 0x0F;
            if let Some(last) = last_cc {
                assert_eq!(cc, (last + 1) & 0x0F);
            }
            last_cc = Some(cc);
        }
    }

    #[test]
    fn pcr_inserted_on_first_frame_then_at_cadence() {
        let mut mux = TsMuxer::new(TsConfig { pcr_interval_90k: 90_000, psi_interval_packets: 1_000_000, ..TsConfig::default() });
        let has_adaptation = |pkt: &[u8; TS_PACKET_SIZE]| pkt[3] & 0x20 != 0;
        let first = mux.mux_video(&[0u8; 10], 0, 0, true);
        assert!(has_adaptation(&first[0]), "first video frame must carry PCR");
        let second = mux.mux_video(&[0u8; 10], 1, 1, false);
        assert!(!has_adaptation(&second[0]), "PCR must not repeat before its interval");
    }
}
