//! Minimal RTP packetizer for the plain-transport egress path.
//!
//! `str0m` hands us already-depacketized Opus frames on the receive side
//! (`Event::MediaData`); the external pipeline expects real RTP packets on
//! its `udpsrc`. This rebuilds a plain RTP/Opus packet per frame — one
//! producer, one payload type, no multi-SSRC mixing, so a 12-byte fixed
//! header is all that's needed (no extensions, no CSRC list).

const RTP_VERSION: u8 = 2;

pub struct Packetizer {
    ssrc: u32,
    payload_type: u8,
    seq: u16,
}

impl Packetizer {
    pub fn new(ssrc: u32, payload_type: u8) -> Self {
        Self {
            ssrc,
            payload_type,
            seq: rand::random(),
        }
    }

    /// Builds one RTP packet carrying `payload`, stamped with `timestamp`
    /// (RTP clock units, not wall-clock). `marker` is set on the first
    /// packet of a talkspurt; Opus doesn't require it but the gstreamer
    /// depayloader tolerates either value.
    pub fn packetize(&mut self, payload: &[u8], timestamp: u32, marker: bool) -> Vec<u8> {
        let mut packet = Vec::with_capacity(12 + payload.len());
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);

        let marker_bit = if marker { 0x80 } else { 0x00 };
        packet.push((RTP_VERSION << 6) & 0xC0);
        packet.push(marker_bit | (self.payload_type & 0x7F));
        packet.extend_from_slice(&seq.to_be_bytes());
        packet.extend_from_slice(&timestamp.to_be_bytes());
        packet.extend_from_slice(&self.ssrc.to_be_bytes());
        packet.extend_from_slice(payload);

        packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_has_fixed_12_byte_header_plus_payload() {
        let mut packetizer = Packetizer::new(0xdead_beef, 111);
        let payload = vec![1, 2, 3, 4];
        let packet = packetizer.packetize(&payload, 960, true);

        assert_eq!(packet.len(), 12 + payload.len());
        assert_eq!(packet[0] >> 6, RTP_VERSION);
        assert_eq!(packet[1] & 0x80, 0x80, "marker bit should be set");
        assert_eq!(packet[1] & 0x7F, 111);
        assert_eq!(&packet[8..12], &0xdead_beefu32.to_be_bytes());
        assert_eq!(&packet[12..], payload.as_slice());
    }

    #[test]
    fn sequence_number_increments_across_packets() {
        let mut packetizer = Packetizer::new(1, 111);
        let a = packetizer.packetize(&[0], 0, false);
        let b = packetizer.packetize(&[0], 960, false);
        let seq_a = u16::from_be_bytes([a[2], a[3]]);
        let seq_b = u16::from_be_bytes([b[2], b[3]]);
        assert_eq!(seq_b, seq_a.wrapping_add(1));
    }
}
