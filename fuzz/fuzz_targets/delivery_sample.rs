#![no_main]

use std::time::Duration;

use libfuzzer_sys::fuzz_target;

use tbbr::Bbr;
use tbbr::BbrConfig;
use tbbr::BbrStateMachine;
use tbbr::CongestionController;

const SEGMENT_SIZE: u64 = 1000;

// Each sample takes 10 bytes: delivered bytes (4), rtt in us (4) and the
// time advance in ms (2).
fuzz_target!(|data: &[u8]| {
    let mut bbr = Bbr::new(BbrConfig::new(SEGMENT_SIZE)).unwrap();
    let mut now = Duration::ZERO;
    let mut max_bandwidth = 0.0;
    let mut min_rtt = Duration::MAX;

    for chunk in data.chunks_exact(10) {
        let delivered = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as u64;
        let rtt = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]) as u64;
        let advance = u16::from_le_bytes([chunk[8], chunk[9]]) as u64;
        now += Duration::from_millis(advance);

        let accepted = bbr
            .on_delivery_sample(delivered, Duration::from_micros(rtt), now)
            .is_ok();
        assert_eq!(accepted, delivered > 0 && rtt > 0);

        assert!(bbr.max_bandwidth() >= max_bandwidth);
        max_bandwidth = bbr.max_bandwidth();
        if let Some(rtt) = bbr.min_rtt() {
            assert!(rtt <= min_rtt);
            min_rtt = rtt;
        }

        assert!(bbr.congestion_window() >= SEGMENT_SIZE);
        if bbr.phase() == BbrStateMachine::ProbeRTT {
            assert_eq!(bbr.congestion_window(), 4 * SEGMENT_SIZE);
        }
        assert!(bbr.pacing_rate() >= 0.0);
    }
});
