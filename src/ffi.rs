// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Note: The API is not stable and may change in future versions.

use std::ptr;
use std::sync::atomic;
use std::time::Duration;

use libc::c_char;
use libc::c_int;
use libc::c_void;
use libc::size_t;

use crate::Bbr;
use crate::BbrConfig;
use crate::BbrStateMachine;
use crate::CongestionController;
use crate::Config;

struct LogWriter {
    cb: extern "C" fn(data: *const u8, data_len: size_t, argp: *mut c_void),
    argp: std::sync::atomic::AtomicPtr<c_void>,
}

impl log::Log for LogWriter {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let line = format!("{}: {}\n", record.target(), record.args());
        (self.cb)(
            line.as_ptr(),
            line.len(),
            self.argp.load(atomic::Ordering::Relaxed),
        );
    }

    fn flush(&self) {}
}

/// Create default configuration.
/// The caller is responsible for the memory of the Config and should properly
/// destroy it by calling `tbbr_config_free`.
#[no_mangle]
pub extern "C" fn tbbr_config_new() -> *mut Config {
    Box::into_raw(Box::new(Config::new()))
}

/// Destroy a Config instance.
#[no_mangle]
pub extern "C" fn tbbr_config_free(config: *mut Config) {
    if config.is_null() {
        return;
    }
    unsafe {
        let _ = Box::from_raw(config);
    };
}

/// Set the size of a full segment in bytes.
/// The default value is 1000.
#[no_mangle]
pub extern "C" fn tbbr_config_set_segment_size(config: &mut Config, v: u64) {
    config.set_segment_size(v);
}

/// Set the cwnd gain. The default value is 2.0.
#[no_mangle]
pub extern "C" fn tbbr_config_set_cwnd_gain(config: &mut Config, v: f64) {
    config.set_cwnd_gain(v);
}

/// Set the interval between ProbeRTT rounds in milliseconds.
/// The default value is 10000.
#[no_mangle]
pub extern "C" fn tbbr_config_set_probe_rtt_interval(config: &mut Config, v: u64) {
    config.set_probe_rtt_interval(Duration::from_millis(v));
}

/// Set the duration of a ProbeRTT round in milliseconds.
/// The default value is 200.
#[no_mangle]
pub extern "C" fn tbbr_config_set_probe_rtt_duration(config: &mut Config, v: u64) {
    config.set_probe_rtt_duration(Duration::from_millis(v));
}

/// Set the number of segments the cwnd must exceed to leave Startup.
/// The default value is 10.
#[no_mangle]
pub extern "C" fn tbbr_config_set_startup_exit_segments(config: &mut Config, v: u64) {
    config.set_startup_exit_segments(v);
}

/// Set the cwnd used during ProbeRTT in segments.
/// The default value is 4.
#[no_mangle]
pub extern "C" fn tbbr_config_set_probe_rtt_cwnd_segments(config: &mut Config, v: u64) {
    config.set_probe_rtt_cwnd_segments(v);
}

/// Create a BBR controller.
/// Return NULL if the configuration is invalid. The caller is responsible for
/// the memory of the controller and should destroy it by calling
/// `tbbr_bbr_free`.
#[no_mangle]
pub extern "C" fn tbbr_bbr_new(config: &Config) -> *mut Bbr {
    match Bbr::new(BbrConfig::from(config)) {
        Ok(bbr) => Box::into_raw(Box::new(bbr)),
        Err(_) => ptr::null_mut(),
    }
}

/// Destroy a BBR controller.
#[no_mangle]
pub extern "C" fn tbbr_bbr_free(bbr: *mut Bbr) {
    if bbr.is_null() {
        return;
    }
    unsafe {
        let _ = Box::from_raw(bbr);
    };
}

/// Feed a delivery sample. Times are in microseconds since the caller's clock
/// origin. Return 0 on success or a negative error number if the sample was
/// rejected.
#[no_mangle]
pub extern "C" fn tbbr_bbr_on_delivery_sample(
    bbr: &mut Bbr,
    delivered_bytes: u64,
    rtt_us: u64,
    now_us: u64,
) -> c_int {
    match bbr.on_delivery_sample(
        delivered_bytes,
        Duration::from_micros(rtt_us),
        Duration::from_micros(now_us),
    ) {
        Ok(_) => 0,
        Err(e) => e.to_errno(),
    }
}

/// Notify the controller that a timer fired.
#[no_mangle]
pub extern "C" fn tbbr_bbr_on_timer_expiry(bbr: &mut Bbr, timer_id: u64, now_us: u64) {
    bbr.on_timer_expiry(timer_id, Duration::from_micros(now_us));
}

/// Return the pacing rate in bytes per second.
#[no_mangle]
pub extern "C" fn tbbr_bbr_pacing_rate(bbr: &Bbr) -> f64 {
    bbr.pacing_rate()
}

/// Return the congestion window in bytes.
#[no_mangle]
pub extern "C" fn tbbr_bbr_congestion_window(bbr: &Bbr) -> u64 {
    bbr.congestion_window()
}

/// Return the name of the current state as a static nul-terminated string.
#[no_mangle]
pub extern "C" fn tbbr_bbr_phase(bbr: &Bbr) -> *const c_char {
    let name: &'static [u8] = match bbr.phase() {
        BbrStateMachine::Startup => b"startup\0",
        BbrStateMachine::Drain => b"drain\0",
        BbrStateMachine::ProbeBW => b"probe_bw\0",
        BbrStateMachine::ProbeRTT => b"probe_rtt\0",
    };
    name.as_ptr() as *const c_char
}

/// Set logger.
/// `cb` is a callback function that will be called for each log message.
/// `data` is a '\n' terminated log message and `argp` is user-defined data that will be passed to
/// the callback.
/// `level` represents the log level.
#[no_mangle]
pub extern "C" fn tbbr_set_logger(
    cb: extern "C" fn(data: *const u8, data_len: size_t, argp: *mut c_void),
    argp: *mut c_void,
    level: log::LevelFilter,
) {
    let argp = atomic::AtomicPtr::new(argp);
    let logger = Box::new(LogWriter { cb, argp });
    let _ = log::set_boxed_logger(logger);
    log::set_max_level(level);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn ffi_bbr_lifecycle() {
        let config = tbbr_config_new();
        let conf = unsafe { &mut *config };
        tbbr_config_set_segment_size(conf, 1000);
        tbbr_config_set_cwnd_gain(conf, 2.0);

        let bbr = tbbr_bbr_new(conf);
        assert!(!bbr.is_null());
        let b = unsafe { &mut *bbr };

        let phase = unsafe { CStr::from_ptr(tbbr_bbr_phase(b)) };
        assert_eq!(phase.to_str().unwrap(), "startup");

        assert_eq!(tbbr_bbr_on_delivery_sample(b, 5000, 50_000, 1_000_000), 0);
        assert_eq!(tbbr_bbr_congestion_window(b), 10000);
        assert!((tbbr_bbr_pacing_rate(b) - 100_000.0).abs() < 1e-6);

        assert_eq!(tbbr_bbr_on_delivery_sample(b, 0, 50_000, 1_100_000), -1);
        assert_eq!(tbbr_bbr_on_delivery_sample(b, 1000, 0, 1_100_000), -1);
        tbbr_bbr_on_timer_expiry(b, 1, 2_000_000);
        assert_eq!(tbbr_bbr_congestion_window(b), 10000);

        tbbr_bbr_free(bbr);
        tbbr_config_free(config);
    }

    #[test]
    fn ffi_bbr_invalid_config() {
        let config = tbbr_config_new();
        let conf = unsafe { &mut *config };
        tbbr_config_set_segment_size(conf, 0);
        assert!(tbbr_bbr_new(conf).is_null());
        tbbr_config_free(config);
    }
}
