//! Runtime diagnostics.
//!
//! [`PipelineStats`] is a counter snapshot the aggregator logs every
//! `stats_interval_cycles` cycles.  Heap figures come from ESP-IDF on
//! target and are synthetic on host.  A panic hook logs the reason through
//! the `log` facade before the default handler resets the chip.

use core::fmt;

/// Telemetry pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Aggregator cycles run.
    pub cycles: u64,
    /// Frames handed to the transport.
    pub frames_sent: u64,
    /// Cycles with neither a motion nor a pulse sample.
    pub empty_cycles: u64,
    /// Cumulative drops reported by the motion queue.
    pub motion_dropped: u32,
    /// Cumulative drops reported by the pulse queue.
    pub pulse_dropped: u32,
    /// Ticker overruns (cycle fell a whole period behind).
    pub overruns: u32,
    /// Frames the transport accepted for the radio.
    pub frames_delivered: u64,
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cycles={} sent={} delivered={} empty={} drops(motion/pulse)={}/{} overruns={} heap_free={}",
            self.cycles,
            self.frames_sent,
            self.frames_delivered,
            self.empty_cycles,
            self.motion_dropped,
            self.pulse_dropped,
            self.overruns,
            free_heap_bytes(),
        )
    }
}

/// Free heap in bytes.
#[cfg(target_os = "espidf")]
pub fn free_heap_bytes() -> u32 {
    unsafe { esp_idf_svc::sys::esp_get_free_heap_size() }
}

/// Free heap in bytes (simulation: a fixed 300 KB).
#[cfg(not(target_os = "espidf"))]
pub fn free_heap_bytes() -> u32 {
    307_200
}

/// Install a panic hook that logs the reason before the default handler
/// aborts.
pub fn install_panic_handler() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let reason = if let Some(msg) = info.payload().downcast_ref::<&str>() {
            *msg
        } else if let Some(msg) = info.payload().downcast_ref::<String>() {
            msg.as_str()
        } else {
            "unknown panic"
        };
        match info.location() {
            Some(loc) => log::error!("PANIC: {} at {}:{}", reason, loc.file(), loc.line()),
            None => log::error!("PANIC: {}", reason),
        }
        default_hook(info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_line_lists_every_counter() {
        let s = PipelineStats {
            cycles: 250,
            frames_sent: 240,
            frames_delivered: 200,
            empty_cycles: 10,
            motion_dropped: 3,
            pulse_dropped: 0,
            overruns: 1,
        };
        let line = s.to_string();
        assert!(line.starts_with("cycles=250 sent=240 delivered=200 empty=10"));
        assert!(line.contains("drops(motion/pulse)=3/0"));
        assert!(line.contains("overruns=1"));
    }
}
