use crate::config::{MotionTuning, RunConfig};
use crate::link::{Command, Link};
use log::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetySignal {
    None,
    AbortRequested,
    StopRequested,
    LimitReached,
}

/// Which end-of-travel check a motion loop runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitMode {
    /// Configured soft limits only. No check when either limit is unset.
    SoftLimits,
    /// Stall heuristic only.
    Stability,
    /// Soft limits when both are set, otherwise the stall heuristic.
    SoftOrStability,
}

/// True when `sample` is within `margin` of either limit or already past it.
pub fn soft_limit_reached(sample: u16, home: u16, max: u16, margin: u16) -> bool {
    let (low, high) = if home <= max { (home, max) } else { (max, home) };
    sample <= low.saturating_add(margin) || sample >= high.saturating_sub(margin)
}

/// Declares end of travel once consecutive samples stay within `tolerance`
/// of each other for `required` polls in a row.
#[derive(Debug, Clone)]
pub struct StabilityDetector {
    last: Option<u16>,
    stable_polls: u32,
    tolerance: u16,
    required: u32,
}

impl StabilityDetector {
    pub fn new(tolerance: u16, required: u32) -> Self {
        Self {
            last: None,
            stable_polls: 0,
            tolerance,
            required: required.max(1),
        }
    }

    pub fn from_tuning(tuning: &MotionTuning) -> Self {
        Self::new(tuning.stability_tolerance, tuning.stability_polls)
    }

    pub fn observe(&mut self, sample: u16) -> bool {
        match self.last {
            Some(last) if last.abs_diff(sample) <= self.tolerance => self.stable_polls += 1,
            _ => self.stable_polls = 0,
        }
        self.last = Some(sample);
        self.stable_polls >= self.required
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.stable_polls = 0;
    }
}

/// Cooperative safety check run by every long motion loop.
///
/// The monitor is the only reader of the command channel while a motion is
/// active: abort and stop frames become signals, anything else is dropped.
#[derive(Debug, Clone)]
pub struct SafetyMonitor {
    mode: LimitMode,
    limits: Option<(u16, u16)>,
    margin: u16,
    stability: StabilityDetector,
    dropped: u32,
}

impl SafetyMonitor {
    pub fn new(mode: LimitMode, config: &RunConfig, tuning: &MotionTuning) -> Self {
        Self {
            mode,
            limits: config.soft_limits(),
            margin: tuning.limit_margin,
            stability: StabilityDetector::from_tuning(tuning),
            dropped: 0,
        }
    }

    /// Classify the channel, then the position. Never blocks.
    pub fn poll<L: Link + ?Sized>(&mut self, link: &mut L, sample: u16) -> SafetySignal {
        let mut stop = false;
        while let Some(command) = link.poll_command() {
            match command {
                Command::Abort => {
                    debug!("abort received mid-motion");
                    return SafetySignal::AbortRequested;
                }
                Command::StopRun => stop = true,
                other => {
                    self.dropped += 1;
                    warn!("dropping {} frame received mid-motion", other.key());
                }
            }
        }
        if stop {
            debug!("stop received mid-motion");
            return SafetySignal::StopRequested;
        }

        if self.limit_reached(sample) {
            return SafetySignal::LimitReached;
        }
        SafetySignal::None
    }

    fn limit_reached(&mut self, sample: u16) -> bool {
        match (self.mode, self.limits) {
            (LimitMode::SoftLimits, Some((home, max)))
            | (LimitMode::SoftOrStability, Some((home, max))) => {
                soft_limit_reached(sample, home, max, self.margin)
            }
            (LimitMode::SoftLimits, None) => false,
            (LimitMode::Stability, _) | (LimitMode::SoftOrStability, None) => {
                self.stability.observe(sample)
            }
        }
    }

    /// Frames discarded because they were neither abort nor stop.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::ScriptedLink;

    fn limited(home: i64, max: i64) -> RunConfig {
        let mut cfg = RunConfig::default();
        cfg.set_home_limit(home);
        cfg.set_max_limit(max);
        cfg
    }

    #[test]
    fn abort_wins_over_stop() {
        let mut link = ScriptedLink::new();
        link.queue(Command::StopRun);
        link.queue(Command::Abort);
        let mut monitor = SafetyMonitor::new(
            LimitMode::SoftLimits,
            &RunConfig::default(),
            &MotionTuning::default(),
        );
        assert_eq!(monitor.poll(&mut link, 500), SafetySignal::AbortRequested);
    }

    #[test]
    fn other_frames_are_dropped_not_queued() {
        let mut link = ScriptedLink::new();
        link.queue(Command::QueryPosition);
        link.queue(Command::MoveTo(10));
        let mut monitor = SafetyMonitor::new(
            LimitMode::SoftLimits,
            &RunConfig::default(),
            &MotionTuning::default(),
        );
        assert_eq!(monitor.poll(&mut link, 500), SafetySignal::None);
        assert_eq!(monitor.dropped(), 2);
        assert_eq!(link.pending(), 0);
    }

    #[test]
    fn stop_reported_before_limit() {
        let mut link = ScriptedLink::new();
        link.queue(Command::StopRun);
        let mut monitor =
            SafetyMonitor::new(LimitMode::SoftLimits, &limited(100, 900), &MotionTuning::default());
        assert_eq!(monitor.poll(&mut link, 899), SafetySignal::StopRequested);
        assert_eq!(monitor.poll(&mut link, 899), SafetySignal::LimitReached);
    }

    #[test]
    fn soft_limit_window_includes_overshoot() {
        assert!(soft_limit_reached(898, 100, 900, 2));
        assert!(soft_limit_reached(950, 100, 900, 2));
        assert!(soft_limit_reached(102, 100, 900, 2));
        assert!(soft_limit_reached(3, 100, 900, 2));
        assert!(!soft_limit_reached(897, 100, 900, 2));
        assert!(!soft_limit_reached(103, 100, 900, 2));
    }

    #[test]
    fn soft_limits_ignored_until_both_set() {
        let mut cfg = RunConfig::default();
        cfg.set_max_limit(900);
        let mut link = ScriptedLink::new();
        let mut monitor = SafetyMonitor::new(LimitMode::SoftLimits, &cfg, &MotionTuning::default());
        for _ in 0..20 {
            assert_eq!(monitor.poll(&mut link, 900), SafetySignal::None);
        }
    }

    #[test]
    fn stability_needs_consecutive_quiet_polls() {
        let mut detector = StabilityDetector::new(2, 5);
        let samples = [100, 101, 102, 103, 104, 110, 111, 111, 112, 112];
        let hits: Vec<bool> = samples.iter().map(|s| detector.observe(*s)).collect();
        assert_eq!(hits.iter().filter(|h| **h).count(), 0);
        assert!(detector.observe(113));
    }

    #[test]
    fn fallback_mode_switches_on_configured_limits() {
        let tuning = MotionTuning::default();
        let mut link = ScriptedLink::new();

        let mut bare =
            SafetyMonitor::new(LimitMode::SoftOrStability, &RunConfig::default(), &tuning);
        let signals: Vec<_> = (0..6).map(|_| bare.poll(&mut link, 40)).collect();
        assert_eq!(signals[4], SafetySignal::None);
        assert_eq!(signals[5], SafetySignal::LimitReached);

        let mut fenced = SafetyMonitor::new(LimitMode::SoftOrStability, &limited(10, 90), &tuning);
        for _ in 0..10 {
            assert_eq!(fenced.poll(&mut link, 40), SafetySignal::None);
        }
    }
}
