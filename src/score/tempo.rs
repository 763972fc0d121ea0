//! The Tempo Adapter (§4.8): nudges the practice tempo up or down based on the last bar's
//! accuracy and timing spread.

/// Lower clamp on the tempo multiplier.
pub const MIN_TEMPO_MULTIPLIER: f64 = 0.5;
/// Upper clamp on the tempo multiplier.
pub const MAX_TEMPO_MULTIPLIER: f64 = 1.0;

const SLOW_DOWN_ACCURACY_THRESHOLD: f64 = 0.60;
const SLOW_DOWN_TIMING_ERROR_THRESHOLD: f64 = 0.50;
const SLOW_DOWN_FACTOR: f64 = 0.9;

const SPEED_UP_ACCURACY_THRESHOLD: f64 = 0.90;
const SPEED_UP_TIMING_ERROR_THRESHOLD: f64 = 0.10;
const SPEED_UP_FACTOR: f64 = 1.05;
const SPEED_UP_STREAK_REQUIRED: u32 = 2;

/// One bar's worth of counters fed to [`TempoAdapter::evaluate_bar`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BarStats {
    /// Events classified `on_time` within this bar.
    pub on_time_hits: u32,
    /// Total expected pitch-hits in this bar (across all groups that completed in it).
    pub expected_hits_in_bar: u32,
    /// Events classified `early` within this bar.
    pub early: u32,
    /// Events classified `late` within this bar.
    pub late: u32,
    /// Total matching events (on_time + early + late) within this bar.
    pub total_events_in_bar: u32,
}

impl BarStats {
    fn accuracy(&self) -> f64 {
        if self.expected_hits_in_bar == 0 {
            1.0
        } else {
            self.on_time_hits as f64 / self.expected_hits_in_bar as f64
        }
    }

    fn timing_error_fraction(&self) -> f64 {
        if self.total_events_in_bar == 0 {
            0.0
        } else {
            (self.early + self.late) as f64 / self.total_events_in_bar as f64
        }
    }

    fn is_good(&self) -> bool {
        self.accuracy() > SPEED_UP_ACCURACY_THRESHOLD && self.timing_error_fraction() < SPEED_UP_TIMING_ERROR_THRESHOLD
    }

    fn is_bad(&self) -> bool {
        self.accuracy() < SLOW_DOWN_ACCURACY_THRESHOLD || self.timing_error_fraction() > SLOW_DOWN_TIMING_ERROR_THRESHOLD
    }
}

/// Adjusts the practice tempo multiplier bar by bar, with hysteresis on the speed-up side.
#[derive(Debug, Clone)]
pub struct TempoAdapter {
    multiplier: f64,
    good_bar_streak: u32,
}

impl Default for TempoAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl TempoAdapter {
    /// Starts at full tempo with no streak accumulated.
    pub fn new() -> Self {
        Self { multiplier: MAX_TEMPO_MULTIPLIER, good_bar_streak: 0 }
    }

    /// Current tempo multiplier.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Externally overrides the multiplier (e.g. from `set_tempo_multiplier`), clamping to
    /// range and resetting the speed-up streak.
    pub fn set_multiplier(&mut self, multiplier: f64) {
        self.multiplier = multiplier.clamp(MIN_TEMPO_MULTIPLIER, MAX_TEMPO_MULTIPLIER);
        self.good_bar_streak = 0;
    }

    /// Evaluates one completed bar's stats, returning the new multiplier if it changed.
    ///
    /// Any bar that does not independently satisfy the speed-up condition resets the
    /// consecutive-good-bar streak to zero, including a bar that merely falls short of the
    /// slow-down threshold without qualifying as "good" either.
    pub fn evaluate_bar(&mut self, stats: &BarStats) -> Option<f64> {
        let previous = self.multiplier;

        if stats.is_bad() {
            self.good_bar_streak = 0;
            self.multiplier = (self.multiplier * SLOW_DOWN_FACTOR).clamp(MIN_TEMPO_MULTIPLIER, MAX_TEMPO_MULTIPLIER);
        } else if stats.is_good() {
            self.good_bar_streak += 1;
            if self.good_bar_streak >= SPEED_UP_STREAK_REQUIRED {
                self.multiplier = (self.multiplier * SPEED_UP_FACTOR).clamp(MIN_TEMPO_MULTIPLIER, MAX_TEMPO_MULTIPLIER);
                self.good_bar_streak = 0;
            }
        } else {
            self.good_bar_streak = 0;
        }

        if (self.multiplier - previous).abs() > f64::EPSILON {
            Some(self.multiplier)
        } else {
            None
        }
    }
}
