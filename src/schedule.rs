//! Trigger timing: time-of-day categories and randomized wake intervals.

use std::time::Duration;

use chrono::{DateTime, Local};
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOfDay {
    Morning,
    Noon,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    /// [5,12) morning, [12,14) noon, [14,18) afternoon, [18,22) evening, else night.
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => Self::Morning,
            12..=13 => Self::Noon,
            14..=17 => Self::Afternoon,
            18..=21 => Self::Evening,
            _ => Self::Night,
        }
    }

    /// What a caring relative would bring up at this time of day.
    pub fn topics(self) -> &'static str {
        match self {
            Self::Morning => "ask whether they slept well, remind them to eat breakfast, mind the weather, not overdo it",
            Self::Noon => "ask whether they have eaten lunch, suggest a short midday rest",
            Self::Afternoon => "ask how study or work is going, remind them to rest their eyes and move around",
            Self::Evening => "ask whether the day was tiring, tell them to rest early and put the phone down",
            Self::Night => "softly tell them to go to sleep, not to work too hard, health comes first",
        }
    }
}

impl std::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Morning => write!(f, "morning"),
            Self::Noon => write!(f, "noon"),
            Self::Afternoon => write!(f, "afternoon"),
            Self::Evening => write!(f, "evening"),
            Self::Night => write!(f, "night"),
        }
    }
}

/// Longest wait between two cycles.
pub const MAX_INTERVAL_HOURS: f64 = 24.0 * 366.0;

/// When the next cycle fires. Only the scheduler mutates it.
#[derive(Debug, Clone)]
pub struct TriggerSchedule {
    next_trigger_time: DateTime<Local>,
    min_hours: f64,
    max_hours: f64,
}

impl TriggerSchedule {
    /// Bounds are assumed validated (`0 < min <= max`).
    pub fn new(min_hours: f64, max_hours: f64, now: DateTime<Local>, rng: &mut impl Rng) -> Self {
        let mut schedule = Self {
            next_trigger_time: now,
            min_hours,
            max_hours,
        };
        schedule.advance(now, rng);
        schedule
    }

    pub fn next_trigger_time(&self) -> DateTime<Local> {
        self.next_trigger_time
    }

    pub fn is_due(&self, now: DateTime<Local>) -> bool {
        now >= self.next_trigger_time
    }

    /// Uniform draw from `[min, max)` hours, as a duration.
    ///
    /// Bounds are clamped to `[0, MAX_INTERVAL_HOURS]`.
    pub fn interval(&self, rng: &mut impl Rng) -> Duration {
        let clamp = |hours: f64| hours.clamp(0.0, MAX_INTERVAL_HOURS) * 3600.0;
        let min_secs = clamp(self.min_hours);
        let max_secs = clamp(self.max_hours);
        if max_secs <= min_secs {
            return Duration::from_secs_f64(min_secs);
        }
        Duration::from_secs_f64(rng.gen_range(min_secs..max_secs))
    }

    /// Set `next_trigger_time = now + interval` and return the interval used.
    pub fn advance(&mut self, now: DateTime<Local>, rng: &mut impl Rng) -> Duration {
        let interval = self.interval(rng);
        let delta = chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::zero());
        self.next_trigger_time = now.checked_add_signed(delta).unwrap_or(now);
        interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn at(hour: u32, minute: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, hour, minute, 0).unwrap()
    }

    #[test]
    fn categories_cover_every_hour() {
        for h in 0..24 {
            let expected = match h {
                5..=11 => TimeOfDay::Morning,
                12 | 13 => TimeOfDay::Noon,
                14..=17 => TimeOfDay::Afternoon,
                18..=21 => TimeOfDay::Evening,
                _ => TimeOfDay::Night,
            };
            assert_eq!(TimeOfDay::from_hour(h), expected, "hour {h}");
        }
    }

    #[test]
    fn category_boundaries() {
        assert_eq!(TimeOfDay::from_hour(4), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(5), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(12), TimeOfDay::Noon);
        assert_eq!(TimeOfDay::from_hour(14), TimeOfDay::Afternoon);
        assert_eq!(TimeOfDay::from_hour(18), TimeOfDay::Evening);
        // 21:59 is still evening, 22:00 is night
        assert_eq!(TimeOfDay::from_hour(21), TimeOfDay::Evening);
        assert_eq!(TimeOfDay::from_hour(22), TimeOfDay::Night);
    }

    #[test]
    fn category_display() {
        assert_eq!(TimeOfDay::Morning.to_string(), "morning");
        assert_eq!(TimeOfDay::Night.to_string(), "night");
    }

    #[test]
    fn interval_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let schedule = TriggerSchedule::new(0.5, 2.0, at(9, 0), &mut rng);
        for _ in 0..1000 {
            let secs = schedule.interval(&mut rng).as_secs_f64();
            assert!((1800.0..7200.0).contains(&secs), "{secs} out of range");
        }
    }

    #[test]
    fn equal_bounds_give_exact_interval() {
        let mut rng = StdRng::seed_from_u64(1);
        let schedule = TriggerSchedule::new(1.5, 1.5, at(9, 0), &mut rng);
        for _ in 0..10 {
            assert_eq!(schedule.interval(&mut rng), Duration::from_secs(5400));
        }
    }

    #[test]
    fn huge_bounds_are_capped() {
        let mut rng = StdRng::seed_from_u64(4);
        let now = at(9, 0);
        let mut schedule = TriggerSchedule::new(1.0, 1e300, now, &mut rng);
        for _ in 0..10 {
            let interval = schedule.advance(now, &mut rng);
            assert!(interval.as_secs_f64() <= MAX_INTERVAL_HOURS * 3600.0);
            assert!(schedule.next_trigger_time() > now);
        }
    }

    #[test]
    fn new_schedule_is_in_the_future() {
        let mut rng = StdRng::seed_from_u64(3);
        let now = at(9, 0);
        let schedule = TriggerSchedule::new(0.01, 0.02, now, &mut rng);
        assert!(schedule.next_trigger_time() > now);
        assert!(!schedule.is_due(now));
        assert!(schedule.is_due(schedule.next_trigger_time()));
    }

    #[test]
    fn advance_counts_from_given_time() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut schedule = TriggerSchedule::new(1.0, 2.0, at(6, 0), &mut rng);
        let now = at(9, 0);
        let interval = schedule.advance(now, &mut rng);
        let offset = (schedule.next_trigger_time() - now).to_std().unwrap();
        assert_eq!(offset.as_secs(), interval.as_secs());
        assert!(offset >= Duration::from_secs(3600));
        assert!(offset < Duration::from_secs(7200));
    }
}
