//! Clock and scheduler calendar.
//!
//! Pure functions of an injected "now": which persona is on air, whether an
//! announcement/weather/show window is open, and when the next announcement
//! boundary falls. Nothing here can fail at runtime; bad schedules are
//! rejected when the configuration loads.

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};

use crate::model::{PersonaId, WeatherWindow};

/// One shift: a persona takes the air at `start` and holds it until the next
/// shift's start. Boundaries are half-open `[start, next_start)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shift {
    pub start: NaiveTime,
    pub persona: PersonaId,
}

/// Ordered, non-overlapping set of shifts covering 24 hours.
///
/// The shift before the first start of the day wraps around from the
/// previous day's last shift, so any non-empty schedule covers the clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftSchedule {
    shifts: Vec<Shift>,
}

impl ShiftSchedule {
    /// Build a schedule, enforcing ordering and uniqueness of boundaries.
    pub fn new(mut shifts: Vec<Shift>) -> Result<Self, ScheduleError> {
        if shifts.is_empty() {
            return Err(ScheduleError::Empty);
        }
        shifts.sort_by_key(|s| s.start);
        for pair in shifts.windows(2) {
            if pair[0].start == pair[1].start {
                return Err(ScheduleError::Overlap(pair[0].start));
            }
        }
        Ok(Self { shifts })
    }

    /// The persona on air at `t` (time of day).
    pub fn persona_at(&self, t: NaiveTime) -> PersonaId {
        // The last shift whose start is <= t; before the first boundary the
        // previous day's final shift is still on air.
        self.shifts
            .iter()
            .rev()
            .find(|s| s.start <= t)
            .unwrap_or_else(|| self.shifts.last().expect("schedule is non-empty"))
            .persona
    }

    /// Every persona transition as (boundary, outgoing, incoming).
    /// Boundaries where the same persona continues are not transitions.
    pub fn transitions(&self) -> Vec<(NaiveTime, PersonaId, PersonaId)> {
        let mut out = Vec::new();
        let n = self.shifts.len();
        for i in 0..n {
            let incoming = self.shifts[i];
            let outgoing = self.shifts[(i + n - 1) % n];
            if outgoing.persona != incoming.persona {
                out.push((incoming.start, outgoing.persona, incoming.persona));
            }
        }
        out
    }

    pub fn shifts(&self) -> &[Shift] {
        &self.shifts
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("shift schedule is empty")]
    Empty,

    #[error("two shifts share the start time {0}")]
    Overlap(NaiveTime),
}

/// The station's time logic, bundled with its configured windows.
#[derive(Debug, Clone)]
pub struct Calendar {
    schedule: ShiftSchedule,
    /// Seconds of tolerance when catching a :00/:30 boundary
    announcement_window_secs: u32,
    weather_hours: [(WeatherWindow, u32); 3],
    /// (show id, hour) pairs
    show_hours: Vec<(String, u32)>,
}

impl Calendar {
    pub fn new(
        schedule: ShiftSchedule,
        announcement_window_secs: u32,
        weather_hours: [(WeatherWindow, u32); 3],
        show_hours: Vec<(String, u32)>,
    ) -> Self {
        Self { schedule, announcement_window_secs, weather_hours, show_hours }
    }

    pub fn schedule(&self) -> &ShiftSchedule {
        &self.schedule
    }

    /// Which persona is on air at `t`.
    pub fn persona_on_air_at(&self, t: NaiveDateTime) -> PersonaId {
        self.schedule.persona_at(t.time())
    }

    /// True within the configured tolerance after a :00/:30 boundary.
    pub fn is_announcement_moment(&self, t: NaiveDateTime) -> bool {
        is_announcement_moment(t, self.announcement_window_secs)
    }

    /// The :00/:30 slot `t` falls in, as an `HH-MM` content target id.
    pub fn announcement_slot_id(t: NaiveDateTime) -> String {
        let minute = if t.minute() < 30 { 0 } else { 30 };
        format!("{:02}-{:02}", t.hour(), minute)
    }

    /// The weather window open at `t`, if any.
    pub fn weather_window_at(&self, t: NaiveDateTime) -> Option<WeatherWindow> {
        if t.minute() != 0 {
            return None;
        }
        self.weather_hours
            .iter()
            .find(|(_, hour)| *hour == t.hour())
            .map(|(window, _)| *window)
    }

    /// The show eligible at `t`, if any. Played-today idempotency is the
    /// caller's responsibility.
    pub fn show_window_at(&self, t: NaiveDateTime) -> Option<&str> {
        self.show_hours
            .iter()
            .find(|(_, hour)| *hour == t.hour())
            .map(|(id, _)| id.as_str())
    }
}

/// True when `t` is within `window` seconds after a :00 or :30 boundary.
pub fn is_announcement_moment(t: NaiveDateTime, window: u32) -> bool {
    (t.minute() == 0 || t.minute() == 30) && t.second() <= window
}

/// The next :00 or :30 boundary strictly after `t`.
pub fn next_announcement_after(t: NaiveDateTime) -> NaiveDateTime {
    let base = t
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .expect("zero second is always valid");
    if t.minute() < 30 {
        base.with_minute(30).expect("minute 30 is always valid")
    } else {
        base.with_minute(0).expect("minute 0 is always valid") + Duration::hours(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap().and_hms_opt(h, m, s).unwrap()
    }

    fn two_shift_schedule() -> ShiftSchedule {
        ShiftSchedule::new(vec![
            Shift { start: NaiveTime::from_hms_opt(6, 0, 0).unwrap(), persona: PersonaId::A },
            Shift { start: NaiveTime::from_hms_opt(18, 0, 0).unwrap(), persona: PersonaId::B },
        ])
        .unwrap()
    }

    #[test]
    fn test_persona_at_boundary_is_incoming() {
        let s = two_shift_schedule();
        assert_eq!(s.persona_at(NaiveTime::from_hms_opt(17, 59, 59).unwrap()), PersonaId::A);
        // Half-open boundary: the incoming persona owns the boundary instant
        assert_eq!(s.persona_at(NaiveTime::from_hms_opt(18, 0, 0).unwrap()), PersonaId::B);
    }

    #[test]
    fn test_persona_wraps_past_midnight() {
        let s = two_shift_schedule();
        // Before the first boundary of the day, yesterday's evening shift holds
        assert_eq!(s.persona_at(NaiveTime::from_hms_opt(2, 0, 0).unwrap()), PersonaId::B);
    }

    #[test]
    fn test_transitions_listed_once_per_boundary() {
        let s = two_shift_schedule();
        let transitions = s.transitions();
        assert_eq!(transitions.len(), 2);
        assert_eq!(
            transitions[0],
            (NaiveTime::from_hms_opt(6, 0, 0).unwrap(), PersonaId::B, PersonaId::A)
        );
        assert_eq!(
            transitions[1],
            (NaiveTime::from_hms_opt(18, 0, 0).unwrap(), PersonaId::A, PersonaId::B)
        );
    }

    #[test]
    fn test_same_persona_boundary_is_not_a_transition() {
        let s = ShiftSchedule::new(vec![
            Shift { start: NaiveTime::from_hms_opt(0, 0, 0).unwrap(), persona: PersonaId::A },
            Shift { start: NaiveTime::from_hms_opt(12, 0, 0).unwrap(), persona: PersonaId::A },
        ])
        .unwrap();
        assert!(s.transitions().is_empty());
    }

    #[test]
    fn test_empty_and_overlapping_schedules_rejected() {
        assert!(matches!(ShiftSchedule::new(vec![]), Err(ScheduleError::Empty)));
        let dup = vec![
            Shift { start: NaiveTime::from_hms_opt(6, 0, 0).unwrap(), persona: PersonaId::A },
            Shift { start: NaiveTime::from_hms_opt(6, 0, 0).unwrap(), persona: PersonaId::B },
        ];
        assert!(matches!(ShiftSchedule::new(dup), Err(ScheduleError::Overlap(_))));
    }

    #[test]
    fn test_announcement_moment_window() {
        assert!(is_announcement_moment(t(9, 0, 0), 2));
        assert!(is_announcement_moment(t(9, 30, 0), 2));
        assert!(is_announcement_moment(t(9, 0, 2), 2));
        assert!(!is_announcement_moment(t(9, 0, 3), 2));
        assert!(!is_announcement_moment(t(9, 15, 0), 2));
    }

    #[test]
    fn test_next_announcement_boundaries() {
        assert_eq!(next_announcement_after(t(9, 29, 59)), t(9, 30, 0));
        assert_eq!(next_announcement_after(t(9, 31, 0)), t(10, 0, 0));
        assert_eq!(next_announcement_after(t(9, 0, 0)), t(9, 30, 0));
        assert_eq!(next_announcement_after(t(9, 30, 0)), t(10, 0, 0));
    }

    #[test]
    fn test_next_announcement_hour_rollover() {
        let next = next_announcement_after(t(23, 45, 12));
        assert_eq!(next.time(), NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        assert_eq!(next.date(), NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
    }

    #[test]
    fn test_announcement_slot_id() {
        assert_eq!(Calendar::announcement_slot_id(t(14, 0, 1)), "14-00");
        assert_eq!(Calendar::announcement_slot_id(t(14, 30, 2)), "14-30");
        assert_eq!(Calendar::announcement_slot_id(t(14, 29, 0)), "14-00");
    }

    fn calendar() -> Calendar {
        Calendar::new(
            two_shift_schedule(),
            2,
            [
                (WeatherWindow::Morning, 7),
                (WeatherWindow::Midday, 12),
                (WeatherWindow::Evening, 18),
            ],
            vec![("night-flight".to_string(), 22)],
        )
    }

    #[test]
    fn test_weather_window_requires_minute_zero() {
        let c = calendar();
        assert_eq!(c.weather_window_at(t(7, 0, 30)), Some(WeatherWindow::Morning));
        assert_eq!(c.weather_window_at(t(7, 1, 0)), None);
        assert_eq!(c.weather_window_at(t(12, 0, 0)), Some(WeatherWindow::Midday));
        assert_eq!(c.weather_window_at(t(9, 0, 0)), None);
    }

    #[test]
    fn test_show_window_matches_hour() {
        let c = calendar();
        assert_eq!(c.show_window_at(t(22, 41, 0)), Some("night-flight"));
        assert_eq!(c.show_window_at(t(21, 59, 59)), None);
    }
}
