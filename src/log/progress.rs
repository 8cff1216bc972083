use serde::Serialize;

/// Where consumption sits relative to a goal.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressLevel {
    OnTrack,
    Approaching,
    NearLimit,
    Over,
}

impl ProgressLevel {
    /// `ratio` is consumed / goal, unrounded, so the level never runs ahead
    /// of `over_by` and `remaining`.
    fn from_ratio(ratio: f64) -> Self {
        match ratio {
            r if r >= 1.0 => ProgressLevel::Over,
            r if r >= 0.9 => ProgressLevel::NearLimit,
            r if r >= 0.75 => ProgressLevel::Approaching,
            _ => ProgressLevel::OnTrack,
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            ProgressLevel::OnTrack => "green",
            ProgressLevel::Approaching => "yellow",
            ProgressLevel::NearLimit | ProgressLevel::Over => "red",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Progress {
    pub consumed: f64,
    pub goal: u32,
    pub remaining: f64,
    pub over_by: f64,
    /// Uncapped share of the goal, rounded.
    pub percent: u32,
    /// `percent` capped at 100 for bar rendering.
    pub bar_percent: u32,
    pub level: ProgressLevel,
    pub color: &'static str,
}

impl Progress {
    pub fn compute(consumed: f64, goal: u32) -> Self {
        let consumed = consumed.max(0.0);
        let goal_f = f64::from(goal);
        let ratio = if goal == 0 {
            if consumed > 0.0 { 1.0 } else { 0.0 }
        } else {
            consumed / goal_f
        };
        let percent = (ratio * 100.0).round() as u32;
        let level = ProgressLevel::from_ratio(ratio);
        Self {
            consumed,
            goal,
            remaining: (goal_f - consumed).max(0.0),
            over_by: (consumed - goal_f).max(0.0),
            percent,
            bar_percent: percent.min(100),
            level,
            color: level.color(),
        }
    }

    pub fn exceeded(&self) -> bool {
        self.level == ProgressLevel::Over
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn over_goal_reports_excess() {
        let p = Progress::compute(2100.0, 2000);
        assert_eq!(p.over_by, 100.0);
        assert_eq!(p.remaining, 0.0);
        assert_eq!(p.percent, 105);
        assert_eq!(p.bar_percent, 100);
        assert_eq!(p.level, ProgressLevel::Over);
        assert_eq!(p.color, "red");
        assert!(p.exceeded());
    }

    #[test]
    fn exactly_at_goal_is_over() {
        let p = Progress::compute(2000.0, 2000);
        assert_eq!(p.over_by, 0.0);
        assert_eq!(p.level, ProgressLevel::Over);
    }

    #[test]
    fn just_under_goal_is_not_over() {
        let p = Progress::compute(1990.0, 2000);
        assert_eq!(p.percent, 100);
        assert_eq!(p.remaining, 10.0);
        assert_eq!(p.over_by, 0.0);
        assert_eq!(p.level, ProgressLevel::NearLimit);
        assert!(!p.exceeded());

        let p = Progress::compute(1495.0, 2000);
        assert_eq!(p.percent, 75);
        assert_eq!(p.level, ProgressLevel::OnTrack);
    }

    #[test]
    fn thresholds() {
        assert_eq!(Progress::compute(1000.0, 2000).level, ProgressLevel::OnTrack);
        assert_eq!(Progress::compute(1500.0, 2000).level, ProgressLevel::Approaching);
        assert_eq!(Progress::compute(1500.0, 2000).color, "yellow");
        assert_eq!(Progress::compute(1800.0, 2000).level, ProgressLevel::NearLimit);
        assert_eq!(Progress::compute(1800.0, 2000).remaining, 200.0);
    }

    #[test]
    fn zero_goal_does_not_divide() {
        assert_eq!(Progress::compute(0.0, 0).percent, 0);
        assert!(Progress::compute(10.0, 0).exceeded());
    }
}
