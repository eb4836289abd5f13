/// The fixed set of purchasable subscription lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanDuration {
    OneMonth,
    ThreeMonths,
    SixMonths,
    TwelveMonths,
}

impl PlanDuration {
    pub const ALL: [PlanDuration; 4] = [
        PlanDuration::OneMonth,
        PlanDuration::ThreeMonths,
        PlanDuration::SixMonths,
        PlanDuration::TwelveMonths,
    ];

    /// Unknown month counts fall back to the one-month plan rather than
    /// failing; pricing and reconciliation both rely on this.
    pub fn from_months(months: i64) -> Self {
        match months {
            3 => PlanDuration::ThreeMonths,
            6 => PlanDuration::SixMonths,
            12 => PlanDuration::TwelveMonths,
            _ => PlanDuration::OneMonth,
        }
    }

    pub fn months(self) -> i64 {
        match self {
            PlanDuration::OneMonth => 1,
            PlanDuration::ThreeMonths => 3,
            PlanDuration::SixMonths => 6,
            PlanDuration::TwelveMonths => 12,
        }
    }

    /// Billing months are a flat 30 days.
    pub fn days(self) -> i64 {
        self.months() * 30
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_months_fall_back_to_one_month() {
        assert_eq!(PlanDuration::from_months(2), PlanDuration::OneMonth);
        assert_eq!(PlanDuration::from_months(0), PlanDuration::OneMonth);
        assert_eq!(PlanDuration::from_months(12), PlanDuration::TwelveMonths);
    }

    #[test]
    fn days_are_thirty_per_month() {
        assert_eq!(PlanDuration::ThreeMonths.days(), 90);
        assert_eq!(PlanDuration::TwelveMonths.days(), 360);
    }
}
