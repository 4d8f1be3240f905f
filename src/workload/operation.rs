use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    Ingestion,
    PrecisePoint,
    TimeRange,
    TimeRangeValueFilter,
    AggTime,
    AggValue,
    AggTimeValue,
    GroupBy,
    LastPoint,
    TimeRangeDesc,
    TimeRangeValueDesc,
}

impl OperationKind {
    pub const COUNT: usize = 11;

    /// Order used by `operation_proportion`.
    pub const ALL: [OperationKind; Self::COUNT] = [
        OperationKind::Ingestion,
        OperationKind::PrecisePoint,
        OperationKind::TimeRange,
        OperationKind::TimeRangeValueFilter,
        OperationKind::AggTime,
        OperationKind::AggValue,
        OperationKind::AggTimeValue,
        OperationKind::GroupBy,
        OperationKind::LastPoint,
        OperationKind::TimeRangeDesc,
        OperationKind::TimeRangeValueDesc,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_query(self) -> bool {
        self != Self::Ingestion
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ingestion => "INGESTION",
            Self::PrecisePoint => "PRECISE_POINT",
            Self::TimeRange => "TIME_RANGE",
            Self::TimeRangeValueFilter => "TIME_RANGE_VALUE_FILTER",
            Self::AggTime => "AGG_TIME",
            Self::AggValue => "AGG_VALUE",
            Self::AggTimeValue => "AGG_TIME_VALUE",
            Self::GroupBy => "GROUP_BY",
            Self::LastPoint => "LAST_POINT",
            Self::TimeRangeDesc => "TIME_RANGE_DESC",
            Self::TimeRangeValueDesc => "TIME_RANGE_VALUE_DESC",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_declaration_order() {
        for (position, kind) in OperationKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), position);
        }
        assert!(!OperationKind::Ingestion.is_query());
        assert!(OperationKind::GroupBy.is_query());
    }
}
