use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::error::CaseIdError;

/// `{date}:{sequence}` as synthesized by the case extractor.
///
/// Orders by date, then by sequence number. Sequence numbers come from the
/// bulletin text, so two pages can produce the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CaseId {
    pub date: NaiveDate,
    pub seq: u64,
}

impl FromStr for CaseId {
    type Err = CaseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (date, seq) = s
            .split_once(':')
            .ok_or_else(|| CaseIdError::MissingSeparator(s.to_string()))?;
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| CaseIdError::BadDate(s.to_string()))?;
        let seq = seq
            .parse()
            .map_err(|_| CaseIdError::BadSequence(s.to_string()))?;
        Ok(Self { date, seq })
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.date, self.seq)
    }
}
