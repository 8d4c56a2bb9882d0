//! Age distribution tables as printed by qshape(1) and surge scoring on top of them.
//!
//! qshape prints a header line followed by a total row. After the row label, the total row
//! contains one mail count per age bucket, newest first. If the header starts with a `T`
//! column, the first count is the row sum and is skipped. All further lines break the
//! distribution down by domain and are not looked at here.

use crate::error::ParseError;
use crate::report::Status;

/// Mail counts per age bucket. Index 0 is the newest bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buckets(Vec<u64>);

impl Buckets {
    /// Extracts exactly `expected` bucket counts from the total row.
    pub fn parse(out: &str, expected: usize) -> Result<Self, ParseError> {
        let mut lines = out.lines();
        let sum_column = match lines.next() {
            Some(header) => header.split_whitespace().next() == Some("T"),
            None => false,
        };
        let total = lines.next().ok_or(ParseError::MissingTotal)?;
        let skip = if sum_column { 2 } else { 1 };
        let tokens: Vec<&str> = total.split_whitespace().skip(skip).collect();
        if tokens.len() != expected {
            return Err(ParseError::TokenCount {
                expected,
                found: tokens.len(),
            });
        }
        let counts = tokens
            .into_iter()
            .map(|t| t.parse().map_err(|_| ParseError::BadCount(t.to_owned())))
            .collect::<Result<Vec<u64>, _>>()?;
        Ok(Self(counts))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Total number of mails in the queue
    pub fn mails(&self) -> u64 {
        self.0.iter().sum()
    }

    pub fn newest(&self) -> u64 {
        self.0.first().copied().unwrap_or_default()
    }

    pub fn oldest(&self) -> u64 {
        self.0.last().copied().unwrap_or_default()
    }

    /// All buckets except the newest and the oldest one
    pub fn interior(&self) -> &[u64] {
        match self.0.len() {
            0..=2 => &[],
            n => &self.0[1..n - 1],
        }
    }
}

impl From<Vec<u64>> for Buckets {
    fn from(counts: Vec<u64>) -> Self {
        Self(counts)
    }
}

/// Surge limits in mails per bucket. A limit of 0 is disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Thresholds {
    pub warn: u64,
    pub crit: u64,
}

impl Thresholds {
    /// Critical takes precedence: a value above both limits is critical only.
    pub fn classify(&self, v: u64) -> Status {
        match v {
            _ if self.crit > 0 && v > self.crit => Status::Crit,
            _ if self.warn > 0 && v > self.warn => Status::Warn,
            _ => Status::Ok,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Surges {
    pub warn: usize,
    pub crit: usize,
}

impl Surges {
    /// Scores interior buckets. With `last_bucket` the oldest bucket contributes too, but only
    /// with its count divided by the number of buckets.
    pub fn score(buckets: &Buckets, thres: Thresholds, last_bucket: bool) -> Self {
        let mut s = Self::default();
        for &v in buckets.interior() {
            s.record(thres.classify(v));
        }
        if last_bucket && buckets.len() > 1 {
            s.record(thres.classify(buckets.oldest() / buckets.len() as u64));
        }
        s
    }

    fn record(&mut self, status: Status) {
        match status {
            Status::Crit => self.crit += 1,
            Status::Warn => self.warn += 1,
            _ => (),
        }
    }

    pub fn total(&self) -> usize {
        self.warn + self.crit
    }
}
