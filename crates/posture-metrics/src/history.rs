use crate::reading::{PostureReading, PostureRecord};
use chrono::{DateTime, Datelike, Duration, FixedOffset, Offset, TimeZone, Timelike, Utc};
use std::collections::BTreeMap;
use std::ops::Range;

/// Aggregation window size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Hourly,
    Daily,
    /// ISO week, Monday to Sunday.
    Weekly,
}

impl Bucket {
    /// Start of the bucket containing `t`, in `t`'s offset.
    fn floor(self, t: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        let date = t.date_naive();
        let start = match self {
            Bucket::Hourly => date.and_hms_opt(t.hour(), 0, 0)?,
            Bucket::Daily => date.and_hms_opt(0, 0, 0)?,
            Bucket::Weekly => {
                let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
                monday.and_hms_opt(0, 0, 0)?
            }
        };
        t.timezone().from_local_datetime(&start).single()
    }

    fn step(self) -> Duration {
        match self {
            Bucket::Hourly => Duration::hours(1),
            Bucket::Daily => Duration::days(1),
            Bucket::Weekly => Duration::weeks(1),
        }
    }

    /// Chart label: `6AM`, `Mon`, `11/18-11/24`.
    fn label(self, start: DateTime<FixedOffset>) -> String {
        match self {
            Bucket::Hourly => format_hour(start.hour()),
            Bucket::Daily => start.format("%a").to_string(),
            Bucket::Weekly => {
                let end = start + Duration::days(6);
                format!("{}-{}", start.format("%m/%d"), end.format("%m/%d"))
            }
        }
    }
}

/// 12-hour clock label without minutes.
pub fn format_hour(hour: u32) -> String {
    let hour12 = if hour % 12 == 0 { 12 } else { hour % 12 };
    let period = if hour >= 12 { "PM" } else { "AM" };
    format!("{hour12}{period}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Mean scores over one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreAverages {
    pub composite: f64,
    pub spinal_straightness: f64,
    pub hunch: f64,
    pub shoulder_balance: f64,
}

/// One chart point. Empty buckets are kept with `count == 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketAverage {
    pub label: String,
    pub start: DateTime<FixedOffset>,
    pub count: usize,
    pub averages: Option<ScoreAverages>,
}

impl BucketAverage {
    /// Averages with empty buckets reported as zero.
    pub fn or_zero(&self) -> ScoreAverages {
        self.averages.unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    count: usize,
    sums: ScoreAverages,
}

impl Accumulator {
    fn add(&mut self, reading: &PostureReading) {
        self.count += 1;
        self.sums.composite += reading.composite_score;
        self.sums.spinal_straightness += reading.sub_scores.spinal_straightness;
        self.sums.hunch += reading.sub_scores.hunch;
        self.sums.shoulder_balance += reading.sub_scores.shoulder_balance;
    }

    fn mean(&self) -> Option<ScoreAverages> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some(ScoreAverages {
            composite: self.sums.composite / n,
            spinal_straightness: self.sums.spinal_straightness / n,
            hunch: self.sums.hunch / n,
            shoulder_balance: self.sums.shoulder_balance / n,
        })
    }
}

/// Window sizes for the presentation queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationWindows {
    pub hourly_start_hour: u32,
    pub daily_days: u32,
    pub weekly_weeks: u32,
}

impl Default for AggregationWindows {
    fn default() -> Self {
        Self {
            hourly_start_hour: 6,
            daily_days: 7,
            weekly_weeks: 4,
        }
    }
}

/// Unique history key. Equal timestamps are ordered by arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReadingKey {
    pub timestamp: DateTime<Utc>,
    pub seq: u64,
}

/// Append-only collection of posture readings with chart aggregations.
///
/// Readings may arrive in any timestamp order; every query groups by
/// timestamp, never by insertion position.
#[derive(Debug)]
pub struct ReadingsHistory {
    readings: Vec<(ReadingKey, PostureReading)>,
    next_seq: u64,
    offset: FixedOffset,
    windows: AggregationWindows,
}

impl Default for ReadingsHistory {
    fn default() -> Self {
        Self::new(Utc.fix(), AggregationWindows::default())
    }
}

impl ReadingsHistory {
    /// `offset` is the wearer's local time zone, used for bucket boundaries.
    pub fn new(offset: FixedOffset, windows: AggregationWindows) -> Self {
        Self {
            readings: Vec::new(),
            next_seq: 0,
            offset,
            windows,
        }
    }

    pub fn append(&mut self, reading: PostureReading) -> ReadingKey {
        let key = ReadingKey {
            timestamp: reading.timestamp,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.readings.push((key, reading));
        key
    }

    /// Repopulate from persisted records. Returns how many were accepted.
    pub fn restore(&mut self, records: impl IntoIterator<Item = PostureRecord>) -> usize {
        let mut accepted = 0;
        for record in records {
            let reading = PostureReading::from(record);
            if !reading.is_valid() {
                tracing::warn!(timestamp = %reading.timestamp, "Skipping out-of-range stored reading");
                continue;
            }
            self.append(reading);
            accepted += 1;
        }
        accepted
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Readings in timestamp order.
    pub fn chronological(&self) -> Vec<(ReadingKey, &PostureReading)> {
        let mut sorted: Vec<_> = self.readings.iter().map(|(k, r)| (*k, r)).collect();
        sorted.sort_by_key(|(k, _)| *k);
        sorted
    }

    /// Most recent reading by timestamp.
    pub fn latest(&self) -> Option<&PostureReading> {
        self.readings
            .iter()
            .max_by_key(|(k, _)| *k)
            .map(|(_, r)| r)
    }

    /// Average readings per bucket over `range`.
    ///
    /// Enumerates every bucket from the one containing `range.start` up to
    /// `range.end`; only readings inside `range` are counted.
    pub fn aggregate(
        &self,
        bucket: Bucket,
        range: Range<DateTime<Utc>>,
        order: SortOrder,
    ) -> Vec<BucketAverage> {
        let mut groups: BTreeMap<DateTime<FixedOffset>, Accumulator> = BTreeMap::new();
        for (key, reading) in &self.readings {
            if !range.contains(&key.timestamp) {
                continue;
            }
            if let Some(start) = bucket.floor(key.timestamp.with_timezone(&self.offset)) {
                groups.entry(start).or_default().add(reading);
            }
        }

        let mut points = Vec::new();
        let end = range.end.with_timezone(&self.offset);
        let Some(mut start) = bucket.floor(range.start.with_timezone(&self.offset)) else {
            return points;
        };
        while start < end {
            let group = groups.get(&start);
            points.push(BucketAverage {
                label: bucket.label(start),
                start,
                count: group.map_or(0, |g| g.count),
                averages: group.and_then(Accumulator::mean),
            });
            start += bucket.step();
        }

        if order == SortOrder::Descending {
            points.reverse();
        }
        points
    }

    /// Today's hours from the configured start hour through 11PM.
    pub fn hourly_averages(&self, now: DateTime<Utc>) -> Vec<BucketAverage> {
        let Some(today) = Bucket::Daily.floor(now.with_timezone(&self.offset)) else {
            return Vec::new();
        };
        let first_hour = i64::from(self.windows.hourly_start_hour.min(23));
        let start = today + Duration::hours(first_hour);
        let end = today + Duration::days(1);
        self.aggregate(
            Bucket::Hourly,
            start.with_timezone(&Utc)..end.with_timezone(&Utc),
            SortOrder::Ascending,
        )
    }

    /// The last `daily_days` calendar days, ending today, labeled by weekday.
    pub fn daily_averages(&self, now: DateTime<Utc>) -> Vec<BucketAverage> {
        let Some(today) = Bucket::Daily.floor(now.with_timezone(&self.offset)) else {
            return Vec::new();
        };
        let days = i64::from(self.windows.daily_days.max(1));
        let start = today - Duration::days(days - 1);
        let end = today + Duration::days(1);
        self.aggregate(
            Bucket::Daily,
            start.with_timezone(&Utc)..end.with_timezone(&Utc),
            SortOrder::Ascending,
        )
    }

    /// The last `weekly_weeks` ISO weeks, ending with the current one, labeled by date range.
    pub fn weekly_averages(&self, now: DateTime<Utc>) -> Vec<BucketAverage> {
        let Some(this_week) = Bucket::Weekly.floor(now.with_timezone(&self.offset)) else {
            return Vec::new();
        };
        let weeks = i64::from(self.windows.weekly_weeks.max(1));
        let start = this_week - Duration::weeks(weeks - 1);
        let end = this_week + Duration::weeks(1);
        self.aggregate(
            Bucket::Weekly,
            start.with_timezone(&Utc)..end.with_timezone(&Utc),
            SortOrder::Ascending,
        )
    }
}
