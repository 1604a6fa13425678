//! Ordered, non-overlapping interval maps over genomic coordinates.

use arg_core::{ArgError, Coord, ErrorInfo};
use serde::{Deserialize, Serialize};

/// Value attached to the half-open interval `[start, end)` of a chromosome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionValue<T> {
    /// Chromosome name.
    pub chrom: String,
    /// First covered coordinate.
    pub start: Coord,
    /// First coordinate past the interval.
    pub end: Coord,
    /// Attached value.
    pub value: T,
}

impl<T> RegionValue<T> {
    /// Number of coordinates covered.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the interval covers nothing.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Interval map sorted by start coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Track<T> {
    regions: Vec<RegionValue<T>>,
}

/// Track without values; used for masks.
pub type NullTrack = Track<()>;

impl<T> Default for Track<T> {
    fn default() -> Self {
        Self {
            regions: Vec::new(),
        }
    }
}

impl<T> Track<T> {
    /// Creates an empty track.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of intervals.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether the track holds no intervals.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Intervals in coordinate order.
    pub fn regions(&self) -> &[RegionValue<T>] {
        &self.regions
    }

    /// Iterates over the intervals in coordinate order.
    pub fn iter(&self) -> std::slice::Iter<'_, RegionValue<T>> {
        self.regions.iter()
    }

    /// Appends an interval; intervals must arrive in increasing start order.
    pub fn append(
        &mut self,
        chrom: impl Into<String>,
        start: Coord,
        end: Coord,
        value: T,
    ) -> Result<(), ArgError> {
        if start >= end {
            return Err(ArgError::Config(
                ErrorInfo::new("track-empty-interval", "track intervals must be non-empty")
                    .with_context("start", start.to_string())
                    .with_context("end", end.to_string()),
            ));
        }
        if let Some(last) = self.regions.last() {
            if start < last.start {
                return Err(ArgError::Config(
                    ErrorInfo::new("track-unsorted", "track intervals must be sorted by start")
                        .with_context("start", start.to_string())
                        .with_context("previous", last.start.to_string()),
                ));
            }
        }
        self.regions.push(RegionValue {
            chrom: chrom.into(),
            start,
            end,
            value,
        });
        Ok(())
    }

    /// Index of the interval containing `pos`.
    pub fn index_of(&self, pos: Coord) -> Option<usize> {
        let idx = self.regions.partition_point(|r| r.end <= pos);
        (idx < self.regions.len() && self.regions[idx].start <= pos).then_some(idx)
    }

    /// Value at `pos`, if covered.
    pub fn value_at(&self, pos: Coord) -> Option<&T> {
        self.index_of(pos).map(|idx| &self.regions[idx].value)
    }

    /// Fails unless the intervals tile `[start, end)` without gaps or overlaps.
    pub fn check_complete(&self, start: Coord, end: Coord) -> Result<(), ArgError> {
        let mut cursor = start;
        for region in &self.regions {
            if region.end <= start || region.start >= end {
                continue;
            }
            if region.start != cursor && !(cursor == start && region.start < start) {
                return Err(ArgError::Config(
                    ErrorInfo::new("track-incomplete", "track has a gap or overlap")
                        .with_context("expected", cursor.to_string())
                        .with_context("found", region.start.to_string()),
                ));
            }
            cursor = region.end;
        }
        if cursor < end {
            return Err(ArgError::Config(
                ErrorInfo::new("track-incomplete", "track does not reach the end of the region")
                    .with_context("covered_to", cursor.to_string())
                    .with_context("end", end.to_string()),
            ));
        }
        Ok(())
    }
}

impl<T: Clone> Track<T> {
    /// Fills every gap in `[start, end)` with `default`; overlaps are errors.
    pub fn complete(
        &mut self,
        chrom: &str,
        start: Coord,
        end: Coord,
        default: T,
    ) -> Result<(), ArgError> {
        let mut filled = Vec::with_capacity(self.regions.len() * 2 + 1);
        let mut cursor = start;
        let mut prev_end: Option<Coord> = None;
        for region in std::mem::take(&mut self.regions) {
            if let Some(prev) = prev_end {
                if region.start < prev {
                    return Err(ArgError::Config(
                        ErrorInfo::new("track-overlap", "track intervals overlap")
                            .with_context("start", region.start.to_string())
                            .with_context("previous_end", prev.to_string()),
                    ));
                }
            }
            let gap_end = region.start.min(end);
            if gap_end > cursor {
                filled.push(RegionValue {
                    chrom: chrom.to_string(),
                    start: cursor,
                    end: gap_end,
                    value: default.clone(),
                });
            }
            cursor = cursor.max(region.end);
            prev_end = Some(region.end);
            filled.push(region);
        }
        if cursor < end {
            filled.push(RegionValue {
                chrom: chrom.to_string(),
                start: cursor,
                end,
                value: default,
            });
        }
        self.regions = filled;
        Ok(())
    }

    /// Restricts the track to `[start, end)`, trimming boundary intervals.
    pub fn clip(&mut self, start: Coord, end: Coord) {
        self.regions.retain(|r| r.end > start && r.start < end);
        for region in &mut self.regions {
            region.start = region.start.max(start);
            region.end = region.end.min(end);
        }
    }

    /// Splits both tracks at the union of their breakpoints.
    ///
    /// Both tracks must tile `[start, end)`; the results share every interval
    /// boundary.
    pub fn harmonize<U: Clone>(
        &self,
        other: &Track<U>,
        start: Coord,
        end: Coord,
    ) -> Result<(Track<T>, Track<U>), ArgError> {
        let mut left = self.clone();
        let mut right = other.clone();
        left.clip(start, end);
        right.clip(start, end);
        left.check_complete(start, end)?;
        right.check_complete(start, end)?;

        let mut out_left = Track::new();
        let mut out_right = Track::new();
        let (mut i, mut j) = (0, 0);
        let mut cursor = start;
        while i < left.regions.len() && j < right.regions.len() {
            let a = &left.regions[i];
            let b = &right.regions[j];
            let stop = a.end.min(b.end);
            out_left.regions.push(RegionValue {
                chrom: a.chrom.clone(),
                start: cursor,
                end: stop,
                value: a.value.clone(),
            });
            out_right.regions.push(RegionValue {
                chrom: b.chrom.clone(),
                start: cursor,
                end: stop,
                value: b.value.clone(),
            });
            cursor = stop;
            if a.end == stop {
                i += 1;
            }
            if b.end == stop {
                j += 1;
            }
        }
        Ok((out_left, out_right))
    }
}

impl<T: PartialEq> Track<T> {
    /// Joins touching or overlapping intervals that carry equal values.
    pub fn merge(&mut self) {
        let mut merged: Vec<RegionValue<T>> = Vec::with_capacity(self.regions.len());
        for region in self.regions.drain(..) {
            match merged.last_mut() {
                Some(last)
                    if last.chrom == region.chrom
                        && last.value == region.value
                        && region.start <= last.end =>
                {
                    last.end = last.end.max(region.end);
                }
                _ => merged.push(region),
            }
        }
        self.regions = merged;
    }
}

impl Track<f64> {
    /// Sum of the per-coordinate values over `[lo, hi)`; uncovered coordinates
    /// contribute `default`.
    pub fn sum_over(&self, lo: Coord, hi: Coord, default: f64) -> f64 {
        if hi <= lo {
            return 0.0;
        }
        let mut total = 0.0;
        let mut cursor = lo;
        let first = self.regions.partition_point(|r| r.end <= lo);
        for region in &self.regions[first..] {
            if region.start >= hi {
                break;
            }
            if region.start > cursor {
                total += default * (region.start - cursor) as f64;
            }
            let a = region.start.max(cursor);
            let b = region.end.min(hi);
            if b > a {
                total += region.value * (b - a) as f64;
                cursor = b;
            }
        }
        if cursor < hi {
            total += default * (hi - cursor) as f64;
        }
        total
    }

    /// Multiplies every value by `factor`.
    pub fn scale(&mut self, factor: f64) {
        for region in &mut self.regions {
            region.value *= factor;
        }
    }
}
