use std::ops::Range;

/// An ordered set of disjoint half-open `u32` ranges. Adjacent and
/// overlapping ranges are merged on insertion.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RangeSet {
    // Sorted by start; no two entries touch.
    ranges: Vec<Range<u32>>,
}

impl RangeSet {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total number of values in the set.
    pub fn len(&self) -> u32 {
        self.ranges.iter().map(|r| r.end - r.start).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Range<u32>> {
        self.ranges.iter()
    }

    pub fn contains(&self, value: u32) -> bool {
        self.ranges.iter().any(|r| r.contains(&value))
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    pub fn add(&mut self, range: Range<u32>) {
        if range.start >= range.end { return; }

        let mut start = range.start;
        let mut end = range.end;
        // First range that could touch the new one.
        let lo = self.ranges.iter().position(|r| r.end >= start)
            .unwrap_or_else(|| self.ranges.len());
        let mut hi = lo;
        while hi < self.ranges.len() && self.ranges[hi].start <= end {
            start = start.min(self.ranges[hi].start);
            end = end.max(self.ranges[hi].end);
            hi += 1;
        }
        self.ranges.splice(lo..hi, std::iter::once(start..end));
    }

    pub fn remove(&mut self, range: Range<u32>) {
        if range.start >= range.end { return; }

        let mut out = Vec::with_capacity(self.ranges.len() + 1);
        for r in self.ranges.drain(..) {
            if r.end <= range.start || r.start >= range.end {
                out.push(r);
                continue;
            }
            if r.start < range.start {
                out.push(r.start..range.start);
            }
            if r.end > range.end {
                out.push(range.end..r.end);
            }
        }
        self.ranges = out;
    }

    /// Removes and returns the lowest range of exactly `len` values that
    /// fits inside one of the stored ranges.
    pub fn take_first_fit(&mut self, len: u32) -> Option<Range<u32>> {
        if len == 0 { return None; }
        let idx = self.ranges.iter().position(|r| r.end - r.start >= len)?;
        let start = self.ranges[idx].start;
        let taken = start..start + len;
        if self.ranges[idx].end == taken.end {
            self.ranges.remove(idx);
        } else {
            self.ranges[idx].start = taken.end;
        }
        Some(taken)
    }
}

impl From<Range<u32>> for RangeSet {
    fn from(range: Range<u32>) -> Self {
        let mut set = Self::new();
        set.add(range);
        set
    }
}
