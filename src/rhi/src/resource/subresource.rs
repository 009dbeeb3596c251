use derivative::Derivative;

use crate::*;

/// Addresses one sub-resource: a mip level of an array layer of a
/// depth slice.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct SubResourceIndex {
    pub depth_slice: u32,
    pub array_index: u32,
    pub mip_level: u32,
}

impl SubResourceIndex {
    pub fn new(depth_slice: u32, array_index: u32, mip_level: u32) -> Self {
        Self { depth_slice, array_index, mip_level }
    }

    pub fn mip(mip_level: u32) -> Self {
        Self { mip_level, ..Default::default() }
    }
}

#[derive(Clone, Copy, Debug, Derivative, Eq, Hash, PartialEq)]
#[derivative(Default)]
pub struct SubResourceCount {
    #[derivative(Default(value = "1"))]
    pub depth: u32,
    #[derivative(Default(value = "1"))]
    pub array_size: u32,
    #[derivative(Default(value = "1"))]
    pub mip_levels: u32,
}

impl SubResourceCount {
    pub fn new(depth: u32, array_size: u32, mip_levels: u32) -> Self {
        Self { depth, array_size, mip_levels }
    }

    pub fn total(&self) -> u32 {
        self.depth * self.array_size * self.mip_levels
    }

    /// Flattens `index` into `0..self.total()`.
    pub fn raw_index(&self, index: SubResourceIndex) -> DeviceResult<u32> {
        precondition!(
            index.depth_slice < self.depth
                && index.array_index < self.array_size
                && index.mip_level < self.mip_levels,
            "sub-resource {:?} out of range for {:?}", index, self,
        );
        Ok((index.depth_slice * self.array_size + index.array_index)
            * self.mip_levels + index.mip_level)
    }

    /// Inverse of `raw_index`.
    pub fn index_of(&self, raw: u32) -> SubResourceIndex {
        SubResourceIndex {
            depth_slice: raw / (self.array_size * self.mip_levels),
            array_index: raw / self.mip_levels % self.array_size,
            mip_level: raw % self.mip_levels,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct BytesRange {
    pub offset: u64,
    pub size: u64,
}

impl BytesRange {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// One past the last byte, or `None` on overflow.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.size)
    }

    /// True if the range lies within `0..limit`.
    pub fn fits_within(&self, limit: u64) -> bool {
        self.end().map_or(false, |end| end <= limit)
    }
}

/// Data for one sub-resource, optionally restricted to a byte range
/// within it.
#[derive(Clone, Copy, Debug)]
pub struct SubResource<'a> {
    pub data: &'a [u8],
    pub index: SubResourceIndex,
    pub range: Option<BytesRange>,
}

impl<'a> SubResource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            index: Default::default(),
            range: None,
        }
    }

    pub fn at(data: &'a [u8], index: SubResourceIndex) -> Self {
        Self { data, index, range: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_indices() {
        let count = SubResourceCount::new(2, 3, 4);
        assert_eq!(count.total(), 24);
        let index = SubResourceIndex::new(1, 2, 3);
        let raw = count.raw_index(index).unwrap();
        assert_eq!(raw, (3 + 2) * 4 + 3);
        assert_eq!(count.index_of(raw), index);
        assert_eq!(count.raw_index(Default::default()).unwrap(), 0);
        assert!(count.raw_index(SubResourceIndex::mip(4)).unwrap_err()
            .is_precondition());
    }

    #[test]
    fn range_bounds() {
        assert_eq!(BytesRange::new(4, 8).end(), Some(12));
        assert_eq!(BytesRange::new(u64::MAX, 2).end(), None);
        assert!(BytesRange::new(4, 8).fits_within(12));
        assert!(!BytesRange::new(4, 8).fits_within(11));
        assert!(!BytesRange::new(u64::MAX, 2).fits_within(u64::MAX));
    }
}
