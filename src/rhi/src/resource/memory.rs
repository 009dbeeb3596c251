use std::fmt;

use more_asserts::assert_le;
use parking_lot::Mutex;

/// A block of device memory. Host access is always possible; whether a
/// resource is allowed to use it depends on its storage mode.
pub struct DeviceMemory {
    bytes: Mutex<Vec<u8>>,
    size: u64,
}

impl fmt::Debug for DeviceMemory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DeviceMemory").field("size", &self.size).finish()
    }
}

impl DeviceMemory {
    pub(crate) fn new(size: u64) -> Self {
        Self {
            bytes: Mutex::new(vec![0; size as usize]),
            size,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn write(&self, offset: u64, data: &[u8]) {
        let end = offset + data.len() as u64;
        assert_le!(end, self.size);
        self.bytes.lock()[offset as usize..end as usize]
            .copy_from_slice(data);
    }

    pub(crate) fn read(&self, offset: u64, len: u64) -> Vec<u8> {
        let end = offset + len;
        assert_le!(end, self.size);
        self.bytes.lock()[offset as usize..end as usize].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_access() {
        let mem = DeviceMemory::new(8);
        mem.write(2, &[1, 2, 3]);
        assert_eq!(mem.read(0, 6), [0, 0, 1, 2, 3, 0]);
    }

    #[test]
    #[should_panic]
    fn write_past_end() {
        DeviceMemory::new(4).write(2, &[0; 4]);
    }
}
