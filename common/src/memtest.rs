//! Erase / program / verify exercise for NOR memories.
//!
//! Each [`MemoryTest::run`] works on a window the size of the caller's buffer
//! at the current cursor, then moves the cursor one erase block further so
//! that repeated runs sweep the whole device.

use core::fmt;

/// Erase-before-write memory with sector and block erase granularity.
pub trait NorMemory {
    type Error;

    fn capacity(&self) -> u32;
    fn sector_size(&self) -> u32;
    fn block_size(&self) -> u32;

    fn erase_sector(&mut self, address: u32) -> Result<(), Self::Error>;
    fn erase_block(&mut self, address: u32) -> Result<(), Self::Error>;
    fn read(&mut self, address: u32, buffer: &mut [u8]) -> Result<(), Self::Error>;
    fn program(&mut self, address: u32, data: &[u8]) -> Result<(), Self::Error>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    Erase,
    VerifyErase,
    Program,
    VerifyProgram,
}

#[derive(Debug, PartialEq, Eq)]
pub enum TestError<E> {
    /// Capacity, sector or block size reported as zero, or a window that
    /// does not fit.
    Geometry,
    Memory { step: Step, error: E },
    Mismatch { step: Step, offset: usize, found: u8 },
}

impl<E: fmt::Debug> fmt::Display for TestError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Geometry => f.write_str("invalid geometry"),
            Self::Memory { step, error } => write!(f, "{:?} failed: {:?}", step, error),
            Self::Mismatch { step, offset, found } => {
                write!(f, "{:?}: byte {} reads {:#04x}", step, offset, found)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EraseKind {
    Sector,
    Block,
}

#[derive(Debug, Default)]
pub struct MemoryTest {
    cursor: u32,
    next_erase_block: bool,
}

impl MemoryTest {
    pub const fn new(start: u32) -> Self {
        Self { cursor: start, next_erase_block: false }
    }

    /// Where the next run starts.
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Runs one pass. Returns the tested address and the erase used.
    pub fn run<M: NorMemory>(
        &mut self,
        memory: &mut M,
        buffer: &mut [u8],
    ) -> Result<(u32, EraseKind), TestError<M::Error>> {
        let capacity = memory.capacity();
        let sector = memory.sector_size();
        let block = memory.block_size();
        if capacity == 0 || sector == 0 || block == 0 || buffer.len() as u64 > u64::from(sector) {
            return Err(TestError::Geometry);
        }

        if self.cursor >= capacity {
            self.cursor = 0;
        }
        let position = self.cursor;
        if u64::from(position) + buffer.len() as u64 > u64::from(capacity) {
            return Err(TestError::Geometry);
        }
        self.cursor = position.saturating_add(block);
        if self.cursor >= capacity {
            self.cursor = 0;
        }

        let erase = if self.next_erase_block { EraseKind::Block } else { EraseKind::Sector };
        self.next_erase_block = !self.next_erase_block;
        debug!("memtest at {=u32:#x}", position);

        let erased = match erase {
            EraseKind::Sector => memory.erase_sector(position),
            EraseKind::Block => memory.erase_block(position),
        };
        erased.map_err(|error| TestError::Memory { step: Step::Erase, error })?;

        memory
            .read(position, buffer)
            .map_err(|error| TestError::Memory { step: Step::VerifyErase, error })?;
        verify(buffer, Step::VerifyErase, |_| 0xFF)?;

        for (index, byte) in buffer.iter_mut().enumerate() {
            *byte = index as u8;
        }
        memory
            .program(position, buffer)
            .map_err(|error| TestError::Memory { step: Step::Program, error })?;

        buffer.fill(0);
        memory
            .read(position, buffer)
            .map_err(|error| TestError::Memory { step: Step::VerifyProgram, error })?;
        verify(buffer, Step::VerifyProgram, |index| index as u8)?;

        Ok((position, erase))
    }
}

fn verify<E>(buffer: &[u8], step: Step, expected: impl Fn(usize) -> u8) -> Result<(), TestError<E>> {
    match buffer.iter().enumerate().find(|(index, byte)| **byte != expected(*index)) {
        Some((offset, found)) => {
            warn!("memtest: {} mismatch at {=usize}", step, offset);
            Err(TestError::Mismatch { step, offset, found: *found })
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECTOR: u32 = 4096;
    const BLOCK: u32 = 65536;

    /// NOR semantics: erase sets bytes to 0xFF, programming can only clear bits.
    struct RamNor {
        data: Vec<u8>,
        erases: Vec<(EraseKind, u32)>,
        stuck_low: Option<usize>,
        stuck_high: Option<usize>,
        fail_program: bool,
    }

    impl RamNor {
        fn new(blocks: u32) -> Self {
            Self {
                data: vec![0u8; (blocks * BLOCK) as usize],
                erases: Vec::new(),
                stuck_low: None,
                stuck_high: None,
                fail_program: false,
            }
        }

        fn erase(&mut self, address: u32, size: u32) {
            let start = (address - address % size) as usize;
            self.data[start..start + size as usize].fill(0xFF);
            if let Some(stuck) = self.stuck_low {
                self.data[stuck] = 0;
            }
        }
    }

    impl NorMemory for RamNor {
        type Error = &'static str;

        fn capacity(&self) -> u32 {
            self.data.len() as u32
        }

        fn sector_size(&self) -> u32 {
            SECTOR
        }

        fn block_size(&self) -> u32 {
            BLOCK
        }

        fn erase_sector(&mut self, address: u32) -> Result<(), Self::Error> {
            self.erases.push((EraseKind::Sector, address));
            self.erase(address, SECTOR);
            Ok(())
        }

        fn erase_block(&mut self, address: u32) -> Result<(), Self::Error> {
            self.erases.push((EraseKind::Block, address));
            self.erase(address, BLOCK);
            Ok(())
        }

        fn read(&mut self, address: u32, buffer: &mut [u8]) -> Result<(), Self::Error> {
            let start = address as usize;
            buffer.copy_from_slice(&self.data[start..start + buffer.len()]);
            Ok(())
        }

        fn program(&mut self, address: u32, data: &[u8]) -> Result<(), Self::Error> {
            if self.fail_program {
                return Err("write protected");
            }
            let start = address as usize;
            for (cell, byte) in self.data[start..start + data.len()].iter_mut().zip(data) {
                *cell &= *byte;
            }
            if let Some(stuck) = self.stuck_high {
                self.data[stuck] |= 0x01;
            }
            Ok(())
        }
    }

    #[test]
    fn passes_and_sweeps_the_device() {
        let mut memory = RamNor::new(3);
        let mut test = MemoryTest::new(0);
        let mut buffer = [0u8; 2048];
        let mut positions = Vec::new();
        for _ in 0..4 {
            positions.push(test.run(&mut memory, &mut buffer).unwrap());
        }
        assert_eq!(
            positions,
            vec![
                (0, EraseKind::Sector),
                (BLOCK, EraseKind::Block),
                (2 * BLOCK, EraseKind::Sector),
                (0, EraseKind::Block),
            ]
        );
        assert_eq!(memory.data[..4], [0, 1, 2, 3]);
        assert_eq!(memory.data[300], 44);
    }

    #[test]
    fn stale_data_is_erased_first() {
        let mut memory = RamNor::new(1);
        memory.data.fill(0x00);
        let mut buffer = [0u8; 512];
        MemoryTest::new(0).run(&mut memory, &mut buffer).unwrap();
        assert_eq!(memory.erases, vec![(EraseKind::Sector, 0)]);
    }

    #[test]
    fn reports_bad_erase() {
        let mut memory = RamNor::new(1);
        memory.stuck_low = Some(17);
        let mut buffer = [0u8; 256];
        assert_eq!(
            MemoryTest::new(0).run(&mut memory, &mut buffer),
            Err(TestError::Mismatch { step: Step::VerifyErase, offset: 17, found: 0 })
        );
    }

    #[test]
    fn reports_bad_program() {
        let mut memory = RamNor::new(1);
        memory.stuck_high = Some(BLOCK as usize - 254);
        let mut buffer = [0u8; 256];
        let mut test = MemoryTest::new(BLOCK - 256);
        assert_eq!(
            test.run(&mut memory, &mut buffer),
            Err(TestError::Mismatch { step: Step::VerifyProgram, offset: 2, found: 3 })
        );
    }

    #[test]
    fn propagates_memory_errors() {
        let mut memory = RamNor::new(1);
        memory.fail_program = true;
        let mut buffer = [0u8; 64];
        assert_eq!(
            MemoryTest::new(0).run(&mut memory, &mut buffer),
            Err(TestError::Memory { step: Step::Program, error: "write protected" })
        );
    }

    #[test]
    fn rejects_bad_geometry() {
        let mut memory = RamNor::new(0);
        let mut buffer = [0u8; 64];
        assert_eq!(MemoryTest::new(0).run(&mut memory, &mut buffer), Err(TestError::Geometry));

        let mut memory = RamNor::new(1);
        let mut oversized = vec![0u8; SECTOR as usize + 1];
        assert_eq!(MemoryTest::new(0).run(&mut memory, &mut oversized), Err(TestError::Geometry));
    }

    #[test]
    fn cursor_wraps_past_capacity() {
        let mut memory = RamNor::new(2);
        let mut test = MemoryTest::new(5 * BLOCK);
        let mut buffer = [0u8; 16];
        assert_eq!(test.run(&mut memory, &mut buffer).unwrap().0, 0);
        assert_eq!(test.cursor(), BLOCK);
    }
}
