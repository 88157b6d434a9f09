//! MB85RC16 2 KiB I2C FRAM.
//!
//! The device answers on eight I2C addresses, `0x50 + block`, each exposing
//! one 256-byte block with a single-byte word address. Linear addresses are
//! split accordingly and transfers never cross a block boundary.

use embedded_hal::i2c::I2c;

use crate::traits::NvMemory;

/// I2C address of block 0.
pub const MB85RC16_BASE_ADDR: u8 = 0x50;

/// Bytes per block.
pub const BLOCK_SIZE: usize = 256;

/// Total capacity.
pub const CAPACITY: usize = 2048;

/// Largest write payload sent in one I2C transaction.
const WRITE_CHUNK: usize = 32;

/// FRAM access errors.
#[derive(Debug)]
pub enum FramError<E> {
    /// Bus error.
    I2c(E),
    /// Access beyond the end of the device.
    OutOfRange {
        /// Start address.
        address: usize,
        /// Requested length.
        len: usize,
    },
}

/// MB85RC16 driver generic over any `embedded-hal` I2C bus.
pub struct Mb85rc16<I2C> {
    i2c: I2C,
}

impl<I2C: I2c> Mb85rc16<I2C> {
    /// Wraps the bus. The device needs no initialization.
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    /// Releases the bus.
    pub fn release(self) -> I2C {
        self.i2c
    }

    fn check(address: usize, len: usize) -> Result<(), FramError<I2C::Error>> {
        match address.checked_add(len) {
            Some(end) if end <= CAPACITY => Ok(()),
            _ => Err(FramError::OutOfRange { address, len }),
        }
    }

    /// Device address and word offset for a linear address.
    fn locate(address: usize) -> (u8, u8) {
        let block = (address / BLOCK_SIZE) as u8;
        let offset = (address % BLOCK_SIZE) as u8;
        (MB85RC16_BASE_ADDR + block, offset)
    }

    /// Bytes that fit between `address` and the end of its block.
    fn span(address: usize, remaining: usize) -> usize {
        remaining.min(BLOCK_SIZE - address % BLOCK_SIZE)
    }
}

impl<I2C: I2c> NvMemory for Mb85rc16<I2C> {
    type Error = FramError<I2C::Error>;

    fn capacity(&self) -> usize {
        CAPACITY
    }

    fn read(&mut self, address: usize, buf: &mut [u8]) -> Result<(), Self::Error> {
        Self::check(address, buf.len())?;
        let mut done = 0;
        while done < buf.len() {
            let at = address + done;
            let n = Self::span(at, buf.len() - done);
            let (device, offset) = Self::locate(at);
            self.i2c
                .write_read(device, &[offset], &mut buf[done..done + n])
                .map_err(FramError::I2c)?;
            done += n;
        }
        Ok(())
    }

    fn write(&mut self, address: usize, data: &[u8]) -> Result<(), Self::Error> {
        Self::check(address, data.len())?;
        let mut frame = [0u8; WRITE_CHUNK + 1];
        let mut done = 0;
        while done < data.len() {
            let at = address + done;
            let n = Self::span(at, data.len() - done).min(WRITE_CHUNK);
            let (device, offset) = Self::locate(at);
            frame[0] = offset;
            frame[1..=n].copy_from_slice(&data[done..done + n]);
            self.i2c
                .write(device, &frame[..=n])
                .map_err(FramError::I2c)?;
            done += n;
        }
        Ok(())
    }
}
