//! Persistent configuration storage.
//!
//! The runtime configuration is stored in FRAM as a small framed record:
//!
//! ```text
//! offset  size  field
//! 0       4     magic "DCFG"
//! 4       1     version (1)
//! 5       2     payload length, little endian
//! 7       2     checksum (byte sum & 0xFFFF), little endian
//! 9       n     payload: key=value lines
//! ```

extern crate alloc;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

use crate::config::{ConfigError, RuntimeConfig};
use crate::traits::NvMemory;

/// Record magic.
pub const MAGIC: [u8; 4] = *b"DCFG";
/// Record format version.
pub const VERSION: u8 = 1;
/// Header size in bytes.
pub const HEADER_LEN: usize = 9;
/// FRAM size in bytes (MB85RC16).
pub const FRAM_SIZE: usize = 2048;
/// Largest payload that fits after the header.
pub const PAYLOAD_CAPACITY: usize = FRAM_SIZE - HEADER_LEN;

const CLEAR_CHUNK: usize = 32;

/// Storage failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Memory device error.
    #[error("FRAM access failed: {0}")]
    Device(String),
    /// Missing or wrong magic.
    #[error("No valid FRAM config header found")]
    NoHeader,
    /// Header version is not [`VERSION`].
    #[error("Unsupported FRAM config version: {0}")]
    UnsupportedVersion(u8),
    /// Stored length is 0 or larger than [`PAYLOAD_CAPACITY`].
    #[error("Invalid FRAM config length: {0}")]
    InvalidLength(usize),
    /// Payload bytes do not match the stored checksum.
    #[error("FRAM config checksum mismatch")]
    ChecksumMismatch,
    /// Serialized config larger than [`PAYLOAD_CAPACITY`].
    #[error("Config payload too large for FRAM ({0} bytes)")]
    TooLarge(usize),
    /// Payload is not UTF-8.
    #[error("FRAM config payload is not valid UTF-8")]
    Encoding,
    /// Payload failed to parse.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Requested range lies outside the memory.
    #[error("Address out of range: {0}")]
    OutOfRange(usize),
}

impl StorageError {
    fn device<E: core::fmt::Debug>(e: E) -> Self {
        StorageError::Device(alloc::format!("{:?}", e))
    }
}

/// Byte sum of `data`, truncated to 16 bits.
pub fn checksum(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |acc, b| acc.wrapping_add(u16::from(*b)))
}

/// Somewhere a [`RuntimeConfig`] can be saved and loaded.
pub trait ConfigStore {
    /// Reads and validates the stored configuration.
    fn load(&mut self) -> Result<RuntimeConfig, StorageError>;

    /// Persists `config`.
    fn save(&mut self, config: &RuntimeConfig) -> Result<(), StorageError>;

    /// Erases the stored configuration.
    fn clear(&mut self) -> Result<(), StorageError>;

    /// Logs the first `len` raw bytes of the backing device, if it has any.
    fn dump(&mut self, len: usize) -> Result<(), StorageError> {
        log::info!("config store has no raw view ({} bytes requested)", len);
        Ok(())
    }

    /// Loads, falling back to defaults. The flag reports whether the
    /// stored copy was used.
    fn load_or_default(&mut self) -> (RuntimeConfig, bool) {
        match self.load() {
            Ok(config) => (config, true),
            Err(e) => {
                log::warn!("using default config: {}", e);
                (RuntimeConfig::default(), false)
            }
        }
    }
}

/// [`ConfigStore`] on top of a 2 KiB FRAM.
pub struct FramConfigStore<M: NvMemory> {
    mem: M,
}

impl<M: NvMemory> FramConfigStore<M> {
    /// Wraps a memory device.
    pub fn new(mem: M) -> Self {
        Self { mem }
    }

    /// Borrow the memory device.
    pub fn memory(&self) -> &M {
        &self.mem
    }

    /// Mutably borrow the memory device.
    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.mem
    }

    fn size(&self) -> usize {
        self.mem.capacity().min(FRAM_SIZE)
    }

    /// Reads `len` raw bytes starting at `address`.
    pub fn read_raw(&mut self, address: usize, len: usize) -> Result<Vec<u8>, StorageError> {
        let end = address
            .checked_add(len)
            .filter(|end| len > 0 && *end <= self.size())
            .ok_or(StorageError::OutOfRange(address))?;
        let mut buf = vec![0u8; end - address];
        self.mem.read(address, &mut buf).map_err(StorageError::device)?;
        Ok(buf)
    }

    /// Logs a hex dump of the first `len` bytes, decoding the header if present.
    pub fn dump(&mut self, len: usize) -> Result<(), StorageError> {
        let data = self.read_raw(0, len.min(self.size()))?;
        if data.len() >= HEADER_LEN {
            log::info!(
                "FRAM header magic={} version={} length={} checksum=0x{:04X}",
                if data[..4] == MAGIC { "DCFG" } else { "invalid" },
                data[4],
                u16::from_le_bytes([data[5], data[6]]),
                u16::from_le_bytes([data[7], data[8]]),
            );
        }
        for (i, row) in data.chunks(16).enumerate() {
            log::info!("FRAM {:04X}: {:02X?}", i * 16, row);
        }
        Ok(())
    }
}

impl<M: NvMemory> ConfigStore for FramConfigStore<M> {
    fn load(&mut self) -> Result<RuntimeConfig, StorageError> {
        let mut header = [0u8; HEADER_LEN];
        self.mem.read(0, &mut header).map_err(StorageError::device)?;

        if header[..4] != MAGIC {
            return Err(StorageError::NoHeader);
        }
        if header[4] != VERSION {
            return Err(StorageError::UnsupportedVersion(header[4]));
        }
        let len = usize::from(u16::from_le_bytes([header[5], header[6]]));
        if len == 0 || len > PAYLOAD_CAPACITY {
            return Err(StorageError::InvalidLength(len));
        }
        let expected = u16::from_le_bytes([header[7], header[8]]);

        let mut payload = vec![0u8; len];
        self.mem
            .read(HEADER_LEN, &mut payload)
            .map_err(StorageError::device)?;
        if checksum(&payload) != expected {
            return Err(StorageError::ChecksumMismatch);
        }

        let text = core::str::from_utf8(&payload).map_err(|_| StorageError::Encoding)?;
        Ok(RuntimeConfig::from_lines(text)?)
    }

    fn save(&mut self, config: &RuntimeConfig) -> Result<(), StorageError> {
        let text = config.to_string();
        let payload = text.as_bytes();
        if payload.len() > PAYLOAD_CAPACITY {
            return Err(StorageError::TooLarge(payload.len()));
        }

        let len = (payload.len() as u16).to_le_bytes();
        let sum = checksum(payload).to_le_bytes();
        let header = [
            MAGIC[0], MAGIC[1], MAGIC[2], MAGIC[3], VERSION, len[0], len[1], sum[0], sum[1],
        ];

        // Header last: the record is only valid once the payload is in place.
        self.mem
            .write(HEADER_LEN, payload)
            .map_err(StorageError::device)?;
        self.mem.write(0, &header).map_err(StorageError::device)?;
        log::info!("config saved to FRAM ({} bytes)", payload.len());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        let blank = [0xFFu8; CLEAR_CHUNK];
        let size = self.size();
        let mut address = 0;
        while address < size {
            let chunk = (size - address).min(CLEAR_CHUNK);
            self.mem
                .write(address, &blank[..chunk])
                .map_err(StorageError::device)?;
            address += chunk;
        }
        log::info!("FRAM cleared");
        Ok(())
    }

    fn dump(&mut self, len: usize) -> Result<(), StorageError> {
        FramConfigStore::dump(self, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockMemory;

    fn store() -> FramConfigStore<MockMemory> {
        FramConfigStore::new(MockMemory::new())
    }

    // =========================================================================
    // Save / Load
    // =========================================================================

    #[test]
    fn save_then_load() {
        let mut s = store();
        let mut config = RuntimeConfig::default();
        config.set("mqtt.broker", "10.0.0.9").unwrap();
        config.set("system.location", "roof").unwrap();

        s.save(&config).unwrap();
        assert_eq!(s.load().unwrap(), config);
    }

    #[test]
    fn interrupted_save_leaves_no_header() {
        let mut s = store();
        s.memory_mut().fail_after_writes = Some(1);

        assert!(matches!(
            s.save(&RuntimeConfig::default()),
            Err(StorageError::Device(_))
        ));
        assert_eq!(s.load(), Err(StorageError::NoHeader));
        let (_, from_store) = s.load_or_default();
        assert!(!from_store);
    }

    #[test]
    fn header_layout() {
        let mut s = store();
        s.save(&RuntimeConfig::default()).unwrap();

        let text = RuntimeConfig::default().to_string();
        let data = &s.memory().data;
        assert_eq!(&data[..4], b"DCFG");
        assert_eq!(data[4], 1);
        assert_eq!(
            usize::from(u16::from_le_bytes([data[5], data[6]])),
            text.len()
        );
        assert_eq!(
            u16::from_le_bytes([data[7], data[8]]),
            checksum(text.as_bytes())
        );
        assert_eq!(&data[9..9 + text.len()], text.as_bytes());
    }

    #[test]
    fn checksum_wraps() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[1, 2, 3]), 6);
        assert_eq!(checksum(&[0xFF; 300]), (0xFF * 300 % 0x10000) as u16);
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn blank_memory_has_no_header() {
        assert_eq!(store().load(), Err(StorageError::NoHeader));
    }

    #[test]
    fn wrong_version_rejected() {
        let mut s = store();
        s.save(&RuntimeConfig::default()).unwrap();
        s.memory_mut().data[4] = 2;
        assert_eq!(s.load(), Err(StorageError::UnsupportedVersion(2)));
    }

    #[test]
    fn bad_lengths_rejected() {
        let mut s = store();
        s.save(&RuntimeConfig::default()).unwrap();
        s.memory_mut().data[5] = 0;
        s.memory_mut().data[6] = 0;
        assert_eq!(s.load(), Err(StorageError::InvalidLength(0)));

        let too_long = (PAYLOAD_CAPACITY as u16 + 1).to_le_bytes();
        s.memory_mut().data[5] = too_long[0];
        s.memory_mut().data[6] = too_long[1];
        assert_eq!(
            s.load(),
            Err(StorageError::InvalidLength(PAYLOAD_CAPACITY + 1))
        );
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let mut s = store();
        s.save(&RuntimeConfig::default()).unwrap();
        s.memory_mut().data[HEADER_LEN + 3] ^= 0x01;
        assert_eq!(s.load(), Err(StorageError::ChecksumMismatch));
    }

    #[test]
    fn unparseable_payload_is_config_error() {
        let mut mem = MockMemory::new();
        let payload = b"bogus.key=1";
        let len = (payload.len() as u16).to_le_bytes();
        let sum = checksum(payload).to_le_bytes();
        mem.data[..9].copy_from_slice(&[b'D', b'C', b'F', b'G', 1, len[0], len[1], sum[0], sum[1]]);
        mem.data[9..9 + payload.len()].copy_from_slice(payload);

        let mut s = FramConfigStore::new(mem);
        assert!(matches!(
            s.load(),
            Err(StorageError::Config(ConfigError::UnknownKey(_)))
        ));
    }

    #[test]
    fn device_errors_surface() {
        let mut s = store();
        s.memory_mut().fail_writes = true;
        assert!(matches!(
            s.save(&RuntimeConfig::default()),
            Err(StorageError::Device(_))
        ));
    }

    // =========================================================================
    // Clear / Fallback
    // =========================================================================

    #[test]
    fn clear_fills_with_ff() {
        let mut s = store();
        s.save(&RuntimeConfig::default()).unwrap();
        s.clear().unwrap();
        assert!(s.memory().data.iter().all(|b| *b == 0xFF));
        assert_eq!(s.load(), Err(StorageError::NoHeader));
    }

    #[test]
    fn load_or_default_reports_source() {
        let mut s = store();
        let (config, from_store) = s.load_or_default();
        assert_eq!(config, RuntimeConfig::default());
        assert!(!from_store);

        let custom = RuntimeConfig::default()
            .with_system(crate::config::SystemConfig::default().with_location("lab"));
        s.save(&custom).unwrap();
        let (config, from_store) = s.load_or_default();
        assert_eq!(config, custom);
        assert!(from_store);
    }

    #[test]
    fn read_raw_bounds() {
        let mut s = store();
        assert_eq!(s.read_raw(0, 16).unwrap().len(), 16);
        assert_eq!(s.read_raw(FRAM_SIZE - 1, 2), Err(StorageError::OutOfRange(FRAM_SIZE - 1)));
        assert_eq!(s.read_raw(0, 0), Err(StorageError::OutOfRange(0)));
        assert!(s.dump(64).is_ok());
    }
}
