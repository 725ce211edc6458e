//! Configuration persistence in byte-addressable non-volatile storage.
//!
//! Layout: fixed 12 byte records, `token[3]`, NUL, `f64` little endian.
//! Record 0 holds the version (token `fv`); record `i + 1` holds table
//! parameter `i`.

use crate::error::{Result, StorageError};

use super::params::{self, Token, PARAM_COUNT};
use super::MachineConfig;

/// Bytes per record.
pub const RECORD_LEN: usize = 12;

/// Version written to record 0.
pub const CONFIG_VERSION: f64 = 2.0;

/// Bytes needed to hold the version record and the full table.
pub const STORAGE_LEN: usize = (PARAM_COUNT + 1) * RECORD_LEN;

const VERSION_TOKEN: &str = "fv";

/// Byte-addressable non-volatile storage (EEPROM or similar).
pub trait NvStorage {
    /// Read `buf.len()` bytes at `offset`.
    fn read(&self, offset: usize, buf: &mut [u8]) -> core::result::Result<(), StorageError>;

    /// Write `data` at `offset`.
    fn write(&mut self, offset: usize, data: &[u8]) -> core::result::Result<(), StorageError>;
}

/// In-memory storage; blank bytes read as `0xFF` like erased EEPROM.
#[derive(Debug, Clone)]
pub struct RamStorage<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> RamStorage<N> {
    /// Blank storage.
    pub const fn new() -> Self {
        Self { bytes: [0xFF; N] }
    }

    /// Raw contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl<const N: usize> Default for RamStorage<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> NvStorage for RamStorage<N> {
    fn read(&self, offset: usize, buf: &mut [u8]) -> core::result::Result<(), StorageError> {
        let end = offset
            .checked_add(buf.len())
            .filter(|end| *end <= N)
            .ok_or(StorageError::OutOfBounds {
                offset,
                len: buf.len(),
            })?;
        buf.copy_from_slice(&self.bytes[offset..end]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> core::result::Result<(), StorageError> {
        let end = offset
            .checked_add(data.len())
            .filter(|end| *end <= N)
            .ok_or(StorageError::OutOfBounds {
                offset,
                len: data.len(),
            })?;
        self.bytes[offset..end].copy_from_slice(data);
        Ok(())
    }
}

/// Result of [`ConfigStore::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoadOutcome {
    /// Stored version matched; values loaded.
    Loaded,
    /// Version mismatch; stored values overlaid on defaults and storage rewritten.
    Migrated {
        /// Records carried over from the old layout.
        carried: u16,
    },
}

/// Configuration table persisted in an [`NvStorage`].
pub struct ConfigStore<S: NvStorage> {
    storage: S,
    base: usize,
}

impl<S: NvStorage> ConfigStore<S> {
    /// Store whose table starts at byte `base`.
    pub fn new(storage: S, base: usize) -> Self {
        Self { storage, base }
    }

    /// Underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Release the underlying storage.
    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Load the stored configuration into `config`.
    ///
    /// On a version match each record is applied in table order. Otherwise
    /// `config` is reset to defaults, every readable record whose token is
    /// still in the table is applied, and the whole table is rewritten.
    pub fn load(&mut self, config: &mut MachineConfig) -> Result<LoadOutcome> {
        let (token, version) = self.read_record(0)?;
        let version_ok = token.map(|t| t.as_str() == VERSION_TOKEN).unwrap_or(false)
            && version == CONFIG_VERSION;

        if version_ok {
            for index in 0..PARAM_COUNT {
                let Some(param) = params::param_at(index) else {
                    continue;
                };
                let (token, value) = self.read_record(index + 1)?;
                if token == Some(param.token) {
                    if params::write(config, &param, value).is_err() {
                        warn!("stored value out of range, keeping current");
                    }
                }
            }
            debug!("configuration loaded");
            return Ok(LoadOutcome::Loaded);
        }

        *config = MachineConfig::default();
        let mut carried = 0u16;
        for record in 1..=PARAM_COUNT {
            let (token, value) = self.read_record(record)?;
            let Some(token) = token else {
                continue;
            };
            if let Ok(param) = params::lookup(token.as_str()) {
                if params::write(config, &param, value).is_ok() {
                    carried += 1;
                }
            }
        }
        info!("configuration migrated, {} values carried", carried);
        self.save(config)?;
        Ok(LoadOutcome::Migrated { carried })
    }

    /// Write the version record and every parameter.
    pub fn save(&mut self, config: &MachineConfig) -> Result<()> {
        let version = Token::new(VERSION_TOKEN).ok_or(StorageError::Device)?;
        self.write_record(0, version, CONFIG_VERSION)?;
        for index in 0..PARAM_COUNT {
            self.write_param(index, config)?;
        }
        Ok(())
    }

    /// Rewrite the record of table parameter `index`.
    pub fn write_param(&mut self, index: usize, config: &MachineConfig) -> Result<()> {
        let param = params::param_at(index).ok_or(StorageError::OutOfBounds {
            offset: self.offset(index + 1),
            len: RECORD_LEN,
        })?;
        let value = params::read(config, &param);
        self.write_record(index + 1, param.token, value)
    }

    fn offset(&self, record: usize) -> usize {
        self.base + record * RECORD_LEN
    }

    fn read_record(&self, record: usize) -> Result<(Option<Token>, f64)> {
        let mut buf = [0u8; RECORD_LEN];
        self.storage.read(self.offset(record), &mut buf)?;
        let token = if buf[3] == 0 {
            Token::from_record([buf[0], buf[1], buf[2]])
        } else {
            None
        };
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&buf[4..]);
        Ok((token, f64::from_le_bytes(raw)))
    }

    fn write_record(&mut self, record: usize, token: Token, value: f64) -> Result<()> {
        let mut buf = [0u8; RECORD_LEN];
        buf[..3].copy_from_slice(&token.to_record());
        buf[3] = 0;
        buf[4..].copy_from_slice(&value.to_le_bytes());
        self.storage.write(self.offset(record), &buf)?;
        Ok(())
    }
}
