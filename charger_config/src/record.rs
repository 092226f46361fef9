//! Fixed-size persisted slot settings.
//!
//! Layout (14 bytes):
//!
//! | offset | size | field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 4    | checksum, big-endian                    |
//! | 4      | 2×2  | capacity in mAh per slot, little-endian |
//! | 8      | 2×1  | schedule per slot (0 slow, 1 restore, 2 fast) |
//! | 10     | 2×1  | loop count per slot                     |
//! | 12     | 2×1  | flags per slot, bit 0 = skip discharge  |
//!
//! The checksum folds every byte after the checksum field into an
//! accumulator seeded with [`CHECKSUM_SEED`]: `acc = (acc << 2) + byte`.

use std::path::{Path, PathBuf};

use eyre::WrapErr;
use thiserror::Error;

use crate::Schedule;
use crate::atomic::write_atomic;

pub const SLOTS: usize = 2;
pub const RECORD_LEN: usize = 14;
pub const CHECKSUM_SEED: u32 = 151;
pub const FLAG_SKIP_DISCHARGE: u8 = 0x01;
pub const DEFAULT_CAPACITY_MAH: u16 = 2000;

const CAPACITY_AT: usize = 4;
const SCHEDULE_AT: usize = 8;
const LOOPS_AT: usize = 10;
const FLAGS_AT: usize = 12;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("record length {actual}, expected {expected}")]
    Length { expected: usize, actual: usize },
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    Checksum { stored: u32, computed: u32 },
    #[error("slot {slot}: unknown schedule byte {value}")]
    Schedule { slot: usize, value: u8 },
}

/// Settings of one slot as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRecord {
    pub capacity_mah: u16,
    pub schedule: Schedule,
    pub loops: u8,
    pub flags: u8,
}

impl Default for SlotRecord {
    fn default() -> Self {
        Self {
            capacity_mah: DEFAULT_CAPACITY_MAH,
            schedule: Schedule::Slow,
            loops: 0,
            flags: 0,
        }
    }
}

impl SlotRecord {
    pub fn skip_discharge(&self) -> bool {
        self.flags & FLAG_SKIP_DISCHARGE != 0
    }

    pub fn set_skip_discharge(&mut self, on: bool) {
        if on {
            self.flags |= FLAG_SKIP_DISCHARGE;
        } else {
            self.flags &= !FLAG_SKIP_DISCHARGE;
        }
    }

    /// Skipping the discharge makes looping meaningless, so it forces
    /// the loop count to zero.
    pub fn normalized(mut self) -> Self {
        if self.skip_discharge() {
            self.loops = 0;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfigRecord {
    pub slots: [SlotRecord; SLOTS],
}

/// Fold `payload` into the running checksum.
pub fn checksum(payload: &[u8]) -> u32 {
    payload
        .iter()
        .fold(CHECKSUM_SEED, |acc, &b| (acc << 2).wrapping_add(u32::from(b)))
}

impl ConfigRecord {
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        for (i, s) in self.slots.iter().enumerate() {
            let at = CAPACITY_AT + 2 * i;
            out[at..at + 2].copy_from_slice(&s.capacity_mah.to_le_bytes());
            out[SCHEDULE_AT + i] = s.schedule.as_u8();
            out[LOOPS_AT + i] = s.loops;
            out[FLAGS_AT + i] = s.flags;
        }
        let crc = checksum(&out[CAPACITY_AT..]);
        out[..CAPACITY_AT].copy_from_slice(&crc.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() != RECORD_LEN {
            return Err(RecordError::Length {
                expected: RECORD_LEN,
                actual: bytes.len(),
            });
        }
        let stored = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let computed = checksum(&bytes[CAPACITY_AT..]);
        if stored != computed {
            return Err(RecordError::Checksum { stored, computed });
        }
        let mut rec = Self::default();
        for (i, s) in rec.slots.iter_mut().enumerate() {
            let at = CAPACITY_AT + 2 * i;
            let value = bytes[SCHEDULE_AT + i];
            *s = SlotRecord {
                capacity_mah: u16::from_le_bytes([bytes[at], bytes[at + 1]]),
                schedule: Schedule::from_u8(value)
                    .ok_or(RecordError::Schedule { slot: i, value })?,
                loops: bytes[LOOPS_AT + i],
                flags: bytes[FLAGS_AT + i],
            };
        }
        Ok(rec)
    }

    /// `(true, record)` for a valid record, `(false, defaults)` otherwise.
    pub fn load_or_default(bytes: &[u8]) -> (bool, Self) {
        match Self::decode(bytes) {
            Ok(rec) => (true, rec),
            Err(e) => {
                tracing::warn!(error = %e, "stored configuration rejected, using defaults");
                (false, Self::default())
            }
        }
    }
}

/// File-backed home of the [`ConfigRecord`].
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is not an error: it yields `(false, defaults)`.
    pub fn load(&self) -> eyre::Result<(bool, ConfigRecord)> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(ConfigRecord::load_or_default(&bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok((false, ConfigRecord::default()))
            }
            Err(e) => Err(e).wrap_err_with(|| format!("read {}", self.path.display())),
        }
    }

    /// Normalizes every slot, then writes atomically. Returns what was stored.
    pub fn save(&self, rec: &ConfigRecord) -> eyre::Result<ConfigRecord> {
        let mut out = *rec;
        for s in &mut out.slots {
            *s = s.normalized();
        }
        write_atomic(&self.path, &out.encode())
            .wrap_err_with(|| format!("write {}", self.path.display()))?;
        tracing::info!(path = %self.path.display(), "configuration saved");
        Ok(out)
    }
}
