//! Duolink core data types
//!
//! This crate provides basic value types used by other Duolink crates.
//! Duolink users should not depend on this crate directly. Use `duolink::core` reexport instead.
#![no_std]

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidValue;

/// Identity of a worker core on the link
///
/// Worker identities are dense, starting from zero. The upper bound is fixed by the
/// link configuration, so the type only guards the raw encoding range.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WorkerId(u8);

impl WorkerId {
    const MAX_VALUE: u8 = 0x7f;
    pub const MIN: WorkerId = WorkerId(0);
    pub const MAX: WorkerId = WorkerId(Self::MAX_VALUE);

    pub const fn new(value: u8) -> Option<Self> {
        if value <= Self::MAX_VALUE {
            Some(Self(value))
        } else {
            None
        }
    }

    pub const fn from_u8_truncating(value: u8) -> Self {
        Self(value & Self::MAX_VALUE)
    }

    pub const fn into_u8(self) -> u8 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<WorkerId> for u8 {
    fn from(value: WorkerId) -> Self {
        value.into_u8()
    }
}

impl From<WorkerId> for usize {
    fn from(value: WorkerId) -> Self {
        value.index()
    }
}

impl TryFrom<u8> for WorkerId {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(InvalidValue)
    }
}

impl TryFrom<usize> for WorkerId {
    type Error = InvalidValue;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        let value = u8::try_from(value).map_err(|_| InvalidValue)?;
        Self::try_from(value)
    }
}

/// Logic level of a digital signal
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub const fn is_low(self) -> bool {
        matches!(self, Level::Low)
    }

    pub const fn is_high(self) -> bool {
        matches!(self, Level::High)
    }
}

impl From<bool> for Level {
    fn from(value: bool) -> Self {
        if value { Level::High } else { Level::Low }
    }
}

impl From<Level> for bool {
    fn from(value: Level) -> Self {
        value.is_high()
    }
}

/// Role of a shared buffer chunk
///
/// The controller produces setpoints, each worker produces its own measurement.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChunkKind {
    Setpoint,
    Measurement,
}

/// Scheduling priority of a posted event
///
/// Interrupt-origin work always drains before normal work within a dispatch pass.
/// The numeric encoding orders higher priority first.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Priority {
    Interrupt = 0,
    Normal = 1,
}

impl Priority {
    pub const MIN: Priority = Priority::Interrupt;
    pub const MAX: Priority = Priority::Normal;

    pub const fn try_from_u8(code: u8) -> Option<Priority> {
        match code {
            0 => Some(Priority::Interrupt),
            1 => Some(Priority::Normal),
            _ => None,
        }
    }

    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

impl From<Priority> for u8 {
    fn from(value: Priority) -> Self {
        value.into_u8()
    }
}

impl TryFrom<u8> for Priority {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from_u8(value).ok_or(InvalidValue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_id_range() {
        assert_eq!(WorkerId::new(0), Some(WorkerId::MIN));
        assert_eq!(WorkerId::new(0x7f), Some(WorkerId::MAX));
        assert_eq!(WorkerId::new(0x80), None);
        assert_eq!(WorkerId::from_u8_truncating(0x81), WorkerId::new(1).unwrap());
    }

    #[test]
    fn test_worker_id_conversion() {
        let id = WorkerId::try_from(3usize).unwrap();
        assert_eq!(usize::from(id), 3);
        assert!(WorkerId::try_from(300usize).is_err());
        assert!(WorkerId::try_from(200u8).is_err());
    }

    #[test]
    fn test_level() {
        assert_eq!(Level::from(true), Level::High);
        assert!(Level::Low.is_low());
        assert!(!bool::from(Level::Low));
    }

    #[test]
    fn test_priority_order() {
        assert!(Priority::Interrupt < Priority::Normal);
        assert_eq!(Priority::try_from(1u8).unwrap(), Priority::Normal);
        assert!(Priority::try_from(2u8).is_err());
    }
}
