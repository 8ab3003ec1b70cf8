use crate::error::{Error, ErrorType};
use std::{fmt, str::FromStr};
use uuid::Uuid;

const BASE_UUID_TAIL: &[u8; 8] = b"\x80\x00\x00\x80\x5F\x9B\x34\xFB";

pub trait ShortUuid {
    fn from_short(uuid: u16) -> Uuid;

    /// Returns the 16-bit alias when `self` sits on the Bluetooth base UUID.
    fn to_short(&self) -> Option<u16>;
}

impl ShortUuid for Uuid {
    fn from_short(uuid: u16) -> Uuid {
        return Uuid::from_fields(uuid.into(), 0, 0x1000, BASE_UUID_TAIL);
    }

    fn to_short(&self) -> Option<u16> {
        let (d1, d2, d3, d4) = self.as_fields();
        if d1 > u16::MAX as u32 || d2 != 0 || d3 != 0x1000 || d4 != BASE_UUID_TAIL {
            return None;
        }
        Some(d1 as u16)
    }
}

/// Attribute type as handed to the radio stack: either a 16-bit
/// Bluetooth-assigned number or a full 128-bit vendor UUID.
///
/// A short and a long form never compare equal, even when the long form
/// is the base-UUID expansion of the short one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BleUuid {
    Short(u16),
    Long(Uuid),
}

impl BleUuid {
    pub const fn from_u16(uuid: u16) -> Self {
        BleUuid::Short(uuid)
    }

    pub const fn from_u128(uuid: u128) -> Self {
        BleUuid::Long(Uuid::from_u128(uuid))
    }

    /// Accepts `"2a05"` style 16-bit aliases and hyphenated 128-bit strings.
    pub fn parse(uuid_str: &str) -> Result<Self, Error> {
        if uuid_str.len() == 4 {
            return u16::from_str_radix(uuid_str, 16)
                .map(BleUuid::Short)
                .map_err(|err| {
                    Error::new(
                        format!("Invalid 16-bit UUID {}", uuid_str),
                        err.to_string(),
                        ErrorType::InvalidUuid,
                    )
                });
        }
        Ok(BleUuid::Long(Uuid::parse_str(uuid_str)?))
    }

    /// Full 128-bit form, expanding short aliases onto the base UUID.
    pub fn to_uuid(&self) -> Uuid {
        match self {
            BleUuid::Short(uuid) => Uuid::from_short(*uuid),
            BleUuid::Long(uuid) => *uuid,
        }
    }
}

impl From<u16> for BleUuid {
    fn from(uuid: u16) -> Self {
        BleUuid::Short(uuid)
    }
}

impl From<Uuid> for BleUuid {
    fn from(uuid: Uuid) -> Self {
        BleUuid::Long(uuid)
    }
}

impl FromStr for BleUuid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BleUuid::parse(s)
    }
}

impl fmt::Display for BleUuid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BleUuid::Short(uuid) => write!(f, "{:04x}", uuid),
            BleUuid::Long(uuid) => write!(f, "{}", uuid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_and_long_forms_never_compare_equal() {
        let short = BleUuid::from_u16(0x2A05);
        let long = BleUuid::Long(Uuid::from_short(0x2A05));
        assert_ne!(short, long);
        assert_eq!(short.to_uuid(), long.to_uuid());
    }

    #[test]
    fn parses_both_forms() {
        assert_eq!(BleUuid::parse("2a05").unwrap(), BleUuid::Short(0x2A05));
        let long = BleUuid::parse("89d3502b-0f36-433a-8ef4-c502ad55f8dc").unwrap();
        assert!(matches!(long, BleUuid::Long(_)));
        assert_eq!(long, BleUuid::from_u128(0x89d3502b_0f36_433a_8ef4_c502ad55f8dc));
        assert!(BleUuid::parse("zz").is_err());
        assert!(BleUuid::parse("xyzw").is_err());
    }

    #[test]
    fn recovers_short_alias_from_base_uuid() {
        assert_eq!(Uuid::from_short(0x1801).to_short(), Some(0x1801));
        assert_eq!(Uuid::from_u128(0x89d3502b_0f36_433a_8ef4_c502ad55f8dc).to_short(), None);
    }
}
