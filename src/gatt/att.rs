use crate::uuid::BleUuid;

/// Client characteristic configuration descriptor type.
pub const CLIENT_CHARACTERISTIC_CONFIGURATION: BleUuid = BleUuid::Short(0x2902);

pub const CLIENT_CONFIGURATION_NONE: u8 = 0x00;
pub const CLIENT_CONFIGURATION_NOTIFICATION: u8 = 0x01;
pub const CLIENT_CONFIGURATION_INDICATION: u8 = 0x02;

/// Result of a write routed to a local attribute, carrying the ATT wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AttError {
    Ok = 0x00,
    InvalidHandle = 0x01,
    ReadNotPermitted = 0x02,
    WriteNotPermitted = 0x03,
    InvalidPdu = 0x04,
    InsufficientAuthentication = 0x05,
    RequestNotSupported = 0x06,
    InvalidOffset = 0x07,
    InsufficientAuthorization = 0x08,
    PrepareQueueFull = 0x09,
    AttributeNotFound = 0x0A,
    AttributeNotLong = 0x0B,
    InsufficientEncryptionKeySize = 0x0C,
    InvalidAttributeValueLength = 0x0D,
    UnlikelyError = 0x0E,
    InsufficientEncryption = 0x0F,
    UnsupportedGroupType = 0x10,
    InsufficientResources = 0x11,
}

impl AttError {
    pub fn is_ok(&self) -> bool {
        *self == AttError::Ok
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<AttError> {
        let error = match code {
            0x00 => AttError::Ok,
            0x01 => AttError::InvalidHandle,
            0x02 => AttError::ReadNotPermitted,
            0x03 => AttError::WriteNotPermitted,
            0x04 => AttError::InvalidPdu,
            0x05 => AttError::InsufficientAuthentication,
            0x06 => AttError::RequestNotSupported,
            0x07 => AttError::InvalidOffset,
            0x08 => AttError::InsufficientAuthorization,
            0x09 => AttError::PrepareQueueFull,
            0x0A => AttError::AttributeNotFound,
            0x0B => AttError::AttributeNotLong,
            0x0C => AttError::InsufficientEncryptionKeySize,
            0x0D => AttError::InvalidAttributeValueLength,
            0x0E => AttError::UnlikelyError,
            0x0F => AttError::InsufficientEncryption,
            0x10 => AttError::UnsupportedGroupType,
            0x11 => AttError::InsufficientResources,
            _ => return None,
        };
        Some(error)
    }
}

impl From<AttError> for u8 {
    fn from(error: AttError) -> u8 {
        error.code()
    }
}
