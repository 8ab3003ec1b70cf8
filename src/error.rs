use std::{error, fmt};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorType {
    RadioStack,
    Registration,
    InvalidUuid,
    ChannelError,
}

impl From<ErrorType> for &'static str {
    fn from(error_type: ErrorType) -> &'static str {
        match error_type {
            ErrorType::RadioStack => "RadioStack",
            ErrorType::Registration => "Registration",
            ErrorType::InvalidUuid => "InvalidUuid",
            ErrorType::ChannelError => "ChannelError",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(self: &Self, f: &mut fmt::Formatter) -> fmt::Result {
        let error_type: &str = self.clone().into();
        write!(f, "<BleGattDispatch {} Error>", error_type)
    }
}

impl error::Error for ErrorType {}

#[derive(Debug, Clone)]
pub struct Error {
    name: String,
    description: String,
    combined_description: String,
    error_type: ErrorType,
}

impl Error {
    pub fn new<T: Into<String>>(name: T, description: T, error_type: ErrorType) -> Self {
        let name: String = name.into();
        let description: String = description.into();
        let combined_description = format!("{}: {}", name, description);
        Error {
            name,
            description,
            combined_description,
            error_type,
        }
    }

    pub fn from_string(error: String, error_type: ErrorType) -> Self {
        let name: String = error_type.to_string();
        let description: String = error;
        let combined_description = format!("{}: {}", name, description);
        Error {
            name,
            description,
            combined_description,
            error_type,
        }
    }

    pub fn error_type(&self) -> &ErrorType {
        &self.error_type
    }
}

impl fmt::Display for Error {
    fn fmt(self: &Self, f: &mut fmt::Formatter) -> fmt::Result {
        let error_type: &str = self.error_type.clone().into();
        write!(
            f,
            "**BleGattDispatch {} Error**\n\n\t{}:\n\t\t{}",
            error_type, self.name, self.description,
        )
    }
}

impl error::Error for Error {
    fn description(self: &Self) -> &str {
        &self.combined_description
    }

    fn source(self: &Self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.error_type)
    }
}

impl From<uuid::Error> for Error {
    fn from(err: uuid::Error) -> Self {
        Error::from_string(err.to_string(), ErrorType::InvalidUuid)
    }
}

impl<T> From<mpsc::error::SendError<T>> for Error {
    fn from(err: mpsc::error::SendError<T>) -> Self {
        Error::from_string(err.to_string(), ErrorType::ChannelError)
    }
}
