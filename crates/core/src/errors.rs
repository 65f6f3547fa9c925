use thiserror::Error;

use crate::domain::ticket::{ChannelId, RequesterId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("requester {requester_id} already has an open ticket in channel {channel_id}")]
    DuplicateTicket { requester_id: RequesterId, channel_id: ChannelId },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("ticket store i/o failure: {0}")]
    Storage(String),
    #[error("ticket store document is corrupt: {0}")]
    CorruptState(String),
    #[error("ticket channel provisioning failed: {0}")]
    ChannelProvision(String),
    #[error("ticket channel deletion failed: {0}")]
    ChannelDeletion(String),
    #[error("audit log delivery failed: {0}")]
    LogDelivery(String),
    #[error("gateway failure: {0}")]
    Gateway(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Domain(DomainError::DuplicateTicket { .. }))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("rejected: {message}")]
    Rejected { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "You already have an open ticket.",
            Self::ServiceUnavailable { .. } => {
                "Your ticket could not be processed right now. Please try again shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::Rejected { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::Rejected { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error) => {
                Self::Rejected { message: error.to_string(), correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Storage(message)
            | ApplicationError::CorruptState(message)
            | ApplicationError::ChannelProvision(message)
            | ApplicationError::ChannelDeletion(message)
            | ApplicationError::LogDelivery(message)
            | ApplicationError::Gateway(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}
