//! Ticket lifecycle core: domain types, error taxonomy, configuration, message
//! templates, persistence and gateway ports, and the lifecycle controller.

pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod messages;
pub mod ports;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use audit::AuditEvent;
pub use domain::ticket::{ChannelId, RequesterId, TicketDocument, TicketRecord, TicketState};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use lifecycle::{
    CloseOutcome, CloseTicketRequest, OpenOutcome, OpenTicketRequest, TicketLifecycle,
    TicketRegistry, TicketSettings,
};
pub use messages::{MessageTemplate, CLOSE_TICKET_ACTION, OPEN_TICKET_ACTION};
pub use ports::{ChatGateway, GatewayError, StoreError, TicketStore};
