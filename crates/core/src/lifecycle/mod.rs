pub mod controller;
pub mod deletion;
pub mod locks;
pub mod registry;

pub use controller::{
    ticket_channel_name, ticket_permissions, CloseOutcome, CloseTicketRequest, OpenOutcome,
    OpenTicketRequest, TicketLifecycle, TicketSettings,
};
pub use deletion::{schedule_deletion, DeletionOutcome, ScheduledDeletion};
pub use locks::{RequesterGuard, RequesterLocks};
pub use registry::TicketRegistry;
