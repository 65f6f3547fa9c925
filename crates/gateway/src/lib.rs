//! Chat platform adapter for ticketdesk.
//!
//! - **Events** (`events`) - routes button clicks and guild messages to the lifecycle
//! - **Commands** (`commands`) - recognizes the administrator panel trigger
//! - **Runner** (`runner`) - pumps an inbound transport with reconnect backoff
//! - **REST** (`rest`) - outbound `ChatGateway` over the Discord HTTP API
//!
//! # Architecture
//!
//! ```text
//! Transport → GatewayRunner → EventDispatcher → Handlers → TicketLifecycle
//!                                                              ↓
//!                                     RestChatGateway ← channel/message calls
//! ```

pub mod commands;
pub mod events;
pub mod rest;
pub mod runner;

pub use events::{ticket_dispatcher, EventDispatcher, GatewayEnvelope, GatewayEvent};
pub use rest::RestChatGateway;
pub use runner::{GatewayRunner, GatewayTransport, NoopGatewayTransport, ReconnectPolicy};
