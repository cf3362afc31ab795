pub mod models;
pub mod error;
pub mod finance;
pub mod changes;
pub mod acceptance;
pub mod state_machine;
pub mod repository;
pub mod memory;
pub mod orchestrator;

pub use acceptance::{AcceptanceRateTracker, ReliabilityUpdate, TerminalOrder};
pub use changes::{ChangeHandler, LineRequest};
pub use error::{OrderError, OrderResult};
pub use finance::{FinancialManager, OrderTotals};
pub use memory::InMemoryStore;
pub use models::{Actor, Merchant, Order, OrderLine, OrderStatus};
pub use orchestrator::{
    Collaborators, CreateOrderRequest, OrchestratorConfig, OrderOrchestrator, OrderProjection,
    UpdateOrderRequest, WebhookOutcome,
};
pub use state_machine::OrderStateMachine;
