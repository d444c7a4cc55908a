//! Work-order lifecycle: state machine, acceptance, delivery and correction
//! protocols.

mod clock;
mod commands;
mod engine;
mod status;

pub use clock::{Clock, ManualClock, SystemClock};
pub use commands::{
    AcceptInput, CompletionChecklist, CorrectionRequest, DeliveryInput, NewWorkOrder,
    WorkOrderDetails, WorkOrderPatch, WorkOrderView,
};
pub use engine::{EngineOptions, LifecycleEngine};
pub use status::is_overdue;
