//! Service layer: the shared fleet state, both tick loops and the
//! controller that fronts them.

pub mod fleet_controller;
pub mod fleet_state;
pub mod job_monitor;
pub mod reconciliation_loop;
mod tick_guard;

pub use fleet_controller::{FleetController, WorkerProbe};
pub use fleet_state::FleetState;
pub use job_monitor::{JobMonitor, MonitorReport, MonitorTickOutcome};
pub use reconciliation_loop::{ReconcileReport, ReconciliationLoop, TickOutcome};
