// Application layer: the event loop orchestrator plus the code review and
// self-update workflows it drives.

pub mod app;
pub mod reviewer;
pub mod self_update;
