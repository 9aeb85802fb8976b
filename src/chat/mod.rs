//! Session orchestration: the per-turn state machine and its advisory
//! stop signals.

mod orchestrator;
mod stop;

pub use orchestrator::ChatService;
pub use stop::StopSignals;
