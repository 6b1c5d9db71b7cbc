pub mod boards;
pub mod queue;
