pub mod engine;
pub mod loop_control;
pub mod prompt;
pub mod state;
