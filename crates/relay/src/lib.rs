pub mod api;
pub mod cli;
pub mod relay;
pub mod state;
