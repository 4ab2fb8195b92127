pub mod capacity_model;
pub mod node;
pub mod queue;
pub mod reservation;
pub mod rms;
pub mod utils;
