pub mod deploy;
pub mod deps;
pub mod sandbox;
pub mod tools;
pub mod utils;
pub mod workflow;
