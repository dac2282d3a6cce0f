pub mod artifacts;
pub mod system;
pub mod tasks;
