pub mod ai;
pub mod daemon;
pub mod page;
pub mod settings;
pub mod tab;
pub mod usage;
