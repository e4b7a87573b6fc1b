pub mod cluster;
pub mod defaults;
