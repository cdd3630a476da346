pub mod availability;
pub mod lifecycle;
pub mod locks;
pub mod occupancy;
pub mod sweeper;
