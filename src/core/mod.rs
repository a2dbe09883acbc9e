pub mod forecast;
pub mod heat_pump;
pub mod material_properties;
pub mod scheduler;
pub mod simulator;
pub mod tank;
pub mod units;
