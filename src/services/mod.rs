pub mod balancing;
pub mod features;
pub mod serving;
pub mod store;
pub mod training;
