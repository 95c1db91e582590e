pub mod serve;
pub mod stats;
