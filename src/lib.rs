pub mod bands;
pub mod chart;
pub mod config;
pub mod logging;
pub mod pipeline;
pub mod range;
pub mod regression;
pub mod series;
pub mod server;
pub mod upstream;
