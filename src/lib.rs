pub mod classify;
pub mod dataset;
pub mod features;
pub mod frame;
pub mod model;
pub mod output;
pub mod weather;
