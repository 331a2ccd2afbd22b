//! Utility modules shared by the pipeline stages

pub mod arrow_utils;
pub mod io;
pub mod logging;
pub mod test;
