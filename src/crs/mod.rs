pub mod crs_utils;
pub mod projection;
