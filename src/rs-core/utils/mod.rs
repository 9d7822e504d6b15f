pub mod logger;
pub mod time_ranges;
