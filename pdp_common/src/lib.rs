mod geo;
mod money;

pub mod op;

pub use geo::{Coordinates, METERS_PER_DEGREE};
pub use money::{Money, MoneyConversionError};
