pub mod felt;
pub mod math;

pub use felt::{add_leading_zeros, felt_to_decimal, felt_to_u64, get_selector_from_name, parse_felt};
pub use math::{pow10, safe_div, scale_down};
