pub mod timezone;

pub use timezone::{business_date_today, tokyo_now_rfc3339};
