pub mod header;
pub mod utils;

pub use header::{draw_header, extract_domain};
pub use utils::{format_timestamp, method_color, truncate};
