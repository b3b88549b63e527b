pub mod cve_parser;
pub mod suggestion_builder;
pub mod version_matching;

pub use cve_parser::parse_cve_record;
pub use suggestion_builder::{SuggestionBuilder, DEFAULT_MAX_MATCHES};
pub use version_matching::{compare_versions, constraint_status, parse_drv_name, product_status};
