pub mod files;
pub mod scenarios;
pub mod util;

pub use files::{CatalogSource, JsonPreferences};
pub use scenarios::{get_scenario, list_scenarios, scenario_names};
pub use util::{report_timestamp, split_csv};
