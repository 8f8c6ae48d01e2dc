pub mod load;
pub mod model;

pub use load::{load_settings, validate_job, CONFIG_FILE};
pub use model::{Job, Settings};
