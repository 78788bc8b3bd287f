mod app;
pub mod logging;
pub mod settings;

pub use app::{run, AppError, Exit, APPLICATION_NAME};
pub use logging::LoggerBuilder;
pub use settings::AppSettings;
