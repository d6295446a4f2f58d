pub mod path;
pub mod service;
pub mod settings;

pub use path::*;
pub use service::ConfigService;
pub use settings::*;
