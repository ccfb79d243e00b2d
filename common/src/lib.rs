pub mod error;
pub mod settings;
pub mod title;
pub mod utils;

pub use self::error::WikiError;
pub use self::settings::Settings;
