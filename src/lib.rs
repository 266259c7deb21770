pub mod error;
pub mod gbsplay;
pub mod smf;
pub mod translate;

pub use error::Error;
pub use translate::Translator;
