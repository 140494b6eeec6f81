pub mod config;
pub mod error;
pub mod package;

pub use config::Config;
pub use error::ZollError;
pub use package::{Ecosystem, PackageCoordinate};
