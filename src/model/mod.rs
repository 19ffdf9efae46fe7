pub mod application;
pub mod backup;
pub mod common;
pub mod cronjob;
pub mod function;

pub use application::*;
pub use backup::*;
pub use common::*;
pub use cronjob::*;
pub use function::*;
