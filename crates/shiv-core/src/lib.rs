//! Build side of shiv: turns installed packages into a self-executing
//! archive.

mod build;
pub mod builder;
mod error;
mod fs;
mod info;
pub mod pip;

pub use build::{build_archive, BuildOutcome, BuildRequest, SOURCE_DATE_EPOCH_DEFAULT};
pub use builder::{create_archive, BINPRM_BUF_SIZE, DEFAULT_SHEBANG};
pub use error::BuildError;
pub use info::read_archive_info;
