mod filesystem;
mod traits;

pub use filesystem::FilesystemRecords;
pub use traits::{RecordKey, StateRecords};
