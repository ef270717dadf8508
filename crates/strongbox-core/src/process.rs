//! Process management utilities

use which::which;

/// Check if an executable with the given name is available
///
/// Names containing a path separator are checked as given.
pub fn command_exists(name: &str) -> bool {
    which(name).is_ok()
}
