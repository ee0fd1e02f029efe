//! Process-wide tunables for [`crate::create_connection`].

use std::time::Duration;

/// Defaults used by [`crate::create_connection`] when the caller passes
/// `None` for a parameter.
///
/// Cheap to clone; holds no heap allocations.
#[derive(Debug, Clone)]
pub struct Config {
    /// Overall race deadline used when the caller does not supply one.
    /// `None` means race until all endpoints are exhausted.
    pub connect_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            connect_timeout: None,
        }
    }
}
