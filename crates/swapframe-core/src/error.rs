//! Error types shared across the workspace.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A caller broke a documented precondition.
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// A bounded container would grow past its fixed capacity.
    #[error("{what}: capacity {capacity} exceeded (requested {requested})")]
    CapacityExceeded {
        /// What the container holds.
        what: &'static str,
        /// Fixed capacity of the container.
        capacity: usize,
        /// Number of elements that were requested.
        requested: usize,
    },
}

impl Error {
    /// Check that `requested` elements fit into a container of `capacity`.
    pub fn check_capacity(what: &'static str, capacity: usize, requested: usize) -> Result<()> {
        if requested > capacity {
            return Err(Self::CapacityExceeded {
                what,
                capacity,
                requested,
            });
        }
        Ok(())
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_within_bounds() {
        assert!(Error::check_capacity("images", 3, 0).is_ok());
        assert!(Error::check_capacity("images", 3, 3).is_ok());
    }

    #[test]
    fn capacity_exceeded_reports_sizes() {
        let err = Error::check_capacity("images", 3, 4).unwrap_err();
        assert_eq!(
            err,
            Error::CapacityExceeded {
                what: "images",
                capacity: 3,
                requested: 4
            }
        );
        assert_eq!(err.to_string(), "images: capacity 3 exceeded (requested 4)");
    }
}
