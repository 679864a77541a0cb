//! Worker identity for Snowflake generators.
//!
//! Each live process in the fleet needs a distinct `(datacenter_id,
//! worker_id)` pair. How that pair is obtained (static configuration, a
//! registry, a lease in a coordination service) is up to the
//! [`WorkerIdAssigner`] implementation; the generator only validates the
//! range.

use crate::{Error, Result};

/// Largest datacenter id representable in a Snowflake id (5 bits).
pub const MAX_DATACENTER_ID: i64 = 31;

/// Largest worker id representable in a Snowflake id (5 bits).
pub const MAX_WORKER_ID: i64 = 31;

/// Supplies the identity of the current process.
///
/// Both values must lie in `[0, 31]`; anything else is rejected when the
/// generator is constructed.
pub trait WorkerIdAssigner {
    /// The datacenter this process runs in.
    fn datacenter_id(&self) -> i64;

    /// The worker (machine) id of this process within its datacenter.
    fn worker_id(&self) -> i64;
}

/// An assigner that returns fixed, pre-allocated ids, typically read from
/// configuration or injected through the environment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StaticWorkerIdAssigner {
    datacenter_id: i64,
    worker_id: i64,
}

impl StaticWorkerIdAssigner {
    pub const fn new(datacenter_id: i64, worker_id: i64) -> Self {
        Self {
            datacenter_id,
            worker_id,
        }
    }
}

impl WorkerIdAssigner for StaticWorkerIdAssigner {
    fn datacenter_id(&self) -> i64 {
        self.datacenter_id
    }

    fn worker_id(&self) -> i64 {
        self.worker_id
    }
}

impl<W: WorkerIdAssigner + ?Sized> WorkerIdAssigner for Box<W> {
    fn datacenter_id(&self) -> i64 {
        (**self).datacenter_id()
    }

    fn worker_id(&self) -> i64 {
        (**self).worker_id()
    }
}

/// Checks that both ids fit their 5-bit fields.
///
/// # Errors
///
/// Returns [`Error::InvalidConfiguration`] naming the offending id.
pub fn validate_worker_identity(datacenter_id: i64, worker_id: i64) -> Result<()> {
    if !(0..=MAX_DATACENTER_ID).contains(&datacenter_id) {
        return Err(Error::invalid_configuration(format!(
            "datacenter id {datacenter_id} must be between 0 and {MAX_DATACENTER_ID}"
        )));
    }
    if !(0..=MAX_WORKER_ID).contains(&worker_id) {
        return Err(Error::invalid_configuration(format!(
            "worker id {worker_id} must be between 0 and {MAX_WORKER_ID}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_boundaries() {
        assert!(validate_worker_identity(0, 0).is_ok());
        assert!(validate_worker_identity(31, 31).is_ok());
    }

    #[test]
    fn rejects_out_of_range_ids() {
        for (dc, worker) in [(-1, 0), (32, 0), (0, -1), (0, 32)] {
            let err = validate_worker_identity(dc, worker).unwrap_err();
            assert!(matches!(err, Error::InvalidConfiguration { .. }), "{err}");
        }
    }

    #[test]
    fn static_assigner_returns_configured_values() {
        let assigner: Box<dyn WorkerIdAssigner> = Box::new(StaticWorkerIdAssigner::new(4, 9));
        assert_eq!(assigner.datacenter_id(), 4);
        assert_eq!(assigner.worker_id(), 9);
    }
}
