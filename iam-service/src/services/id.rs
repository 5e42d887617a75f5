//! Public identifier allocation.
//!
//! Public ids look like `{prefix}_{32 hex chars}`; the suffix is an RFC 4122
//! version 4 UUID, i.e. 122 bits drawn from the OS entropy source. The
//! allocator never touches storage: uniqueness is finally enforced by the
//! store's constraints at insert time.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::{rngs::OsRng, RngCore};
use uuid::Builder;

use crate::services::error::IamError;

pub trait IdAllocator: Send + Sync {
    fn new_id(&self, prefix: &str) -> Result<String, IamError>;
}

/// Allocator backed by the operating system's entropy source.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdAllocator;

impl IdAllocator for RandomIdAllocator {
    fn new_id(&self, prefix: &str) -> Result<String, IamError> {
        check_prefix(prefix)?;

        let mut bytes = [0u8; 16];
        OsRng.try_fill_bytes(&mut bytes).map_err(|e| {
            tracing::error!(error = %e, prefix, "Entropy source unavailable");
            IamError::Allocation(anyhow::anyhow!(e))
        })?;

        let id = Builder::from_random_bytes(bytes).into_uuid();
        Ok(format!("{}_{}", prefix, id.simple()))
    }
}

/// Deterministic allocator handing out `{prefix}_{counter}` ids, zero padded
/// to the width of a random id. Meant for tests.
#[derive(Debug)]
pub struct SequenceAllocator {
    next: AtomicU64,
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl SequenceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting at `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl IdAllocator for SequenceAllocator {
    fn new_id(&self, prefix: &str) -> Result<String, IamError> {
        check_prefix(prefix)?;
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}_{:032x}", prefix, n))
    }
}

fn check_prefix(prefix: &str) -> Result<(), IamError> {
    if prefix.is_empty() || prefix.contains('_') {
        return Err(IamError::invalid(format!(
            "error invalid public id prefix {:?}",
            prefix
        )));
    }
    Ok(())
}

/// Allocate a public id with the default random allocator.
pub fn new_public_id(prefix: &str) -> Result<String, IamError> {
    RandomIdAllocator.new_id(prefix)
}

/// Split a public id into its prefix, if it carries one.
pub fn prefix_of(public_id: &str) -> Option<&str> {
    public_id
        .split_once('_')
        .map(|(prefix, _)| prefix)
        .filter(|prefix| !prefix.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn random_ids_carry_prefix_and_uuid_suffix() {
        let id = new_public_id("am").unwrap();
        let (prefix, suffix) = id.split_once('_').unwrap();
        assert_eq!(prefix, "am");
        assert_eq!(suffix.len(), 32);

        let parsed = uuid::Uuid::parse_str(suffix).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[test]
    fn random_ids_do_not_repeat() {
        let ids: HashSet<String> = (0..1000).map(|_| new_public_id("u").unwrap()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn sequence_allocator_is_deterministic() {
        let ids = SequenceAllocator::new();
        assert_eq!(ids.new_id("o").unwrap(), format!("o_{:032x}", 1));
        assert_eq!(ids.new_id("p").unwrap(), format!("p_{:032x}", 2));
    }

    #[test]
    fn rejects_malformed_prefix() {
        assert!(matches!(
            new_public_id(""),
            Err(IamError::InvalidArgument(_))
        ));
        assert!(matches!(
            SequenceAllocator::new().new_id("a_b"),
            Err(IamError::InvalidArgument(_))
        ));
    }

    #[test]
    fn prefix_of_splits_on_first_underscore() {
        assert_eq!(prefix_of("hc_0123"), Some("hc"));
        assert_eq!(prefix_of("global"), None);
        assert_eq!(prefix_of("_abc"), None);
    }
}
