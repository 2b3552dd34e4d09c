//! Startup restore — shard the service list across worker replicas.
//!
//! When a worker starts it can resume monitoring without waiting for
//! the coordinator to re-dispatch: services are partitioned by hashing
//! the service id modulo the replica count, so replicas restore
//! disjoint shards that together cover everything.

use sha2::{Digest, Sha256};

/// Which replica a service id belongs to, in `0..replica_count`.
pub fn shard_for(service_id: &str, replica_count: u32) -> u32 {
    let digest = Sha256::digest(service_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let hash = u64::from_be_bytes(prefix);
    (hash % u64::from(replica_count.max(1))) as u32
}

/// Whether `replica_index` owns this service id.
pub fn assigned_to(service_id: &str, replica_count: u32, replica_index: u32) -> bool {
    shard_for(service_id, replica_count) == replica_index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_is_deterministic() {
        assert_eq!(shard_for("svc-1", 3), shard_for("svc-1", 3));
        assert_eq!(shard_for("svc-2", 5), shard_for("svc-2", 5));
    }

    #[test]
    fn shards_partition_the_service_space() {
        let replica_count = 4;
        for i in 0..100 {
            let id = format!("svc-{i}");
            let owners: Vec<u32> = (0..replica_count)
                .filter(|&r| assigned_to(&id, replica_count, r))
                .collect();
            // Exactly one replica owns each service.
            assert_eq!(owners.len(), 1, "service {id} owned by {owners:?}");
            assert_eq!(owners[0], shard_for(&id, replica_count));
        }
    }

    #[test]
    fn single_replica_owns_everything() {
        for i in 0..20 {
            assert!(assigned_to(&format!("svc-{i}"), 1, 0));
        }
    }

    #[test]
    fn zero_replica_count_behaves_as_one() {
        assert_eq!(shard_for("svc-1", 0), 0);
    }

    #[test]
    fn shards_spread_across_replicas() {
        let replica_count = 3;
        let mut seen = vec![0usize; replica_count as usize];
        for i in 0..300 {
            seen[shard_for(&format!("svc-{i}"), replica_count) as usize] += 1;
        }
        // No replica should be starved with this many ids.
        for (replica, count) in seen.iter().enumerate() {
            assert!(*count > 0, "replica {replica} got no services");
        }
    }
}
