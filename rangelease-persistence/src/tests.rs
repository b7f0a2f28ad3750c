#[cfg(test)]
mod unit_tests {
    use crate::{FileSystemPersistence, InMemoryPersistence};
    use rangelease_core::persistence::{DurableRangeState, PersistenceLayer};
    use rangelease_core::hlc::ClockTimestamp;
    use rangelease_core::lease::Lease;
    use rangelease_core::replica::{ReplicaDescriptor, ReplicaType};
    use rangelease_core::{LeaseError, LeaseSequence, RangeId};
    use tempfile::TempDir;

    fn durable(range: i64, seq: u64) -> DurableRangeState {
        let mut lease = Lease::new_epoch(
            ReplicaDescriptor::new(1, 1, 1, ReplicaType::VoterFull),
            ClockTimestamp::new(1_000, 0),
            1,
        );
        lease.sequence = LeaseSequence::new(seq);
        DurableRangeState::new(RangeId::new(range), lease, None, seq * 10)
    }

    #[tokio::test]
    async fn test_in_memory_persistence() {
        let persistence = InMemoryPersistence::new();
        let range = RangeId::new(1);

        assert!(persistence.load_range_state(range).await.unwrap().is_none());

        persistence.save_range_state(range, b"first").await.unwrap();
        persistence.save_range_state(range, b"second").await.unwrap();
        let loaded = persistence.load_range_state(range).await.unwrap();
        assert_eq!(loaded, Some(b"second".to_vec()));

        // Clones share records.
        let shared = persistence.clone();
        shared.save_range_state(RangeId::new(2), b"other").await.unwrap();
        assert_eq!(persistence.len(), 2);
    }

    #[tokio::test]
    async fn test_ranges_are_isolated() {
        let persistence = InMemoryPersistence::new();
        for range in [3, 1, 2] {
            let state = durable(range, range as u64);
            persistence
                .save_range_state(state.range_id, &state.to_bytes().unwrap())
                .await
                .unwrap();
        }

        assert_eq!(
            persistence.list_ranges().await.unwrap(),
            vec![RangeId::new(1), RangeId::new(2), RangeId::new(3)]
        );
        let bytes = persistence
            .load_range_state(RangeId::new(2))
            .await
            .unwrap()
            .unwrap();
        let restored = DurableRangeState::from_bytes(&bytes).unwrap();
        assert_eq!(restored.lease.sequence, LeaseSequence::new(2));
        assert_eq!(restored.applied_index, 20);
    }

    #[tokio::test]
    async fn test_file_system_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = FileSystemPersistence::new(temp_dir.path()).await.unwrap();
        let state = durable(7, 4);

        assert!(persistence
            .load_range_state(state.range_id)
            .await
            .unwrap()
            .is_none());

        persistence
            .save_range_state(state.range_id, &state.to_bytes().unwrap())
            .await
            .unwrap();

        // A new instance over the same directory sees the record.
        let reopened = FileSystemPersistence::new(temp_dir.path()).await.unwrap();
        let bytes = reopened
            .load_range_state(state.range_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(DurableRangeState::from_bytes(&bytes).unwrap(), state);

        let newer = durable(7, 5);
        reopened
            .save_range_state(newer.range_id, &newer.to_bytes().unwrap())
            .await
            .unwrap();
        let bytes = persistence
            .load_range_state(newer.range_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(DurableRangeState::from_bytes(&bytes).unwrap(), newer);
    }

    #[tokio::test]
    async fn test_file_system_lists_only_state_files() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = FileSystemPersistence::new(temp_dir.path().join("nested"))
            .await
            .unwrap();

        persistence.save_range_state(RangeId::new(12), b"a").await.unwrap();
        persistence.save_range_state(RangeId::new(4), b"b").await.unwrap();
        tokio::fs::write(persistence.data_dir().join("notes.txt"), b"ignore me")
            .await
            .unwrap();

        assert_eq!(
            persistence.list_ranges().await.unwrap(),
            vec![RangeId::new(4), RangeId::new(12)]
        );
    }

    #[tokio::test]
    async fn test_corrupted_file_detected() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = FileSystemPersistence::new(temp_dir.path()).await.unwrap();
        let state = durable(1, 1);
        let mut bytes = state.to_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        persistence
            .save_range_state(state.range_id, &bytes)
            .await
            .unwrap();

        let loaded = persistence
            .load_range_state(state.range_id)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            DurableRangeState::from_bytes(&loaded),
            Err(LeaseError::ChecksumMismatch { .. })
        ));
    }
}
