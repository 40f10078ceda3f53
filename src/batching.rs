use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("batch size must be greater than zero")]
    ZeroBatchSize,
}

/// Split `input` into contiguous, order-preserving batches of at most `batch_size` items.
///
/// The final batch holds the remainder and may be smaller. An empty input yields
/// no batches at all, never a single empty batch.
pub fn split_to_batches<T>(input: &[T], batch_size: usize) -> Result<Vec<&[T]>, BatchError> {
    if batch_size == 0 {
        return Err(BatchError::ZeroBatchSize);
    }

    Ok(input.chunks(batch_size).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: usize,
        label: String,
    }

    fn items(count: usize) -> Vec<Item> {
        (0..count)
            .map(|i| Item {
                id: i,
                label: format!("test {}", i),
            })
            .collect()
    }

    #[test]
    fn test_split_even_batches() {
        let data = items(100);
        let batches = split_to_batches(&data, 25).expect("Should split");

        assert_eq!(batches.len(), 4);
        assert!(batches.iter().all(|b| b.len() == 25));
    }

    #[test]
    fn test_split_leaves_remainder_in_last_batch() {
        let data = items(100);
        let batches = split_to_batches(&data, 35).expect("Should split");

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 35);
        assert_eq!(batches[1].len(), 35);
        assert_eq!(batches[2].len(), 30, "leftover data not correct");
        assert_eq!(batches[2][0].id, 70);
    }

    #[test]
    fn test_split_empty_input_yields_no_batches() {
        let data: Vec<Item> = Vec::new();
        let batches = split_to_batches(&data, 10).expect("Should split");
        assert!(batches.is_empty());
    }

    #[test]
    fn test_split_batch_larger_than_input() {
        let data = items(3);
        let batches = split_to_batches(&data, 10).expect("Should split");
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], &data[..]);
    }

    #[test]
    fn test_split_zero_batch_size_fails_fast() {
        let data = items(3);
        assert_eq!(split_to_batches(&data, 0), Err(BatchError::ZeroBatchSize));

        let empty: Vec<Item> = Vec::new();
        assert_eq!(split_to_batches(&empty, 0), Err(BatchError::ZeroBatchSize));
    }

    proptest! {
        #[test]
        fn prop_batches_concatenate_to_input(xs in proptest::collection::vec(any::<u32>(), 0..200), n in 1usize..50) {
            let batches = split_to_batches(&xs, n).unwrap();
            let joined: Vec<u32> = batches.iter().flat_map(|b| b.iter().copied()).collect();
            prop_assert_eq!(joined, xs);
        }

        #[test]
        fn prop_batch_sizes(xs in proptest::collection::vec(any::<u8>(), 0..200), n in 1usize..50) {
            let batches = split_to_batches(&xs, n).unwrap();

            if xs.is_empty() {
                prop_assert!(batches.is_empty());
            } else {
                let (last, full) = batches.split_last().unwrap();
                prop_assert!(full.iter().all(|b| b.len() == n));
                let expected_last = if xs.len() % n == 0 { n } else { xs.len() % n };
                prop_assert_eq!(last.len(), expected_last);
                prop_assert_eq!(batches.len(), xs.len().div_ceil(n));
            }
        }
    }
}
