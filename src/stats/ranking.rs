//! Standard competition ranking ("1224").

/// Rank values descending. Equal values share a rank; the next distinct
/// value ranks at its 1-based position. `None` values get no rank.
pub fn competition_ranks(values: &[Option<i64>]) -> Vec<Option<u32>> {
    let mut order: Vec<(usize, i64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i, v)))
        .collect();
    order.sort_by(|a, b| b.1.cmp(&a.1));

    let mut ranks = vec![None; values.len()];
    let mut previous: Option<(i64, u32)> = None;

    for (position, (index, value)) in order.into_iter().enumerate() {
        let rank = match previous {
            Some((prev_value, prev_rank)) if prev_value == value => prev_rank,
            _ => position as u32 + 1,
        };
        ranks[index] = Some(rank);
        previous = Some((value, rank));
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ties_share_rank() {
        let ranks = competition_ranks(&[Some(1800), Some(1600), Some(1600), Some(1400)]);
        assert_eq!(ranks, vec![Some(1), Some(2), Some(2), Some(4)]);
    }

    #[test]
    fn test_input_order_irrelevant() {
        let ranks = competition_ranks(&[Some(1400), Some(1600), Some(1800), Some(1600)]);
        assert_eq!(ranks, vec![Some(4), Some(2), Some(1), Some(2)]);
    }

    #[test]
    fn test_missing_values_unranked() {
        let ranks = competition_ranks(&[None, Some(1500), None, Some(1500), Some(1700)]);
        assert_eq!(ranks, vec![None, Some(2), None, Some(2), Some(1)]);
        assert!(competition_ranks(&[]).is_empty());
    }
}
