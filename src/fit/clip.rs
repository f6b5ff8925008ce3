//! Local → original clip index translation.
//!
//! After iteration `k` has removed some rows, the next fit only sees the
//! survivors, so the outliers it reports are positions in that shrunken view.
//! To exclude them from the *unclipped* data we have to map each one back.
//!
//! Local index `j` is the `j`-th surviving row. Walking the already-removed
//! original indices in ascending order, every removed index at or below the
//! running position pushes it one step further:
//!
//! ```text
//! prior = {2, 5}, N0 = 10      survivors: 0 1 3 4 6 7 8 9
//! local 2 → pos 2, 2 <= 2 → 3, 5 > 3 stop → original 3
//! local 4 → pos 4, 2 <= 4 → 5, 5 <= 5 → 6 → original 6
//! ```

use crate::domain::{ClipRecord, CumulativeClip, LocalIndex, OriginalIndex};
use crate::error::{AppError, IndexFrame};

/// Merge a local-frame outlier set into the cumulative original-frame clip.
///
/// `new_local` must index the dataset left after removing `prior` from an
/// original dataset of `n_original` rows. Duplicates are collapsed.
/// An empty `new_local` returns `prior` unchanged.
pub fn translate_clips(
    prior: &CumulativeClip,
    new_local: &[LocalIndex],
    n_original: usize,
) -> Result<CumulativeClip, AppError> {
    prior.check_bounds(n_original)?;
    let n_local = n_original - prior.len();

    let mut local: Vec<LocalIndex> = new_local.to_vec();
    local.sort_unstable();
    local.dedup();

    if let Some(last) = local.last() {
        if last.get() >= n_local {
            return Err(AppError::IndexOutOfBounds {
                frame: IndexFrame::Local,
                index: last.get(),
                len: n_local,
            });
        }
    }

    let removed = prior.indices();
    let mut merged: Vec<OriginalIndex> = removed.to_vec();
    merged.reserve(local.len());

    // Both sequences ascend, so the cursor into `removed` only moves forward.
    let mut cursor = 0;
    let mut shift = 0;
    for j in local {
        while cursor < removed.len() && removed[cursor].get() <= j.get() + shift {
            shift += 1;
            cursor += 1;
        }
        merged.push(OriginalIndex::new(j.get() + shift));
    }

    Ok(CumulativeClip::from_original(merged))
}

impl ClipRecord {
    /// Fold the whole history from an empty clip set.
    pub fn replay(&self, n_original: usize) -> Result<CumulativeClip, AppError> {
        self.iterations()
            .iter()
            .try_fold(CumulativeClip::empty(), |acc, local| {
                translate_clips(&acc, local, n_original)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(v: &[usize]) -> Vec<LocalIndex> {
        v.iter().copied().map(LocalIndex::new).collect()
    }

    fn clip(v: &[usize]) -> CumulativeClip {
        CumulativeClip::from_original(v.iter().copied().map(OriginalIndex::new).collect())
    }

    #[test]
    fn empty_prior_keeps_local_indices() {
        let out = translate_clips(&CumulativeClip::empty(), &local(&[5, 2]), 10).unwrap();
        assert_eq!(out, clip(&[2, 5]));
    }

    #[test]
    fn empty_new_set_returns_prior() {
        let prior = clip(&[2, 5]);
        let out = translate_clips(&prior, &[], 10).unwrap();
        assert_eq!(out, prior);
    }

    #[test]
    fn second_stage_skips_removed_rows() {
        let prior = clip(&[2, 5]);
        // survivors: 0 1 3 4 6 7 8 9
        assert_eq!(translate_clips(&prior, &local(&[1]), 10).unwrap(), clip(&[1, 2, 5]));
        assert_eq!(translate_clips(&prior, &local(&[2]), 10).unwrap(), clip(&[2, 3, 5]));
        assert_eq!(translate_clips(&prior, &local(&[4]), 10).unwrap(), clip(&[2, 5, 6]));
        assert_eq!(
            translate_clips(&prior, &local(&[0, 7]), 10).unwrap(),
            clip(&[0, 2, 5, 9])
        );
    }

    #[test]
    fn duplicate_local_indices_collapse() {
        let prior = clip(&[2, 5]);
        let out = translate_clips(&prior, &local(&[4, 1, 4, 1]), 10).unwrap();
        assert_eq!(out, clip(&[1, 2, 5, 6]));
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn shift_accounts_for_adjacent_removed_rows() {
        // survivors: 0 4 5; local 1 must hop over 1, 2 and 3.
        let prior = clip(&[1, 2, 3]);
        assert_eq!(translate_clips(&prior, &local(&[1]), 6).unwrap(), clip(&[1, 2, 3, 4]));
    }

    #[test]
    fn out_of_bounds_local_index_fails() {
        let prior = clip(&[2, 5]);
        let err = translate_clips(&prior, &local(&[8]), 10).unwrap_err();
        assert_eq!(
            err,
            AppError::IndexOutOfBounds {
                frame: IndexFrame::Local,
                index: 8,
                len: 8
            }
        );
    }

    #[test]
    fn out_of_bounds_prior_fails() {
        let err = translate_clips(&clip(&[12]), &local(&[0]), 10).unwrap_err();
        assert!(matches!(
            err,
            AppError::IndexOutOfBounds {
                frame: IndexFrame::Original,
                ..
            }
        ));
    }

    #[test]
    fn replay_matches_three_stage_history() {
        let mut record = ClipRecord::default();
        record.push(local(&[2, 5])); // removes 2, 5
        record.push(local(&[2])); // survivors 0 1 3 4 6 ... → 3
        record.push(local(&[0, 3])); // survivors 0 1 4 6 7 8 9 → 0, 6
        assert_eq!(record.replay(10).unwrap(), clip(&[0, 2, 3, 5, 6]));
    }
}
