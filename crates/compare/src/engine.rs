//! Pairwise comparison engine.
//!
//! Scoring is set-based and cheap: the shared unique hashes divided by the
//! larger unique count, a containment-style Jaccard variant that a padded
//! submission cannot dilute. Region extraction is the expensive half and is
//! bounded by `max_pair_work`; when the bound trips, the score is still
//! exact and the result is marked truncated.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use fingerprint::{Fingerprint, FingerprintSet};

use crate::types::{CompareConfig, CompareError, MatchRegion, SimilarityResult};

/// One side's fingerprints flattened into indexable file lists.
struct Side<'a> {
    files: Vec<(&'a str, &'a [Fingerprint])>,
    /// hash -> (file index, fingerprint index) occurrences, file-ordered.
    occurrences: HashMap<u64, Vec<(u32, u32)>>,
    unique: HashSet<u64>,
}

impl<'a> Side<'a> {
    fn build(set: &'a FingerprintSet) -> Self {
        let files: Vec<(&str, &[Fingerprint])> = set
            .files
            .iter()
            .map(|(path, fps)| (path.as_str(), fps.as_slice()))
            .collect();
        let mut occurrences: HashMap<u64, Vec<(u32, u32)>> = HashMap::new();
        let mut unique = HashSet::new();
        for (file_idx, (_, fps)) in files.iter().enumerate() {
            for (fp_idx, fp) in fps.iter().enumerate() {
                occurrences
                    .entry(fp.hash)
                    .or_default()
                    .push((file_idx as u32, fp_idx as u32));
                unique.insert(fp.hash);
            }
        }
        Self {
            files,
            occurrences,
            unique,
        }
    }

    fn fingerprints(&self, file: u32) -> &'a [Fingerprint] {
        self.files[file as usize].1
    }

    fn path(&self, file: u32) -> &'a str {
        self.files[file as usize].0
    }
}

/// A run of consecutive shared fingerprints, still in fingerprint-index
/// coordinates; converted to byte spans only after dedup.
#[derive(Debug, Clone, Copy)]
struct Run {
    file_a: u32,
    a_first: u32,
    a_last: u32,
    file_b: u32,
    b_first: u32,
    b_last: u32,
    /// Covered token count: pos distance plus one k-gram.
    token_len: u32,
}

/// Compare two fingerprint sets of the same assignment step.
///
/// The result is canonical: `submission_a` is the lexicographically smaller
/// id and swapping the arguments produces an identical payload.
pub fn compare(
    a: &FingerprintSet,
    b: &FingerprintSet,
    cfg: &CompareConfig,
    compared_at: DateTime<Utc>,
) -> Result<SimilarityResult, CompareError> {
    cfg.validate()?;
    if a.step_id != b.step_id {
        return Err(CompareError::StepMismatch {
            a: a.step_id.clone(),
            b: b.step_id.clone(),
        });
    }

    let (first, second) = if a.submission_id <= b.submission_id {
        (a, b)
    } else {
        (b, a)
    };

    let side_a = Side::build(first);
    let side_b = Side::build(second);

    let unique_a = side_a.unique.len();
    let unique_b = side_b.unique.len();
    let mut shared: Vec<u64> = side_a
        .unique
        .intersection(&side_b.unique)
        .copied()
        .collect();
    shared.sort_unstable();

    let denominator = unique_a.max(unique_b);
    let score = if denominator == 0 {
        0.0
    } else {
        shared.len() as f64 / denominator as f64
    };
    let low_confidence =
        unique_a < cfg.low_confidence_floor || unique_b < cfg.low_confidence_floor;

    let k = first.k.max(1);
    let (runs, truncated) = extract_runs(&side_a, &side_b, &shared, k, cfg.max_pair_work);
    let kept = dedup_runs(runs);

    let mut regions: Vec<MatchRegion> = kept
        .into_iter()
        .map(|run| {
            let fps_a = side_a.fingerprints(run.file_a);
            let fps_b = side_b.fingerprints(run.file_b);
            MatchRegion {
                hash: fps_a[run.a_first as usize].hash,
                file_a: side_a.path(run.file_a).to_string(),
                start_a: fps_a[run.a_first as usize].start,
                end_a: fps_a[run.a_last as usize].end,
                file_b: side_b.path(run.file_b).to_string(),
                start_b: fps_b[run.b_first as usize].start,
                end_b: fps_b[run.b_last as usize].end,
                token_len: run.token_len,
            }
        })
        .collect();
    regions.sort_by(|x, y| {
        (x.file_a.as_str(), x.start_a, x.file_b.as_str(), x.start_b).cmp(&(
            y.file_a.as_str(),
            y.start_a,
            y.file_b.as_str(),
            y.start_b,
        ))
    });

    Ok(SimilarityResult {
        submission_a: first.submission_id.clone(),
        submission_b: second.submission_id.clone(),
        step_id: first.step_id.clone(),
        score,
        regions,
        truncated,
        low_confidence,
        compared_at,
    })
}

/// Walk every shared-occurrence pair forward into maximal runs.
///
/// A run only starts where the preceding fingerprints do not also match,
/// so each maximal run is emitted exactly once; interior pairs are marked
/// visited to keep the pass O(M).
fn extract_runs(
    side_a: &Side<'_>,
    side_b: &Side<'_>,
    shared: &[u64],
    k: u32,
    max_pair_work: u64,
) -> (Vec<Run>, bool) {
    let mut visited: HashSet<(u32, u32, u32, u32)> = HashSet::new();
    let mut runs = Vec::new();
    let mut work = 0u64;
    let mut truncated = false;

    'outer: for h in shared {
        let occ_a = &side_a.occurrences[h];
        let occ_b = &side_b.occurrences[h];
        for &(fa, ia) in occ_a {
            for &(fb, ib) in occ_b {
                work += 1;
                if work > max_pair_work {
                    truncated = true;
                    break 'outer;
                }
                if visited.contains(&(fa, ia, fb, ib)) {
                    continue;
                }
                let fps_a = side_a.fingerprints(fa);
                let fps_b = side_b.fingerprints(fb);
                // Not a run start: the previous pair already matches.
                if ia > 0
                    && ib > 0
                    && fps_a[ia as usize - 1].hash == fps_b[ib as usize - 1].hash
                {
                    continue;
                }
                let mut len = 0u32;
                loop {
                    visited.insert((fa, ia + len, fb, ib + len));
                    let na = (ia + len + 1) as usize;
                    let nb = (ib + len + 1) as usize;
                    if na < fps_a.len() && nb < fps_b.len() && fps_a[na].hash == fps_b[nb].hash {
                        len += 1;
                        work += 1;
                        if work > max_pair_work {
                            truncated = true;
                            break;
                        }
                    } else {
                        break;
                    }
                }
                let a_last = ia + len;
                let b_last = ib + len;
                let token_len =
                    fps_a[a_last as usize].pos - fps_a[ia as usize].pos + k;
                runs.push(Run {
                    file_a: fa,
                    a_first: ia,
                    a_last,
                    file_b: fb,
                    b_first: ib,
                    b_last,
                    token_len,
                });
                if truncated {
                    break 'outer;
                }
            }
        }
    }

    (runs, truncated)
}

/// Drop runs that heavily overlap an already-kept longer run on either
/// side. Longest runs win; ties fall to the smaller A position, then B.
fn dedup_runs(mut runs: Vec<Run>) -> Vec<Run> {
    runs.sort_by(|x, y| {
        y.token_len
            .cmp(&x.token_len)
            .then(x.file_a.cmp(&y.file_a))
            .then(x.a_first.cmp(&y.a_first))
            .then(x.b_first.cmp(&y.b_first))
    });

    let mut kept: Vec<Run> = Vec::new();
    for run in runs {
        let redundant = kept.iter().any(|prev| {
            overlaps_heavily(
                prev.file_a,
                prev.a_first,
                prev.a_last,
                run.file_a,
                run.a_first,
                run.a_last,
            ) || overlaps_heavily(
                prev.file_b,
                prev.b_first,
                prev.b_last,
                run.file_b,
                run.b_first,
                run.b_last,
            )
        });
        if !redundant {
            kept.push(run);
        }
    }
    kept
}

/// True when two fingerprint-index ranges in the same file overlap by more
/// than half of the shorter range.
fn overlaps_heavily(
    file_x: u32,
    x_first: u32,
    x_last: u32,
    file_y: u32,
    y_first: u32,
    y_last: u32,
) -> bool {
    if file_x != file_y {
        return false;
    }
    let start = x_first.max(y_first);
    let end = x_last.min(y_last);
    if end < start {
        return false;
    }
    let overlap = end - start + 1;
    let shorter = (x_last - x_first + 1).min(y_last - y_first + 1);
    overlap * 2 > shorter
}
