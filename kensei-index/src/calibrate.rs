//! # Search Parameter Calibration
//!
//! Tunes `search_window_size` against labeled validation data until a target
//! recall is met or a probe budget runs out.
//!
//! Algorithm: exponential growth of the window (capacity kept equal) until
//! the target recall is reached, then a binary search for the smallest
//! window that still meets it. Recall is assumed monotone in the window
//! size, which holds because a search with a smaller window is (almost
//! always) a prefix of the same search with a larger one.
//!
//! Budget exhaustion is reported in the outcome, never raised as an error;
//! the best parameters found so far are still returned.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use kensei_core::error::Result;

use crate::search::SearchParameters;

/// Windows at or above this size benefit from the visited-set filter
const VISITED_SET_WINDOW_THRESHOLD: usize = 128;

/// Bounds on the calibration loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationParameters {
    /// Largest window size the probe will try
    pub search_window_size_upper: usize,
    /// Maximum number of recall evaluations
    pub max_probes: usize,
}

impl Default for CalibrationParameters {
    fn default() -> Self {
        Self {
            search_window_size_upper: 1000,
            max_probes: 64,
        }
    }
}

/// What calibration found
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationOutcome {
    /// Best parameters found (already applied to the index by the caller)
    pub parameters: SearchParameters,
    /// Recall measured with those parameters
    pub achieved_recall: f32,
    /// False when the probe budget or window bound ran out first
    pub target_met: bool,
    /// Recall evaluations spent
    pub probes_used: usize,
}

/// Mean recall@k of row-major search results against row-major ground
/// truth. Both slices hold `rows` rows; result rows are `k` wide and ground
/// truth rows `gt_width` wide (only the first `k` entries of each count).
pub fn recall_at_k(
    result_ids: &[u64],
    groundtruth_ids: &[u64],
    rows: usize,
    k: usize,
    gt_width: usize,
) -> f32 {
    if rows == 0 || k == 0 {
        return 0.0;
    }
    let mut hits = 0usize;
    for row in 0..rows {
        let results = &result_ids[row * k..(row + 1) * k];
        let truth = &groundtruth_ids[row * gt_width..row * gt_width + k.min(gt_width)];
        hits += results.iter().filter(|id| truth.contains(id)).count();
    }
    hits as f32 / (rows * k.min(gt_width)) as f32
}

/// The probe loop, generic over how recall is measured. `probe` runs one
/// search pass with the given parameters and returns the measured recall.
pub(crate) fn run_calibration<F>(
    calibration: &CalibrationParameters,
    k: usize,
    target_recall: f32,
    mut probe: F,
) -> Result<CalibrationOutcome>
where
    F: FnMut(&SearchParameters) -> Result<f32>,
{
    let floor = k.max(1);
    let upper = calibration.search_window_size_upper.max(floor);
    let budget = calibration.max_probes.max(1);

    let mut probes_used = 0usize;
    let mut best: Option<(SearchParameters, f32)> = None;

    let mut run_probe = |window: usize,
                         probes_used: &mut usize,
                         best: &mut Option<(SearchParameters, f32)>|
     -> Result<f32> {
        let params = SearchParameters {
            search_window_size: window,
            search_buffer_capacity: window,
            visited_set_enabled: window >= VISITED_SET_WINDOW_THRESHOLD,
        };
        let recall = probe(&params)?;
        *probes_used += 1;
        debug!(window, recall, "calibration probe");
        let better = match best {
            Some((current, current_recall)) => {
                // A target-meeting probe with a smaller window wins;
                // otherwise higher recall wins.
                if *current_recall >= target_recall {
                    recall >= target_recall && window < current.search_window_size
                } else {
                    recall > *current_recall
                }
            }
            None => true,
        };
        if better {
            *best = Some((params, recall));
        }
        Ok(recall)
    };

    // Phase 1: exponential growth until the target is met
    let mut window = floor;
    let mut last_failed = None;
    let mut first_success = None;
    loop {
        let recall = run_probe(window, &mut probes_used, &mut best)?;
        if recall >= target_recall {
            first_success = Some(window);
            break;
        }
        last_failed = Some(window);
        if window >= upper || probes_used >= budget {
            break;
        }
        window = (window * 2).min(upper);
    }

    // Phase 2: binary search for the smallest window meeting the target
    if let Some(success) = first_success {
        let mut lo = last_failed.map_or(floor, |w| w + 1);
        let mut hi = success;
        while lo < hi && probes_used < budget {
            let mid = lo + (hi - lo) / 2;
            let recall = run_probe(mid, &mut probes_used, &mut best)?;
            if recall >= target_recall {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
    }

    let (parameters, achieved_recall) = best.ok_or_else(|| kensei_core::Error::Internal {
        message: "calibration ran zero probes".to_string(),
    })?;
    let target_met = achieved_recall >= target_recall;
    if !target_met {
        warn!(
            target_recall,
            achieved_recall,
            probes_used,
            "calibration budget exhausted before reaching target; returning best found"
        );
    }
    Ok(CalibrationOutcome {
        parameters,
        achieved_recall,
        target_met,
        probes_used,
    })
}
