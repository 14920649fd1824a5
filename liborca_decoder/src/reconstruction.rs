//! Presum correction for multirate digitizer waveforms
//!
//! When multirate readout is enabled the digitizer records the baseline and the flat top
//! as sums of `multirate_sum` samples scaled down by `multirate_div`, and only the rising
//! edge at the full sampling rate. The stored waveform therefore changes both its
//! amplitude scale and its sample spacing twice. The expected transition points follow
//! from the channel's prerecord, postrecord and flat top counts, but the firmware does not
//! always honor them exactly, so we look for the steps the rescaling leaves in the trace.
use ndarray::{s, Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use super::channel_table::{ChannelTable, ChannelTimingConfig};
use super::constants::{
    BASELINE_SEARCH_MARGIN, DEFAULT_EDGE_KERNEL_LENGTH, DEFAULT_SAMPLE_PERIOD_NS,
    DEFAULT_WAVEFORM_LENGTH, FLAT_TOP_SEARCH_MARGIN,
};
use super::decoders::DecodedEvent;
use super::error::ReconstructionError;

/// How far a detected boundary may sit from the expected index and still be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToleranceBand {
    pub below: usize,
    pub above: usize,
}

impl ToleranceBand {
    pub fn new(below: usize, above: usize) -> Self {
        Self { below, above }
    }

    pub fn symmetric(width: usize) -> Self {
        Self::new(width, width)
    }

    pub fn contains(&self, expected: usize, detected: usize) -> bool {
        detected + self.below >= expected && detected <= expected + self.above
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructionParams {
    pub sample_period_ns: f64,
    /// Number of samples kept, counted back from the end of the waveform
    pub wf_length: usize,
    pub kernel_length: usize,
    pub baseline_tolerance: ToleranceBand,
    pub flat_top_tolerance: ToleranceBand,
}

impl Default for ReconstructionParams {
    fn default() -> Self {
        Self {
            sample_period_ns: DEFAULT_SAMPLE_PERIOD_NS,
            wf_length: DEFAULT_WAVEFORM_LENGTH,
            kernel_length: DEFAULT_EDGE_KERNEL_LENGTH,
            baseline_tolerance: ToleranceBand::new(4, 0),
            flat_top_tolerance: ToleranceBand::new(2, 0),
        }
    }
}

/// Whether a boundary came from the trace or from the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundarySource {
    Detected,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructedWaveform {
    /// Sample times in ns, relative to the first sample of the full waveform
    pub times: Array1<f64>,
    pub values: Array1<f64>,
    /// Index in the full waveform of the first sample kept
    pub window_start: usize,
    pub idx_baseline_end: usize,
    pub idx_flat_top_start: usize,
    pub baseline_source: BoundarySource,
    pub flat_top_source: BoundarySource,
}

/// Response of the waveform to a step kernel of `kernel_length`.
///
/// The trace is padded with its first and last sample by one kernel length on each side.
/// `response[i]` is the sum of the half kernel of samples starting at `i` less the sum of
/// the half kernel before `i`, so a step between `i - 1` and `i` peaks at `i`.
pub fn edge_response(
    waveform: &Array1<f64>,
    kernel_length: usize,
) -> Result<Array1<f64>, ReconstructionError> {
    if kernel_length == 0 || kernel_length % 2 != 0 {
        return Err(ReconstructionError::InvalidKernel(kernel_length));
    }
    let length = waveform.len();
    if length == 0 {
        return Err(ReconstructionError::EmptyWaveform);
    }
    let half = kernel_length / 2;
    let first = waveform[0];
    let last = waveform[length - 1];

    // Running sum over the padded trace
    let mut cumulative = Vec::with_capacity(length + 2 * kernel_length + 1);
    cumulative.push(0.0);
    let mut total = 0.0;
    let padded = std::iter::repeat(first)
        .take(kernel_length)
        .chain(waveform.iter().copied())
        .chain(std::iter::repeat(last).take(kernel_length));
    for value in padded {
        total += value;
        cumulative.push(total);
    }

    Ok(Array1::from_iter((0..length).map(|idx| {
        let p = idx + kernel_length;
        (cumulative[p + half] - cumulative[p]) - (cumulative[p] - cumulative[p - half])
    })))
}

/// First index of the largest absolute value
fn argmax_abs(values: ArrayView1<f64>) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (idx, value) in values.iter().enumerate() {
        if value.abs() > best_value {
            best = idx;
            best_value = value.abs();
        }
    }
    best
}

/// Locate the end of the baseline and the start of the flat top
pub fn find_boundaries(
    waveform: &Array1<f64>,
    timing: &ChannelTimingConfig,
    params: &ReconstructionParams,
) -> Result<((usize, BoundarySource), (usize, BoundarySource)), ReconstructionError> {
    let length = waveform.len();
    if length == 0 {
        return Err(ReconstructionError::EmptyWaveform);
    }
    let counts = timing.prerecord_count + timing.postrecord_count + timing.flat_top_count;
    if counts >= length {
        return Err(ReconstructionError::CountsExceedWaveform { counts, length });
    }
    let baseline_expected = length - counts;
    let flat_top_expected = length - timing.flat_top_count - 1;

    let response = edge_response(waveform, params.kernel_length)?;

    let baseline_stop = (baseline_expected + BASELINE_SEARCH_MARGIN).min(length);
    let baseline_detected = argmax_abs(response.slice(s![..baseline_stop]));
    let baseline = if params
        .baseline_tolerance
        .contains(baseline_expected, baseline_detected)
    {
        (baseline_detected, BoundarySource::Detected)
    } else {
        spdlog::trace!(
            "Baseline edge found at {baseline_detected}, expected {baseline_expected}; using expected"
        );
        (baseline_expected, BoundarySource::Fallback)
    };

    let flat_top_search = flat_top_expected.saturating_sub(FLAT_TOP_SEARCH_MARGIN);
    let flat_top_detected = flat_top_search + argmax_abs(response.slice(s![flat_top_search..]));
    let flat_top = if params
        .flat_top_tolerance
        .contains(flat_top_expected, flat_top_detected)
    {
        (flat_top_detected, BoundarySource::Detected)
    } else {
        spdlog::trace!(
            "Flat top edge found at {flat_top_detected}, expected {flat_top_expected}; using expected"
        );
        (flat_top_expected, BoundarySource::Fallback)
    };

    Ok((baseline, flat_top))
}

/// Rescale the presummed regions of a waveform and build its time axis
pub fn reconstruct(
    waveform: &[i16],
    timing: &ChannelTimingConfig,
    params: &ReconstructionParams,
) -> Result<ReconstructedWaveform, ReconstructionError> {
    let mut values: Array1<f64> = waveform.iter().map(|v| *v as f64).collect();
    let length = values.len();
    let ((baseline_end, baseline_source), (flat_top_start, flat_top_source)) =
        find_boundaries(&values, timing, params)?;
    let flat_top_start = flat_top_start.max(baseline_end);

    let ratio = timing.presum_ratio();
    values
        .slice_mut(s![..baseline_end])
        .mapv_inplace(|v| v / ratio);
    values
        .slice_mut(s![flat_top_start..])
        .mapv_inplace(|v| v / ratio);

    // Full rate spacing up to the flat top, then one presummed step per sample
    let period = params.sample_period_ns;
    let presum_period = period * timing.multirate_sum as f64;
    let last_full_rate = (flat_top_start as f64 - 1.0) * period;
    let times: Array1<f64> = (0..length)
        .map(|idx| {
            if idx < flat_top_start {
                idx as f64 * period
            } else {
                last_full_rate
                    + 0.5 * presum_period
                    + (idx - flat_top_start) as f64 * presum_period
            }
        })
        .collect();

    let window_start = length.saturating_sub(params.wf_length);
    Ok(ReconstructedWaveform {
        times: times.slice(s![window_start..]).to_owned(),
        values: values.slice(s![window_start..]).to_owned(),
        window_start,
        idx_baseline_end: baseline_end,
        idx_flat_top_start: flat_top_start,
        baseline_source,
        flat_top_source,
    })
}

/// Reconstruct a decoded event using its channel's timing configuration
pub fn reconstruct_event(
    event: &DecodedEvent,
    table: &ChannelTable,
    params: &ReconstructionParams,
) -> Result<ReconstructedWaveform, ReconstructionError> {
    let timing = table
        .get_timing(&event.channel)
        .ok_or(ReconstructionError::MissingChannelConfig(event.channel.raw()))?;
    reconstruct(&event.waveform, &timing, params)
}
