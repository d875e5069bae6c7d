//! Bufferbloat orchestrator: a baseline ping phase, then a
//! loaded phase run concurrently with an external load generator, compared
//! via latency inflation into a letter grade, optional RPM, and a
//! qualitative video-call impact label.
//!
//! The orchestrator never owns the load generator itself — it is injected through [`LoadGenerator`], the same
//! collaborator seam [`crate::collaborators`] defines for STUN and rDNS.

use crate::collaborators::{LoadDirection, LoadGenerator};
use crate::error::Result;
use crate::ping::{ping, PingConfig, PingResponse};
use crate::socket::BindOptions;
use crate::stats;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpmBand {
    Excellent,
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCallImpact {
    None,
    Minor,
    Moderate,
    Severe,
}

/// One phase's latency summary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySample {
    pub count: u32,
    pub min: Option<Duration>,
    pub avg: Option<Duration>,
    pub max: Option<Duration>,
    pub p50: Option<Duration>,
    pub p95: Option<Duration>,
    pub p99: Option<Duration>,
    pub jitter: Option<Duration>,
}

#[derive(Debug, Clone, Copy)]
pub struct BufferbloatConfig {
    pub load_type: LoadDirection,
    pub baseline_duration: Duration,
    pub load_duration: Duration,
    pub parallel_streams: u8,
    pub ping_interval: Duration,
    pub calculate_rpm: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyInflation {
    pub absolute_ms: f64,
    pub percent: f64,
    pub p99_inflation_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RpmResult {
    pub idle_rpm: f64,
    pub working_rpm: f64,
    pub band: RpmBand,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BufferbloatResult {
    pub baseline: LatencySample,
    pub loaded: LatencySample,
    pub inflation: LatencyInflation,
    pub grade: Grade,
    pub rpm: Option<RpmResult>,
    pub video_call_impact: VideoCallImpact,
}

/// Runs a full bufferbloat test against `target`.
pub async fn test_bufferbloat(
    target: &str,
    config: &BufferbloatConfig,
    bind: &BindOptions,
    load_generator: &dyn LoadGenerator,
    cancellation: CancellationToken,
) -> Result<BufferbloatResult> {
    let baseline = run_ping_phase(target, config.baseline_duration, config.ping_interval, bind, cancellation.clone()).await?;

    let (loaded, ()) = tokio::join!(
        run_ping_phase(target, config.load_duration, config.ping_interval, bind, cancellation.clone()),
        load_generator.generate_load(config.load_type, config.parallel_streams, config.load_duration),
    );
    let loaded = loaded?;

    let inflation = compute_inflation(&baseline, &loaded);
    let grade = compute_grade(inflation.percent, inflation.absolute_ms);
    let rpm = config.calculate_rpm.then(|| compute_rpm(&baseline, &loaded)).flatten();
    let video_call_impact = compute_video_call_impact(&loaded);

    Ok(BufferbloatResult {
        baseline,
        loaded,
        inflation,
        grade,
        rpm,
        video_call_impact,
    })
}

async fn run_ping_phase(
    target: &str,
    duration: Duration,
    interval: Duration,
    bind: &BindOptions,
    cancellation: CancellationToken,
) -> Result<LatencySample> {
    let interval_secs = interval.as_secs_f64().max(0.001);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let count = ((duration.as_secs_f64() / interval_secs).floor().max(1.0)) as u32;
    let ping_config = PingConfig {
        count,
        interval,
        timeout: interval.max(Duration::from_millis(500)),
        payload_size: 0,
    };
    let result = ping(target, &ping_config, bind, cancellation).await?;
    Ok(summarize(&result.responses))
}

fn summarize(responses: &[PingResponse]) -> LatencySample {
    let mut rtts: Vec<Duration> = responses.iter().filter_map(|r| r.rtt).collect();
    rtts.sort();
    LatencySample {
        count: u32::try_from(rtts.len()).unwrap_or(u32::MAX),
        min: rtts.first().copied(),
        avg: stats::mean(&rtts),
        max: rtts.last().copied(),
        p50: stats::nearest_rank_percentile(&rtts, 50.0),
        p95: stats::nearest_rank_percentile(&rtts, 95.0),
        p99: stats::nearest_rank_percentile(&rtts, 99.0),
        jitter: if rtts.len() >= 2 { Some(stats::population_stddev(&rtts)) } else { None },
    }
}

fn ms(d: Option<Duration>) -> f64 {
    d.map_or(0.0, |d| d.as_secs_f64() * 1000.0)
}

/// `absolute_ms = loaded.p50 - baseline.p50`,
/// `percent = absolute / baseline.p50 * 100`, `p99_inflation = loaded.p99 -
/// baseline.p99`.
fn compute_inflation(baseline: &LatencySample, loaded: &LatencySample) -> LatencyInflation {
    let baseline_p50 = ms(baseline.p50);
    let absolute_ms = ms(loaded.p50) - baseline_p50;
    let percent = if baseline_p50 > 0.0 { absolute_ms / baseline_p50 * 100.0 } else { 0.0 };
    LatencyInflation {
        absolute_ms,
        percent,
        p99_inflation_ms: ms(loaded.p99) - ms(baseline.p99),
    }
}

/// Letter grade from latency inflation: stricter on percent increase at
/// small baselines, stricter on absolute increase at large ones.
fn compute_grade(percent: f64, absolute_ms: f64) -> Grade {
    if percent < 5.0 && absolute_ms < 5.0 {
        Grade::A
    } else if percent < 25.0 && absolute_ms < 30.0 {
        Grade::B
    } else if percent < 100.0 && absolute_ms < 100.0 {
        Grade::C
    } else if percent < 400.0 && absolute_ms < 300.0 {
        Grade::D
    } else {
        Grade::F
    }
}

/// `working_rpm = 60 / avg(loaded.rtt)`, `idle_rpm = 60 /
/// avg(baseline.rtt)`. `None` if either phase recorded no successful probe.
fn compute_rpm(baseline: &LatencySample, loaded: &LatencySample) -> Option<RpmResult> {
    let idle_avg = baseline.avg?.as_secs_f64();
    let working_avg = loaded.avg?.as_secs_f64();
    if idle_avg <= 0.0 || working_avg <= 0.0 {
        return None;
    }
    let working_rpm = 60.0 / working_avg;
    Some(RpmResult {
        idle_rpm: 60.0 / idle_avg,
        working_rpm,
        band: rpm_band(working_rpm),
    })
}

fn rpm_band(rpm: f64) -> RpmBand {
    if rpm >= 6000.0 {
        RpmBand::Excellent
    } else if rpm >= 1000.0 {
        RpmBand::Good
    } else if rpm >= 300.0 {
        RpmBand::Fair
    } else {
        RpmBand::Poor
    }
}

/// Qualitative label from `loaded.p95` and jitter, escalating past the
/// baseline "impacts video" thresholds (p95 ≥ 150ms or jitter ≥ 50ms) into
/// Moderate/Severe tiers at proportionally larger values.
fn compute_video_call_impact(loaded: &LatencySample) -> VideoCallImpact {
    let p95_ms = ms(loaded.p95);
    let jitter_ms = ms(loaded.jitter);
    if p95_ms >= 600.0 || jitter_ms >= 200.0 {
        VideoCallImpact::Severe
    } else if p95_ms >= 300.0 || jitter_ms >= 100.0 {
        VideoCallImpact::Moderate
    } else if p95_ms >= 150.0 || jitter_ms >= 50.0 {
        VideoCallImpact::Minor
    } else {
        VideoCallImpact::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(p50_ms: u64, p95_ms: u64, p99_ms: u64, jitter_ms: u64) -> LatencySample {
        LatencySample {
            count: 10,
            min: Some(Duration::from_millis(p50_ms)),
            avg: Some(Duration::from_millis(p50_ms)),
            max: Some(Duration::from_millis(p99_ms)),
            p50: Some(Duration::from_millis(p50_ms)),
            p95: Some(Duration::from_millis(p95_ms)),
            p99: Some(Duration::from_millis(p99_ms)),
            jitter: Some(Duration::from_millis(jitter_ms)),
        }
    }

    #[test]
    fn an_unloaded_network_grades_a() {
        let baseline = sample(10, 12, 15, 1);
        let loaded = sample(10, 12, 15, 1);
        let inflation = compute_inflation(&baseline, &loaded);
        assert_eq!(inflation.absolute_ms, 0.0);
        assert_eq!(compute_grade(inflation.percent, inflation.absolute_ms), Grade::A);
    }

    #[test]
    fn a_severely_bloated_link_grades_f() {
        let baseline = sample(10, 12, 15, 1);
        let loaded = sample(500, 800, 1000, 1);
        let inflation = compute_inflation(&baseline, &loaded);
        assert_eq!(compute_grade(inflation.percent, inflation.absolute_ms), Grade::F);
    }

    #[test]
    fn a_moderately_bloated_link_grades_c() {
        // +60ms on a 100ms baseline: 60% inflation, 60ms absolute -- both
        // inside the C band (<100%/<100ms) but outside B's (<25%/<30ms).
        let baseline = sample(100, 120, 150, 2);
        let loaded = sample(160, 190, 220, 2);
        let inflation = compute_inflation(&baseline, &loaded);
        assert_eq!(compute_grade(inflation.percent, inflation.absolute_ms), Grade::C);
    }

    #[test]
    fn rpm_band_thresholds_match_the_spec_table() {
        assert_eq!(rpm_band(6000.0), RpmBand::Excellent);
        assert_eq!(rpm_band(5999.0), RpmBand::Good);
        assert_eq!(rpm_band(1000.0), RpmBand::Good);
        assert_eq!(rpm_band(999.0), RpmBand::Fair);
        assert_eq!(rpm_band(300.0), RpmBand::Fair);
        assert_eq!(rpm_band(299.0), RpmBand::Poor);
    }

    #[test]
    fn rpm_is_none_when_a_phase_recorded_no_successful_probe() {
        let mut baseline = sample(10, 12, 15, 1);
        baseline.avg = None;
        let loaded = sample(10, 12, 15, 1);
        assert!(compute_rpm(&baseline, &loaded).is_none());
    }

    #[test]
    fn video_call_impact_escalates_with_p95_and_jitter() {
        assert_eq!(compute_video_call_impact(&sample(10, 20, 30, 5)), VideoCallImpact::None);
        assert_eq!(compute_video_call_impact(&sample(10, 160, 200, 5)), VideoCallImpact::Minor);
        assert_eq!(compute_video_call_impact(&sample(10, 320, 400, 5)), VideoCallImpact::Moderate);
        assert_eq!(compute_video_call_impact(&sample(10, 700, 900, 5)), VideoCallImpact::Severe);
    }

    #[test]
    fn summarize_computes_percentiles_min_max_and_jitter() {
        let responses: Vec<PingResponse> = [10u64, 20, 30, 20, 20]
            .into_iter()
            .enumerate()
            .map(|(i, ms)| PingResponse {
                sequence: crate::types::Sequence(i as u16 + 1),
                rtt: Some(Duration::from_millis(ms)),
                ttl: None,
                timestamp: std::time::Instant::now(),
            })
            .collect();
        let summary = summarize(&responses);
        assert_eq!(summary.count, 5);
        assert_eq!(summary.min, Some(Duration::from_millis(10)));
        assert_eq!(summary.max, Some(Duration::from_millis(30)));
        assert_eq!(summary.p50, Some(Duration::from_millis(20)));
        assert!(summary.jitter.is_some());
    }
}
