//! Video and audio filter expressions for the encoder.
//!
//! Speed changes are applied to both streams: `setpts` rescales frame
//! timestamps, and a chain of `atempo` filters changes audio speed without
//! shifting pitch. A single `atempo` only accepts multipliers in
//! `[0.5, 2.0]`, so other speeds are decomposed into several steps whose
//! product is the requested velocity.

use crate::options::TranscodeOptions;

pub const TEMPO_MIN: f64 = 0.5;
pub const TEMPO_MAX: f64 = 2.0;

/// Ordered filter expressions for one job. `audio` is empty when playback
/// speed is unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub video: Vec<String>,
    pub audio: Vec<String>,
}

impl FilterSpec {
    pub fn from_options(options: &TranscodeOptions) -> Self {
        let mut video = vec![format!(
            "scale={}:{}",
            options.resolution.width, options.resolution.height
        )];
        if options.velocity != 1.0 {
            video.push(format!("setpts={:.2}*PTS", round2(1.0 / options.velocity)));
        }

        FilterSpec {
            video,
            audio: tempo_expressions(options.velocity),
        }
    }

    pub fn video_filter(&self) -> String {
        self.video.join(",")
    }

    pub fn audio_filter(&self) -> String {
        self.audio.join(",")
    }
}

pub fn build_video_filter(options: &TranscodeOptions) -> String {
    FilterSpec::from_options(options).video_filter()
}

/// Comma-joined `atempo` chain for `velocity`, or an empty string when no
/// tempo change is needed.
pub fn build_audio_filter(velocity: f64) -> String {
    tempo_expressions(velocity).join(",")
}

fn tempo_expressions(velocity: f64) -> Vec<String> {
    tempo_chain(velocity)
        .into_iter()
        .map(|step| format!("atempo={}", format_step(step)))
        .collect()
}

/// Decomposes `velocity` into tempo multipliers within `[0.5, 2.0]`.
///
/// Whole factors of 2.0 (or 0.5) come first; the remainder is appended last,
/// rounded to two decimals. Intermediate remainders are never rounded, and a
/// remainder that rounds to 1.00 is dropped rather than emitted as a no-op.
pub fn tempo_chain(velocity: f64) -> Vec<f64> {
    let mut steps = Vec::new();
    if velocity == 1.0 {
        return steps;
    }

    let mut remaining = velocity;
    while remaining > TEMPO_MAX {
        steps.push(TEMPO_MAX);
        remaining /= TEMPO_MAX;
    }
    while remaining < TEMPO_MIN {
        steps.push(TEMPO_MIN);
        remaining /= TEMPO_MIN;
    }

    let last = round2(remaining);
    if last != 1.0 {
        steps.push(last);
    }
    steps
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// Whole factors render as "2.0"/"0.5", remainders with two decimals.
fn format_step(step: f64) -> String {
    if step == TEMPO_MAX || step == TEMPO_MIN {
        format!("{:.1}", step)
    } else {
        format!("{:.2}", step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::TranscodeConfig;

    fn options(resolution: &str, velocity: f64) -> TranscodeOptions {
        TranscodeConfig {
            resolution: resolution.to_string(),
            velocity,
            ..Default::default()
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn unchanged_speed_has_no_tempo_or_pts() {
        assert!(tempo_chain(1.0).is_empty());
        assert_eq!(build_audio_filter(1.0), "");
        let spec = FilterSpec::from_options(&options("1920x1080", 1.0));
        assert_eq!(spec.video, vec!["scale=1920:1080".to_string()]);
        assert!(spec.audio.is_empty());
    }

    #[test]
    fn scale_comes_first() {
        let filter = build_video_filter(&options("1920x1080", 2.0));
        assert!(filter.starts_with("scale=1920:1080"));
        assert_eq!(filter, "scale=1920:1080,setpts=0.50*PTS");
    }

    #[test]
    fn pts_multiplier_is_rounded() {
        assert_eq!(build_video_filter(&options("640x360", 3.0)), "scale=640:360,setpts=0.33*PTS");
        assert_eq!(build_video_filter(&options("640x360", 0.25)), "scale=640:360,setpts=4.00*PTS");
        // Halfway values round up, like the tempo remainder.
        assert_eq!(build_video_filter(&options("640x360", 8.0)), "scale=640:360,setpts=0.13*PTS");
        assert_eq!(build_video_filter(&options("640x360", 1.6)), "scale=640:360,setpts=0.63*PTS");
    }

    #[test]
    fn decomposes_fast_speeds() {
        assert_eq!(tempo_chain(3.0), vec![2.0, 1.5]);
        assert_eq!(build_audio_filter(3.0), "atempo=2.0,atempo=1.50");
    }

    #[test]
    fn decomposes_slow_speeds() {
        assert_eq!(tempo_chain(0.2), vec![0.5, 0.4]);
        assert_eq!(build_audio_filter(0.2), "atempo=0.5,atempo=0.40");
    }

    #[test]
    fn range_edges_need_no_decomposition() {
        assert_eq!(tempo_chain(2.0), vec![2.0]);
        assert_eq!(tempo_chain(0.5), vec![0.5]);
        assert_eq!(tempo_chain(1.25), vec![1.25]);
    }

    #[test]
    fn powers_of_two_stay_exact() {
        assert_eq!(tempo_chain(4.0), vec![2.0, 2.0]);
        assert_eq!(tempo_chain(8.0), vec![2.0, 2.0, 2.0]);
        assert_eq!(tempo_chain(0.25), vec![0.5, 0.5]);
    }

    #[test]
    fn near_boundary_has_no_trailing_unit_step() {
        assert_eq!(tempo_chain(4.000001), vec![2.0, 2.0]);
        assert_eq!(tempo_chain(0.2499999), vec![0.5, 0.5]);
        assert_eq!(build_audio_filter(4.000001), "atempo=2.0,atempo=2.0");
    }

    #[test]
    fn chain_product_and_bounds() {
        let mut v = 0.05;
        while v <= 4.0 {
            let chain = tempo_chain(v);
            let product: f64 = chain.iter().product();
            assert!((product - v).abs() <= 0.02, "velocity {} gave {:?}", v, chain);
            assert!(chain.iter().all(|s| (TEMPO_MIN..=TEMPO_MAX).contains(s)), "{:?}", chain);
            v += 0.01;
        }
    }

    #[test]
    fn large_speeds_stay_within_rounding_budget() {
        // The remainder's rounding error is multiplied by every whole factor
        // before it, so the error grows with speed; bound it relatively.
        for v in [5.0, 10.0, 33.3, 64.0, 99.9] {
            let chain = tempo_chain(v);
            let product: f64 = chain.iter().product();
            assert!((product - v).abs() / v <= 0.005, "velocity {} gave {:?}", v, chain);
            assert!(chain.iter().all(|s| (TEMPO_MIN..=TEMPO_MAX).contains(s)));
        }
    }

    #[test]
    fn builders_are_pure() {
        let opts = options("854x480", 0.75);
        assert_eq!(FilterSpec::from_options(&opts), FilterSpec::from_options(&opts));
        assert_eq!(build_audio_filter(0.75), build_audio_filter(0.75));
    }
}
