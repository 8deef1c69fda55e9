//! Log mel filterbank feature extraction.
//!
//! Turns a mono waveform into a fixed-width spectrogram: 25ms frames with
//! a 10ms shift, Hamming window, power spectrum via FFT, triangular mel
//! filterbank, natural log. All intermediate math runs in f64.

use std::f64::consts::PI;

/// Configures mel filterbank feature extraction.
///
/// Frame geometry is expressed in milliseconds so the same configuration
/// works for clips at any sample rate.
#[derive(Debug, Clone)]
pub struct FbankConfig {
    /// Number of mel filterbank channels (default: 40).
    pub num_mels: usize,
    /// Frame length in milliseconds (default: 25).
    pub frame_ms: f64,
    /// Frame shift in milliseconds (default: 10).
    pub shift_ms: f64,
    /// Pre-emphasis coefficient (default: 0.97).
    pub pre_emphasis: f64,
    /// Low cutoff frequency for the mel bins in Hz (default: 20).
    pub low_freq: f64,
    /// Gap between the Nyquist frequency and the high cutoff in Hz
    /// (default: 400, i.e. 7600 Hz at 16 kHz).
    pub high_freq_margin: f64,
    /// Floor applied to filterbank energies before the log (default: 1e-10).
    pub energy_floor: f64,
}

impl Default for FbankConfig {
    fn default() -> Self {
        Self {
            num_mels: 40,
            frame_ms: 25.0,
            shift_ms: 10.0,
            pre_emphasis: 0.97,
            low_freq: 20.0,
            high_freq_margin: 400.0,
            energy_floor: 1e-10,
        }
    }
}

/// Extracts log mel filterbank features from a mono f32 waveform.
///
/// Output is `[num_frames][num_mels]` log energies. Returns `None` when
/// the waveform is shorter than a single frame or the configuration is
/// degenerate.
pub fn compute_fbank(samples: &[f32], sample_rate: u32, cfg: &FbankConfig) -> Option<Vec<Vec<f32>>> {
    if sample_rate == 0 || cfg.num_mels == 0 || cfg.frame_ms <= 0.0 || cfg.shift_ms <= 0.0 {
        return None;
    }
    let frame_len = (sample_rate as f64 * cfg.frame_ms / 1000.0) as usize;
    let shift = (sample_rate as f64 * cfg.shift_ms / 1000.0) as usize;
    if frame_len == 0 || shift == 0 || samples.len() < frame_len {
        return None;
    }

    let num_frames = (samples.len() - frame_len) / shift + 1;
    let fft_size = frame_len.next_power_of_two();

    let window = hamming_window(frame_len);
    let high_freq = (sample_rate as f64 / 2.0 - cfg.high_freq_margin).max(cfg.low_freq + 1.0);
    let filterbank = mel_filterbank(cfg.num_mels, fft_size, sample_rate, cfg.low_freq, high_freq);

    let mut features = Vec::with_capacity(num_frames);
    let mut spectrum = vec![(0.0f64, 0.0f64); fft_size];

    for f in 0..num_frames {
        let offset = f * shift;
        let mut frame: Vec<f64> = samples[offset..offset + frame_len]
            .iter()
            .map(|&s| s as f64)
            .collect();

        // DC removal, then pre-emphasis back-to-front so each sample sees
        // its original predecessor.
        let mean = frame.iter().sum::<f64>() / frame_len as f64;
        for v in &mut frame {
            *v -= mean;
        }
        if cfg.pre_emphasis > 0.0 {
            for i in (1..frame_len).rev() {
                frame[i] -= cfg.pre_emphasis * frame[i - 1];
            }
            frame[0] *= 1.0 - cfg.pre_emphasis;
        }

        for (i, slot) in spectrum.iter_mut().enumerate() {
            *slot = if i < frame_len {
                (frame[i] * window[i], 0.0)
            } else {
                (0.0, 0.0)
            };
        }
        fft_in_place(&mut spectrum);

        let mut mel_frame = vec![0.0f32; cfg.num_mels];
        for (m, filter) in filterbank.iter().enumerate() {
            let mut energy = 0.0f64;
            for &(bin, weight) in filter {
                let (re, im) = spectrum[bin];
                energy += weight * (re * re + im * im);
            }
            mel_frame[m] = energy.max(cfg.energy_floor).ln() as f32;
        }
        features.push(mel_frame);
    }

    Some(features)
}

/// L2-normalizes a vector to unit length in place. A zero vector is left
/// unchanged.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f64 = v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt();
    if norm > 0.0 {
        let scale = (1.0 / norm) as f32;
        for x in v {
            *x *= scale;
        }
    }
}

fn hamming_window(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}

fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10.0f64.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filters as sparse `(bin, weight)` lists, one per mel
/// channel.
fn mel_filterbank(
    num_mels: usize,
    fft_size: usize,
    sample_rate: u32,
    low_freq: f64,
    high_freq: f64,
) -> Vec<Vec<(usize, f64)>> {
    let half_fft = fft_size / 2 + 1;
    let mel_low = hz_to_mel(low_freq);
    let mel_high = hz_to_mel(high_freq);
    let step = (mel_high - mel_low) / (num_mels + 1) as f64;

    // Edge bins for num_mels + 2 equally spaced mel points.
    let bins: Vec<usize> = (0..num_mels + 2)
        .map(|i| {
            let hz = mel_to_hz(mel_low + i as f64 * step);
            let bin = (hz * fft_size as f64 / sample_rate as f64).floor() as isize;
            bin.clamp(0, half_fft as isize - 1) as usize
        })
        .collect();

    (0..num_mels)
        .map(|m| {
            let (left, center, right) = (bins[m], bins[m + 1], bins[m + 2]);
            let mut filter = Vec::new();
            for k in left..=right.min(half_fft - 1) {
                let weight = if k <= center {
                    if center == left {
                        1.0
                    } else {
                        (k - left) as f64 / (center - left) as f64
                    }
                } else if right == center {
                    1.0
                } else {
                    (right - k) as f64 / (right - center) as f64
                };
                if weight > 0.0 {
                    filter.push((k, weight));
                }
            }
            filter
        })
        .collect()
}

/// Iterative radix-2 Cooley-Tukey FFT over `(re, im)` pairs.
/// The input length must be a power of two.
fn fft_in_place(x: &mut [(f64, f64)]) {
    let n = x.len();
    if n <= 1 {
        return;
    }

    // Bit-reversal reordering.
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j ^= bit;
        if i < j {
            x.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let angle = -2.0 * PI / len as f64;
        let (w_re, w_im) = (angle.cos(), angle.sin());
        for start in (0..n).step_by(len) {
            let (mut cur_re, mut cur_im) = (1.0f64, 0.0f64);
            for k in 0..len / 2 {
                let (a_re, a_im) = x[start + k];
                let (b_re, b_im) = x[start + k + len / 2];
                let t_re = b_re * cur_re - b_im * cur_im;
                let t_im = b_re * cur_im + b_im * cur_re;
                x[start + k] = (a_re + t_re, a_im + t_im);
                x[start + k + len / 2] = (a_re - t_re, a_im - t_im);
                let next_re = cur_re * w_re - cur_im * w_im;
                cur_im = cur_re * w_im + cur_im * w_re;
                cur_re = next_re;
            }
        }
        len <<= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f64, rate: u32, secs: f64) -> Vec<f32> {
        let n = (rate as f64 * secs) as usize;
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / rate as f64).sin() as f32 * 0.5)
            .collect()
    }

    #[test]
    fn too_short_input_returns_none() {
        let cfg = FbankConfig::default();
        // 25ms at 16kHz needs 400 samples.
        assert!(compute_fbank(&[0.0; 399], 16_000, &cfg).is_none());
        assert!(compute_fbank(&[], 16_000, &cfg).is_none());
    }

    #[test]
    fn frame_count_matches_geometry() {
        let cfg = FbankConfig::default();
        // 1s at 16kHz: (16000 - 400) / 160 + 1 = 98 frames.
        let feats = compute_fbank(&vec![0.1; 16_000], 16_000, &cfg).unwrap();
        assert_eq!(feats.len(), 98);
        assert_eq!(feats[0].len(), cfg.num_mels);
    }

    #[test]
    fn output_is_finite() {
        let cfg = FbankConfig::default();
        let feats = compute_fbank(&tone(440.0, 16_000, 0.5), 16_000, &cfg).unwrap();
        for frame in &feats {
            for &v in frame {
                assert!(v.is_finite());
            }
        }
    }

    #[test]
    fn distinct_tones_have_distinct_spectra() {
        let cfg = FbankConfig::default();
        let low = compute_fbank(&tone(200.0, 16_000, 0.2), 16_000, &cfg).unwrap();
        let high = compute_fbank(&tone(3000.0, 16_000, 0.2), 16_000, &cfg).unwrap();
        assert_ne!(low[0], high[0]);
    }

    #[test]
    fn works_at_other_sample_rates() {
        let cfg = FbankConfig::default();
        let feats = compute_fbank(&tone(440.0, 8_000, 0.5), 8_000, &cfg).unwrap();
        assert_eq!(feats[0].len(), cfg.num_mels);
    }

    #[test]
    fn degenerate_config_returns_none() {
        let cfg = FbankConfig {
            num_mels: 0,
            ..FbankConfig::default()
        };
        assert!(compute_fbank(&[0.0; 16_000], 16_000, &cfg).is_none());
    }

    #[test]
    fn l2_normalize_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_zero_vector_is_stable() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn fft_of_impulse_is_flat() {
        let mut x = vec![(0.0, 0.0); 8];
        x[0] = (1.0, 0.0);
        fft_in_place(&mut x);
        for &(re, im) in &x {
            assert!((re - 1.0).abs() < 1e-9);
            assert!(im.abs() < 1e-9);
        }
    }
}
