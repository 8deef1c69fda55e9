//! WAV file read/write on top of hound.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::{AudioError, Clip};

/// Reads a WAV file into a [`Clip`].
///
/// Integer samples of any supported bit depth are normalized to `[-1, 1]`;
/// float samples are passed through. The clip keeps the file's sample rate
/// and channel count.
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<Clip, AudioError> {
    let reader = WavReader::open(path).map_err(|e| AudioError::Wav(e.to_string()))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| AudioError::Wav(e.to_string()))?,
        SampleFormat::Int => {
            let scale = ((1i64 << (spec.bits_per_sample - 1)) - 1) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| AudioError::Wav(e.to_string()))?
        }
    };

    Ok(Clip::new(samples, spec.sample_rate, spec.channels))
}

/// Writes a clip as 16-bit integer PCM. Samples outside `[-1, 1]` are
/// clamped.
pub fn write_wav<P: AsRef<Path>>(path: P, clip: &Clip) -> Result<(), AudioError> {
    let spec = WavSpec {
        channels: clip.channels(),
        sample_rate: clip.sample_rate(),
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).map_err(|e| AudioError::Wav(e.to_string()))?;
    for &sample in clip.samples() {
        let v = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(v)
            .map_err(|e| AudioError::Wav(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| AudioError::Wav(e.to_string()))?;
    Ok(())
}
