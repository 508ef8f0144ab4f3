//! Hand-rolled RIFF/WAVE writer: 16-bit PCM, little-endian
//!
//! The header layout is a wire contract; every field is written byte-exact
//! rather than going through a codec crate.

use std::io::Write;

/// Write interleaved f32 samples as an uncompressed 16-bit PCM WAV file.
/// `samples.len()` must be a whole number of frames (`frames * channels`);
/// each sample is clamped to [-1, 1] and scaled to i16.
pub fn write_wav<W: Write>(
    writer: &mut W,
    samples: &[f32],
    sample_rate: u32,
    channels: u16,
) -> std::io::Result<()> {
    debug_assert!(channels > 0);
    debug_assert_eq!(samples.len() % channels as usize, 0);

    let data_len = (samples.len() * 2) as u32;
    let block_align = channels * 2;
    let byte_rate = sample_rate * block_align as u32;

    writer.write_all(b"RIFF")?;
    writer.write_all(&(36 + data_len).to_le_bytes())?;
    writer.write_all(b"WAVE")?;

    writer.write_all(b"fmt ")?;
    writer.write_all(&16u32.to_le_bytes())?; // fmt chunk size
    writer.write_all(&1u16.to_le_bytes())?; // PCM
    writer.write_all(&channels.to_le_bytes())?;
    writer.write_all(&sample_rate.to_le_bytes())?;
    writer.write_all(&byte_rate.to_le_bytes())?;
    writer.write_all(&block_align.to_le_bytes())?;
    writer.write_all(&16u16.to_le_bytes())?; // bits per sample

    writer.write_all(b"data")?;
    writer.write_all(&data_len.to_le_bytes())?;
    for &sample in samples {
        let scaled = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        writer.write_all(&scaled.to_le_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_u32(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
    }

    fn header_u16(bytes: &[u8], at: usize) -> u16 {
        u16::from_le_bytes(bytes[at..at + 2].try_into().unwrap())
    }

    #[test]
    fn test_header_is_byte_exact() {
        // 3 frames, 2 channels
        let samples = [0.0f32, 0.5, -0.5, 1.0, -1.0, 0.25];
        let mut out = Vec::new();
        write_wav(&mut out, &samples, 44_100, 2).unwrap();

        let data_len = 3 * 2 * 2; // frames * channels * 2
        assert_eq!(&out[0..4], b"RIFF");
        assert_eq!(header_u32(&out, 4), 36 + data_len);
        assert_eq!(&out[8..12], b"WAVE");
        assert_eq!(&out[12..16], b"fmt ");
        assert_eq!(header_u32(&out, 16), 16);
        assert_eq!(header_u16(&out, 20), 1); // PCM
        assert_eq!(header_u16(&out, 22), 2); // channels
        assert_eq!(header_u32(&out, 24), 44_100);
        assert_eq!(header_u32(&out, 28), 44_100 * 4); // byte rate
        assert_eq!(header_u16(&out, 32), 4); // block align
        assert_eq!(header_u16(&out, 34), 16); // bit depth
        assert_eq!(&out[36..40], b"data");
        assert_eq!(header_u32(&out, 40), data_len);
        assert_eq!(out.len(), 44 + data_len as usize);
    }

    #[test]
    fn test_samples_clamped_and_scaled() {
        let samples = [0.0f32, 1.0, -1.0, 2.0, -2.0];
        let mut out = Vec::new();
        write_wav(&mut out, &samples, 48_000, 1).unwrap();

        let pcm: Vec<i16> = out[44..]
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(pcm, vec![0, 32767, -32767, 32767, -32767]);
    }

    #[test]
    fn test_round_trips_through_independent_decoder() {
        let samples: Vec<f32> = (0..480)
            .map(|i| (i as f32 / 480.0 * std::f32::consts::TAU).sin() * 0.8)
            .collect();
        let mut out = Vec::new();
        write_wav(&mut out, &samples, 48_000, 1).unwrap();

        let mut reader = hound::WavReader::new(std::io::Cursor::new(out)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 48_000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, hound::SampleFormat::Int);

        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded.len(), samples.len());
        for (decoded, original) in decoded.iter().zip(&samples) {
            let expected = (original.clamp(-1.0, 1.0) * 32767.0) as i16;
            assert_eq!(*decoded, expected);
        }
    }
}
