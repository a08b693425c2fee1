const BYTES_PER_SAMPLE: usize = 2;

/// Channel layout conversion of interleaved 16 bit PCM in native byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Remix {
    /// Stereo to mono.
    DownMix,
    /// Mono to stereo.
    UpMix,
    PassThrough { channels: usize },
}

impl Remix {
    pub fn new(input_channels: usize, output_channels: usize) -> Self {
        match input_channels.cmp(&output_channels) {
            std::cmp::Ordering::Greater => Remix::DownMix,
            std::cmp::Ordering::Less => Remix::UpMix,
            std::cmp::Ordering::Equal => Remix::PassThrough {
                channels: input_channels,
            },
        }
    }

    pub fn input_frame_size(self) -> usize {
        match self {
            Remix::DownMix => 2 * BYTES_PER_SAMPLE,
            Remix::UpMix => BYTES_PER_SAMPLE,
            Remix::PassThrough { channels } => channels * BYTES_PER_SAMPLE,
        }
    }

    pub fn output_frame_size(self) -> usize {
        match self {
            Remix::DownMix => BYTES_PER_SAMPLE,
            Remix::UpMix => 2 * BYTES_PER_SAMPLE,
            Remix::PassThrough { channels } => channels * BYTES_PER_SAMPLE,
        }
    }

    /// Bytes produced by remixing `input_len` bytes.
    pub fn output_len(self, input_len: usize) -> usize {
        input_len / self.input_frame_size() * self.output_frame_size()
    }

    /// Remixes as many whole frames as fit into both slices. Returns `(consumed, written)` bytes.
    pub fn remix(self, input: &[u8], output: &mut [u8]) -> (usize, usize) {
        let frames = usize::min(
            input.len() / self.input_frame_size(),
            output.len() / self.output_frame_size(),
        );
        let consumed = frames * self.input_frame_size();
        let written = frames * self.output_frame_size();
        let input = &input[..consumed];
        let output = &mut output[..written];

        match self {
            Remix::DownMix => {
                for (frame, out) in input.chunks_exact(4).zip(output.chunks_exact_mut(2)) {
                    let left = i16::from_ne_bytes([frame[0], frame[1]]);
                    let right = i16::from_ne_bytes([frame[2], frame[3]]);
                    out.copy_from_slice(&down_mix(left, right).to_ne_bytes());
                }
            }
            Remix::UpMix => {
                for (sample, out) in input.chunks_exact(2).zip(output.chunks_exact_mut(4)) {
                    out[..2].copy_from_slice(sample);
                    out[2..].copy_from_slice(sample);
                }
            }
            Remix::PassThrough { .. } => output.copy_from_slice(input),
        }
        (consumed, written)
    }
}

/// Mixes two signed samples without clipping artifacts by treating them as unsigned signals.
pub(crate) fn down_mix(left: i16, right: i16) -> i16 {
    let a = i64::from(left) + 32768;
    let b = i64::from(right) + 32768;
    let m = if a < 32768 || b < 32768 {
        a * b / 32768
    } else {
        2 * (a + b) - a * b / 32768 - 65535
    };
    (m.clamp(0, 65535) - 32768) as i16
}
