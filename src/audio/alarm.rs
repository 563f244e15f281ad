use rodio::Source;
use std::f32::consts::PI;
use std::time::Duration;

const SAMPLE_RATE: u32 = 44100;
const TONE_SECS: f32 = 0.22;
const GAP_SECS: f32 = 0.08;
const REPEATS: u32 = 3;

/// Phase-completion chime: three short two-tone beeps (A5 then E6),
/// synthesized so no asset file ships with the binary.
pub struct AlarmChime {
    sample_rate: u32,
    num_sample: usize,
    total_samples: usize,
}

impl AlarmChime {
    pub fn new() -> Self {
        let cycle = TONE_SECS * 2.0 + GAP_SECS;
        let total_samples = (cycle * REPEATS as f32 * SAMPLE_RATE as f32) as usize;
        Self {
            sample_rate: SAMPLE_RATE,
            num_sample: 0,
            total_samples,
        }
    }
}

impl Default for AlarmChime {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for AlarmChime {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.num_sample >= self.total_samples {
            return None;
        }

        let t = self.num_sample as f32 / self.sample_rate as f32;
        self.num_sample += 1;

        let cycle = TONE_SECS * 2.0 + GAP_SECS;
        let t_in_cycle = t % cycle;

        let (freq, t_in_tone) = if t_in_cycle < TONE_SECS {
            (880.0, t_in_cycle)
        } else if t_in_cycle < TONE_SECS * 2.0 {
            (1318.5, t_in_cycle - TONE_SECS)
        } else {
            return Some(0.0);
        };

        // Short attack/release envelope keeps the beeps from clicking.
        let envelope = (t_in_tone / 0.01).min(1.0) * ((TONE_SECS - t_in_tone) / 0.01).min(1.0);
        let sample = (2.0 * PI * freq * t).sin();

        Some(sample * envelope * 0.2)
    }
}

impl Source for AlarmChime {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f32(
            (TONE_SECS * 2.0 + GAP_SECS) * REPEATS as f32,
        ))
    }
}
