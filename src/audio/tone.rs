use std::f32::consts::TAU;

/// Fixed-frequency sine oscillator
#[derive(Debug, Clone)]
pub struct SineSource {
    phase: f32,
    step: f32,
    amplitude: f32,
}

impl SineSource {
    pub fn new(frequency: f32, sample_rate: u32, amplitude: f32) -> Self {
        Self {
            phase: 0.0,
            step: TAU * frequency / sample_rate as f32,
            amplitude,
        }
    }

    pub fn fill(&mut self, block: &mut [f32]) {
        for sample in block.iter_mut() {
            *sample = self.phase.sin() * self.amplitude;
            self.phase += self.step;
            if self.phase >= TAU {
                self.phase -= TAU;
            }
        }
    }
}
