//! Processing kernels run by the worker once per wake cycle

/// A block-to-block sample mapping.
///
/// Called on the worker thread with `input` and `output` of equal length
/// (the negotiated kernel length). Implementations must not allocate.
pub trait Kernel: Send {
    fn process(&mut self, input: &[f32], output: &mut [f32]);
}

/// Any per-sample function is a kernel
impl<F> Kernel for F
where
    F: FnMut(f32) -> f32 + Send,
{
    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        for (y, &x) in output.iter_mut().zip(input) {
            *y = self(x);
        }
    }
}

/// Copies input to output unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Kernel for Passthrough {
    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        output.copy_from_slice(input);
    }
}

/// Piecewise soft-clipping waveshaper
///
/// Below 1/3 the signal is doubled, between 1/3 and 2/3 it follows a
/// quadratic knee, above that it passes through. Odd-symmetric.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overdrive;

impl Overdrive {
    #[inline]
    pub fn shape(x: f32) -> f32 {
        let a = x.abs();
        if a < 1.0 / 3.0 {
            2.0 * x
        } else if a < 2.0 / 3.0 {
            let t = 2.0 - 3.0 * a;
            ((3.0 - t * t) / 3.0).copysign(x)
        } else {
            x
        }
    }
}

impl Kernel for Overdrive {
    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        for (y, &x) in output.iter_mut().zip(input) {
            *y = Self::shape(x);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_overdrive_reference_points() {
        assert!(approx(Overdrive::shape(0.2), 0.4));
        assert!(approx(Overdrive::shape(0.5), 0.9167));
        assert!(approx(Overdrive::shape(0.9), 0.9));
        assert_eq!(Overdrive::shape(0.0), 0.0);
    }

    #[test]
    fn test_overdrive_is_odd_symmetric() {
        for x in [0.1_f32, 0.3, 0.4, 0.6, 0.8, 1.0] {
            assert!(approx(Overdrive::shape(-x), -Overdrive::shape(x)));
        }
    }

    #[test]
    fn test_overdrive_knee_is_continuous_at_one_third() {
        let below = Overdrive::shape(1.0 / 3.0 - 1e-6);
        let above = Overdrive::shape(1.0 / 3.0);
        assert!(approx(below, above));
    }

    #[test]
    fn test_block_processing() {
        let input = [0.2, -0.5, 0.9];
        let mut output = [0.0; 3];
        Overdrive.process(&input, &mut output);
        assert!(approx(output[0], 0.4));
        assert!(approx(output[1], -0.9167));
        assert!(approx(output[2], 0.9));

        Passthrough.process(&input, &mut output);
        assert_eq!(output, input);
    }

    #[test]
    fn test_closure_kernel() {
        let mut gain = |x: f32| x * 0.5;
        let mut output = [0.0; 2];
        gain.process(&[1.0, -1.0], &mut output);
        assert_eq!(output, [0.5, -0.5]);
    }
}
