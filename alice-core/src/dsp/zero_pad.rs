//! Stage 6 of the Waveform Builder: head/tail zero padding.

use num_complex::Complex64;

pub fn zero_pad(x: &[Complex64], head: usize, tail: usize) -> Vec<Complex64> {
    let mut out = Vec::with_capacity(head + x.len() + tail);
    out.extend(std::iter::repeat(Complex64::new(0.0, 0.0)).take(head));
    out.extend_from_slice(x);
    out.extend(std::iter::repeat(Complex64::new(0.0, 0.0)).take(tail));
    out
}
