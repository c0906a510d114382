/// Debouncer taking N bytes of inputs (one bit per input) and debouncing over
/// a sample size of S: S consecutive equal samples have to be seen for an
/// input to change state.
///
/// Inputs are numbered bit-wise, input `i` lives in byte `i / 8`, bit `i % 8`.
pub struct Debouncer<const N: usize, const S: usize> {
    index: usize,
    samples: [[u8; N]; S],
    state: [u8; N],
    changed: [u8; N],
    active_low: bool,
}

impl<const N: usize, const S: usize> Debouncer<N, S> {
    /// Inputs idle high and read low when pressed.
    pub const fn active_low() -> Self {
        Self::with_idle(0xFF, true)
    }

    /// Inputs idle low and read high when pressed.
    pub const fn active_high() -> Self {
        Self::with_idle(0x00, false)
    }

    const fn with_idle(idle: u8, active_low: bool) -> Self {
        Self {
            index: 0,
            samples: [[idle; N]; S],
            state: [idle; N],
            changed: [0; N],
            active_low,
        }
    }

    /// Takes N bytes and returns the new state if any input changed.
    pub fn debounce(&mut self, sample: &[u8; N]) -> Option<[u8; N]> {
        self.samples[self.index] = *sample;
        self.index += 1;
        if self.index >= S {
            self.index = 0;
        }

        let mut all_high = [0xFF; N];
        let mut any_high = [0x00; N];
        for sample in self.samples.iter() {
            for (i, b) in sample.iter().enumerate() {
                all_high[i] &= b;
                any_high[i] |= b;
            }
        }

        let mut next = [0; N];
        for i in 0..N {
            next[i] = all_high[i] | (self.state[i] & any_high[i]);
            self.changed[i] = next[i] ^ self.state[i];
        }
        if next == self.state {
            return None;
        }
        self.state = next;
        Some(next)
    }

    pub fn changed(&self, index: usize) -> bool {
        self.changed[index >> 3] & (1 << (index % 8)) != 0
    }

    /// Debounced level of an input, `true` when pressed.
    pub fn is_active(&self, index: usize) -> bool {
        let high = self.state[index >> 3] & (1 << (index % 8)) != 0;
        high != self.active_low
    }

    /// Input went to its pressed level on the last [`Debouncer::debounce`].
    pub fn pressed(&self, index: usize) -> bool {
        self.changed(index) && self.is_active(index)
    }

    pub fn released(&self, index: usize) -> bool {
        self.changed(index) && !self.is_active(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_consecutive_samples() {
        let mut button = Debouncer::<1, 4>::active_high();
        for sample in [1, 0, 1, 1, 1] {
            assert_eq!(button.debounce(&[sample]), None);
        }
        assert_eq!(button.debounce(&[1]), Some([1]));
        assert!(button.pressed(0));
        assert!(button.is_active(0));

        assert_eq!(button.debounce(&[1]), None);
        assert!(!button.pressed(0));
    }

    #[test]
    fn release_is_debounced_too() {
        let mut button = Debouncer::<1, 3>::active_high();
        for _ in 0..3 {
            button.debounce(&[1]);
        }
        assert!(button.is_active(0));
        assert_eq!(button.debounce(&[0]), None);
        assert_eq!(button.debounce(&[0]), None);
        assert_eq!(button.debounce(&[0]), Some([0]));
        assert!(button.released(0));
    }

    #[test]
    fn active_low_inputs_are_independent() {
        let mut switches = Debouncer::<2, 2>::active_low();
        switches.debounce(&[0xFE, 0xFF]);
        assert_eq!(switches.debounce(&[0xFE, 0x7F]), Some([0xFE, 0xFF]));
        assert!(switches.pressed(0));
        assert!(!switches.changed(15));
        assert_eq!(switches.debounce(&[0xFF, 0x7F]), Some([0xFE, 0x7F]));
        assert!(switches.pressed(15));
        assert!(switches.is_active(0));
    }
}
