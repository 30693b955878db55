// Quadrature decoding of the two gear-motor Hall sensors.
//
// The sensors produce a 4-phase cycle, two Hall-1 edges per motor revolution.
// Phase encoding: phase = sensor_index + 2 * (1 - level), giving
//   upward travel   S1^ S2^ S1v S2v  ->  0, 1, 2, 3, 0, ...
//   downward travel S2^ S1^ S2v S1v  ->  1, 0, 3, 2, 1, ...
// A phase step of +1 (mod 4) is therefore an Up edge, +3 a Down edge and +2 a
// reversal seen mid-cycle, which carries no usable displacement.

/// Which Hall sensor produced an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HallInput {
    Hall1 = 0,
    Hall2 = 1,
}

/// Direction of travel derived from a phase step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Up,
    Down,
}

/// Edge decoder state plus the counters the stall and speed logic feed on.
pub struct QuadratureDecoder {
    /// Last decoded phase (0-3), -1 until the first edge after reset.
    rotor_position: i8,
    hall_1_ticks: u32,
    hall_2_ticks: u32,
    /// Milliseconds since the last Hall-1 edge, advanced by the 1 ms tick.
    hall_1_idle_ms: u32,
    /// Last measured Hall-1 inter-edge gap; 0 until two edges have been seen.
    hall_1_interval_ms: u32,
    /// Edges dropped because they contradicted the commanded direction.
    dir_error: u16,
}

impl QuadratureDecoder {
    pub const fn new() -> Self {
        Self {
            rotor_position: -1,
            hall_1_ticks: 0,
            hall_2_ticks: 0,
            hall_1_idle_ms: 0,
            hall_1_interval_ms: 0,
            dir_error: 0,
        }
    }

    /// Decode one sensor edge into a sensed direction.
    ///
    /// Returns `None` for the first edge after reset (no reference phase yet)
    /// and for a phase step of 2 (reversal, no displacement attributable).
    /// Hall-1 tick and interval bookkeeping happens for every edge, accepted
    /// or not.
    pub fn decode(&mut self, sensor: HallInput, level: bool) -> Option<Sense> {
        match sensor {
            HallInput::Hall1 => {
                self.hall_1_ticks += 1;
                if self.hall_1_ticks > 1 {
                    self.hall_1_interval_ms = self.hall_1_idle_ms;
                }
                self.hall_1_idle_ms = 0;
            }
            HallInput::Hall2 => self.hall_2_ticks += 1,
        }

        let new_phase = sensor as i8 + 2 * (1 - level as i8);
        if self.rotor_position < 0 {
            self.rotor_position = new_phase;
            return None;
        }

        let diff = (new_phase - self.rotor_position).rem_euclid(4);
        self.rotor_position = new_phase;

        match diff {
            1 => Some(Sense::Up),
            3 => Some(Sense::Down),
            _ => None,
        }
    }

    /// Record an edge whose sense contradicted the commanded direction.
    pub fn note_direction_error(&mut self) {
        self.dir_error = self.dir_error.wrapping_add(1);
    }

    /// 1 ms tick while the motor is energized.
    pub fn idle_tick(&mut self) {
        self.hall_1_idle_ms = self.hall_1_idle_ms.saturating_add(1);
    }

    /// Clear the per-movement counters. The phase memory survives so the next
    /// movement starts from a known rotor position.
    pub fn reset_counters(&mut self) {
        self.hall_1_ticks = 0;
        self.hall_2_ticks = 0;
        self.hall_1_idle_ms = 0;
        self.hall_1_interval_ms = 0;
    }

    pub fn rotor_position(&self) -> i8 {
        self.rotor_position
    }

    pub fn hall_1_ticks(&self) -> u32 {
        self.hall_1_ticks
    }

    pub fn hall_2_ticks(&self) -> u32 {
        self.hall_2_ticks
    }

    pub fn hall_1_idle_ms(&self) -> u32 {
        self.hall_1_idle_ms
    }

    pub fn hall_1_interval_ms(&self) -> u32 {
        self.hall_1_interval_ms
    }

    pub fn dir_error(&self) -> u16 {
        self.dir_error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(d: &mut QuadratureDecoder, sensor: HallInput, level: u8) -> Option<Sense> {
        d.decode(sensor, level != 0)
    }

    #[test]
    fn first_edge_sets_phase_without_sense() {
        let mut d = QuadratureDecoder::new();
        assert_eq!(d.rotor_position(), -1);
        assert_eq!(edge(&mut d, HallInput::Hall1, 1), None);
        assert_eq!(d.rotor_position(), 0);
    }

    #[test]
    fn upward_phase_walk() {
        let mut d = QuadratureDecoder::new();
        // S1^ S2^ S1v S2v = phases 0 1 2 3
        edge(&mut d, HallInput::Hall1, 1);
        assert_eq!(edge(&mut d, HallInput::Hall2, 1), Some(Sense::Up));
        assert_eq!(edge(&mut d, HallInput::Hall1, 0), Some(Sense::Up));
        assert_eq!(edge(&mut d, HallInput::Hall2, 0), Some(Sense::Up));
        assert_eq!(edge(&mut d, HallInput::Hall1, 1), Some(Sense::Up));
    }

    #[test]
    fn downward_phase_walk() {
        let mut d = QuadratureDecoder::new();
        // S2^ S1^ S2v S1v = phases 1 0 3 2
        edge(&mut d, HallInput::Hall2, 1);
        assert_eq!(edge(&mut d, HallInput::Hall1, 1), Some(Sense::Down));
        assert_eq!(edge(&mut d, HallInput::Hall2, 0), Some(Sense::Down));
        assert_eq!(edge(&mut d, HallInput::Hall1, 0), Some(Sense::Down));
        assert_eq!(edge(&mut d, HallInput::Hall2, 1), Some(Sense::Down));
    }

    #[test]
    fn phase_skip_is_not_a_displacement() {
        let mut d = QuadratureDecoder::new();
        edge(&mut d, HallInput::Hall1, 1); // phase 0
        // phase 2 is a +2 step: reversal, no delta
        assert_eq!(edge(&mut d, HallInput::Hall1, 0), None);
        // but the new phase is remembered
        assert_eq!(d.rotor_position(), 2);
    }

    #[test]
    fn interval_needs_two_hall1_edges() {
        let mut d = QuadratureDecoder::new();
        edge(&mut d, HallInput::Hall1, 1);
        for _ in 0..7 {
            d.idle_tick();
        }
        assert_eq!(d.hall_1_interval_ms(), 0);
        edge(&mut d, HallInput::Hall2, 1);
        assert_eq!(d.hall_1_interval_ms(), 0); // Hall-2 does not latch
        edge(&mut d, HallInput::Hall1, 0);
        assert_eq!(d.hall_1_interval_ms(), 7);
        assert_eq!(d.hall_1_idle_ms(), 0);
    }

    #[test]
    fn hall2_only_counts() {
        let mut d = QuadratureDecoder::new();
        edge(&mut d, HallInput::Hall2, 1);
        edge(&mut d, HallInput::Hall2, 0);
        assert_eq!(d.hall_2_ticks(), 2);
        assert_eq!(d.hall_1_ticks(), 0);
    }

    #[test]
    fn reset_keeps_phase_memory() {
        let mut d = QuadratureDecoder::new();
        edge(&mut d, HallInput::Hall1, 1);
        edge(&mut d, HallInput::Hall2, 1);
        d.reset_counters();
        assert_eq!(d.hall_1_ticks(), 0);
        assert_eq!(d.hall_1_interval_ms(), 0);
        assert_eq!(d.rotor_position(), 1);
        // the next edge decodes against the retained phase
        assert_eq!(edge(&mut d, HallInput::Hall1, 0), Some(Sense::Up));
    }
}
