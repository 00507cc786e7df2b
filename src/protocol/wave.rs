use serde::{Deserialize, Serialize};

/// A single output frame: pulse frequency parameters `x` (5 bits) and `y` (10 bits), and pulse
/// width `z` (5 bits).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WaveFrame {
    pub x: u8,
    pub y: u16,
    pub z: u8,
}

impl WaveFrame {
    pub const fn new(x: u8, y: u16, z: u8) -> Self {
        WaveFrame { x, y, z }
    }

    pub fn encode(&self) -> [u8; 3] {
        let value = u32::from(self.z & 0x1F) << 15
            | u32::from(self.y & 0x3FF) << 5
            | u32::from(self.x & 0x1F);

        [
            (value & 0xFF) as u8,
            ((value >> 8) & 0xFF) as u8,
            ((value >> 16) & 0xFF) as u8,
        ]
    }
}

/// A looping sequence of steps. A `None` step is a rest: nothing is sent for that tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavePattern {
    pub name: String,
    pub steps: Vec<Option<WaveFrame>>,
}

impl WavePattern {
    pub fn new(name: impl Into<String>, steps: Vec<Option<WaveFrame>>) -> Self {
        WavePattern { name: name.into(), steps }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BasicWave {
    Breath,
    Tide,
    Batter,
    Pinch,
}

impl BasicWave {
    pub const ALL: [BasicWave; 4] = [
        BasicWave::Breath,
        BasicWave::Tide,
        BasicWave::Batter,
        BasicWave::Pinch,
    ];

    pub fn pattern(&self) -> WavePattern {
        let f = |x, y, z| Some(WaveFrame::new(x, y, z));

        let steps = match self {
            BasicWave::Breath => vec![
                f(1, 9, 4), f(1, 9, 8), f(1, 9, 12), f(1, 9, 16), f(1, 9, 18),
                f(1, 9, 19), f(1, 9, 20), f(1, 9, 0), f(1, 9, 0), f(1, 9, 0),
            ],
            BasicWave::Tide => vec![
                f(1, 9, 4), f(2, 16, 8), f(2, 18, 12), f(3, 20, 16), f(4, 22, 20),
                f(3, 20, 16), f(2, 18, 12), f(2, 16, 8),
            ],
            BasicWave::Batter => vec![
                f(1, 9, 20), None, None, f(1, 9, 20), None, None, None,
            ],
            BasicWave::Pinch => vec![
                f(1, 9, 20), f(1, 9, 20), f(1, 9, 0), f(1, 9, 0), None,
            ],
        };

        WavePattern::new(self.to_string(), steps)
    }
}

impl std::fmt::Display for BasicWave {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            BasicWave::Breath => "Breath",
            BasicWave::Tide => "Tide",
            BasicWave::Batter => "Batter",
            BasicWave::Pinch => "Pinch",
        };

        write!(f, "{}", result)
    }
}

/// Wave generator for a single channel.
#[derive(Debug, Default)]
pub struct WaveCenter {
    pattern: Option<WavePattern>,
    cursor: usize,
}

impl WaveCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `pattern`, or stops output if `None`. Whatever was in progress is cleared first,
    /// so the next tick always belongs to the new pattern.
    pub fn select(&mut self, pattern: Option<WavePattern>) {
        self.pattern = None;
        self.cursor = 0;
        self.pattern = pattern;
    }

    pub fn selected(&self) -> Option<&WavePattern> {
        self.pattern.as_ref()
    }

    /// Returns the next encoded frame, if this tick has one.
    pub fn tick(&mut self) -> Option<[u8; 3]> {
        let pattern = self.pattern.as_ref()?;
        if pattern.steps.is_empty() {
            return None;
        }

        let step = pattern.steps[self.cursor % pattern.steps.len()];
        self.cursor = (self.cursor + 1) % pattern.steps.len();
        step.map(|frame| frame.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_layout() {
        // z = 1 => bit 15
        assert_eq!(WaveFrame::new(0, 0, 1).encode(), [0x00, 0x80, 0x00]);
        // y = 1 => bit 5
        assert_eq!(WaveFrame::new(0, 1, 0).encode(), [0x20, 0x00, 0x00]);
        assert_eq!(WaveFrame::new(1, 0, 0).encode(), [0x01, 0x00, 0x00]);
    }

    #[test]
    fn no_pattern_no_frames() {
        let mut center = WaveCenter::new();
        assert_eq!(center.tick(), None);
    }

    #[test]
    fn rest_steps_produce_no_frame() {
        let mut center = WaveCenter::new();
        center.select(Some(BasicWave::Batter.pattern()));

        assert!(center.tick().is_some());
        assert_eq!(center.tick(), None);
        assert_eq!(center.tick(), None);
        assert!(center.tick().is_some());
    }

    #[test]
    fn pattern_loops() {
        let pattern = WavePattern::new("two", vec![
            Some(WaveFrame::new(1, 1, 1)),
            Some(WaveFrame::new(2, 2, 2)),
        ]);
        let mut center = WaveCenter::new();
        center.select(Some(pattern));

        let first = center.tick();
        center.tick();
        assert_eq!(center.tick(), first);
    }

    #[test]
    fn selecting_never_leaks_frames_of_the_previous_pattern() {
        let old = WavePattern::new("old", vec![
            Some(WaveFrame::new(1, 1, 1)),
            Some(WaveFrame::new(2, 2, 2)),
            Some(WaveFrame::new(3, 3, 3)),
        ]);
        let new = WavePattern::new("new", vec![Some(WaveFrame::new(31, 1000, 31))]);

        let mut center = WaveCenter::new();
        center.select(Some(old));
        center.tick();

        center.select(Some(new));
        assert_eq!(center.tick(), Some(WaveFrame::new(31, 1000, 31).encode()));
        assert_eq!(center.selected().map(|p| p.name.as_str()), Some("new"));
    }

    #[test]
    fn deselect_stops_output() {
        let mut center = WaveCenter::new();
        center.select(Some(BasicWave::Breath.pattern()));
        center.select(None);
        assert_eq!(center.tick(), None);
    }

    #[test]
    fn basic_wave_names() {
        for wave in BasicWave::ALL {
            assert_eq!(wave.pattern().name, wave.to_string());
            assert!(!wave.pattern().steps.is_empty());
        }
    }
}
