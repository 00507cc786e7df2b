/**
 * Highest strength level a channel accepts.
 */
pub const MAX_STRENGTH: u16 = 274;

/**
 * One strength level corresponds to this many raw units on the wire.
 */
const STRENGTH_STEP: u32 = 7;

const RAW_MASK: u32 = 0x7FF; // 11 bits per channel

fn pack_u24(value: u32) -> [u8; 3] {
    // the device expects the least significant byte first
    [
        (value & 0xFF) as u8,
        ((value >> 8) & 0xFF) as u8,
        ((value >> 16) & 0xFF) as u8,
    ]
}

fn unpack_u24(data: &[u8]) -> Option<u32> {
    match data {
        [b0, b1, b2, ..] => Some(u32::from(*b0) | u32::from(*b1) << 8 | u32::from(*b2) << 16),
        _ => None,
    }
}

/// Encodes the combined power command for both channels. Levels above [`MAX_STRENGTH`] are
/// clamped.
pub fn encode_ab_power(a_strength: u16, b_strength: u16) -> [u8; 3] {
    let a_raw = u32::from(a_strength.min(MAX_STRENGTH)) * STRENGTH_STEP;
    let b_raw = u32::from(b_strength.min(MAX_STRENGTH)) * STRENGTH_STEP;

    pack_u24((a_raw & RAW_MASK) << 11 | (b_raw & RAW_MASK))
}

/// Decodes the battery ("electric") characteristic.
///
/// Keeps the last published value: notifications that repeat it yield `None`.
#[derive(Debug, Default)]
pub struct BatteryDecoder {
    last: Option<u8>,
}

impl BatteryDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes the result of an explicit read. Always yields the value, if it could be decoded.
    pub fn read(&mut self, data: &[u8]) -> Option<u8> {
        let percent = (*data.first()?).min(100);
        self.last = Some(percent);
        Some(percent)
    }

    /// Decodes a value change notification.
    pub fn on_change(&mut self, data: &[u8]) -> Option<u8> {
        let percent = (*data.first()?).min(100);
        if self.last == Some(percent) {
            return None;
        }
        self.last = Some(percent);
        Some(percent)
    }

    pub fn last(&self) -> Option<u8> {
        self.last
    }
}

/// Decodes the combined AB power characteristic.
#[derive(Debug, Default)]
pub struct AbPowerDecoder {
    a_power: u16,
    b_power: u16,
}

impl AbPowerDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the payload was too short to decode, in which case the previous values
    /// are kept.
    pub fn on_change(&mut self, data: &[u8]) -> bool {
        let Some(value) = unpack_u24(data) else {
            return false;
        };

        let a_raw = (value >> 11) & RAW_MASK;
        let b_raw = value & RAW_MASK;
        self.a_power = (a_raw / STRENGTH_STEP) as u16;
        self.b_power = (b_raw / STRENGTH_STEP) as u16;
        true
    }

    pub fn a_power(&self) -> u16 {
        self.a_power
    }

    pub fn b_power(&self) -> u16 {
        self.b_power
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_power_is_all_zero_bytes() {
        assert_eq!(encode_ab_power(0, 0), [0, 0, 0]);
    }

    #[test]
    fn encodes_a_in_the_high_bits() {
        // a = 1 => raw 7 << 11 = 0x3800
        assert_eq!(encode_ab_power(1, 0), [0x00, 0x38, 0x00]);
        // b = 1 => raw 7
        assert_eq!(encode_ab_power(0, 1), [0x07, 0x00, 0x00]);
    }

    #[test]
    fn strength_is_clamped() {
        assert_eq!(encode_ab_power(1000, 1000), encode_ab_power(MAX_STRENGTH, MAX_STRENGTH));
    }

    #[test]
    fn ab_power_decoder_reads_what_the_app_writes() {
        let mut decoder = AbPowerDecoder::new();
        assert!(decoder.on_change(&encode_ab_power(274, 12)));
        assert_eq!(decoder.a_power(), 274);
        assert_eq!(decoder.b_power(), 12);
    }

    #[test]
    fn ab_power_decoder_ignores_short_payloads() {
        let mut decoder = AbPowerDecoder::new();
        decoder.on_change(&encode_ab_power(3, 4));
        assert!(!decoder.on_change(&[1, 2]));
        assert_eq!((decoder.a_power(), decoder.b_power()), (3, 4));
    }

    #[test]
    fn battery_decoder_only_reports_changes() {
        let mut decoder = BatteryDecoder::new();
        assert_eq!(decoder.read(&[80]), Some(80));
        assert_eq!(decoder.on_change(&[80]), None);
        assert_eq!(decoder.on_change(&[79]), Some(79));
        assert_eq!(decoder.on_change(&[]), None);
        assert_eq!(decoder.last(), Some(79));
    }
}
