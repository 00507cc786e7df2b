use uuid::Uuid;

/**
 * The name the e-stim box advertises itself with.
 */
pub const DEVICE_NAME: &str = "D-LAB ESTIM01";

/**
 * Device status service, exposes the battery ("electric") characteristic.
 */
pub const DEVICE_STATUS_SERVICE: Uuid = Uuid::from_u128(0x955a180a_0fe2_f5aa_a094_84b8d4f3e8ad);

/**
 * Battery level in percent. Readable and notifies on change.
 */
pub const ELECTRIC_CHARACTERISTIC: Uuid = Uuid::from_u128(0x955a1500_0fe2_f5aa_a094_84b8d4f3e8ad);

/**
 * E-stim service, exposes the power and wave characteristics.
 */
pub const ESTIM_SERVICE: Uuid = Uuid::from_u128(0x955a180b_0fe2_f5aa_a094_84b8d4f3e8ad);

/**
 * Combined strength of both channels. Writable and notifies on change.
 */
pub const AB_POWER_CHARACTERISTIC: Uuid = Uuid::from_u128(0x955a1504_0fe2_f5aa_a094_84b8d4f3e8ad);

/**
 * Wave frames labeled "A" by the firmware. Note that this characteristic drives output channel B.
 */
pub const WAVE_A_CHARACTERISTIC: Uuid = Uuid::from_u128(0x955a1505_0fe2_f5aa_a094_84b8d4f3e8ad);

/**
 * Wave frames labeled "B" by the firmware. Note that this characteristic drives output channel A.
 */
pub const WAVE_B_CHARACTERISTIC: Uuid = Uuid::from_u128(0x955a1506_0fe2_f5aa_a094_84b8d4f3e8ad);

/**
 * Services that must be present (and accessible) after connecting.
 */
pub const REQUIRED_SERVICES: [Uuid; 2] = [DEVICE_STATUS_SERVICE, ESTIM_SERVICE];
