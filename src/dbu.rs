//! Encoded level byte → dBu translation
//!
//! The device reports fader levels as a 7-bit value. 107 is unity (0 dBu),
//! 127 is +10 dBu; the top of the range moves in 0.5 dB steps and the bottom
//! (below -30 dBu) in 1 dB steps. 0 means fully attenuated.

use crate::error::ProtocolError;

/// Encoded value at 0 dBu
pub const UNITY_LEVEL: u8 = 107;

#[rustfmt::skip]
pub const DBU_TABLE: [f32; 128] = [
    f32::NEG_INFINITY, -76.0, -75.0, -74.0, -73.0, -72.0, -71.0, -70.0,
    -69.0, -68.0, -67.0, -66.0, -65.0, -64.0, -63.0, -62.0,
    -61.0, -60.0, -59.0, -58.0, -57.0, -56.0, -55.0, -54.0,
    -53.0, -52.0, -51.0, -50.0, -49.0, -48.0, -47.0, -46.0,
    -45.0, -44.0, -43.0, -42.0, -41.0, -40.0, -39.0, -38.0,
    -37.0, -36.0, -35.0, -34.0, -33.0, -32.0, -31.0, -30.0,
    -29.5, -29.0, -28.5, -28.0, -27.5, -27.0, -26.5, -26.0,
    -25.5, -25.0, -24.5, -24.0, -23.5, -23.0, -22.5, -22.0,
    -21.5, -21.0, -20.5, -20.0, -19.5, -19.0, -18.5, -18.0,
    -17.5, -17.0, -16.5, -16.0, -15.5, -15.0, -14.5, -14.0,
    -13.5, -13.0, -12.5, -12.0, -11.5, -11.0, -10.5, -10.0,
    -9.5, -9.0, -8.5, -8.0, -7.5, -7.0, -6.5, -6.0,
    -5.5, -5.0, -4.5, -4.0, -3.5, -3.0, -2.5, -2.0,
    -1.5, -1.0, -0.5, 0.0, 0.5, 1.0, 1.5, 2.0,
    2.5, 3.0, 3.5, 4.0, 4.5, 5.0, 5.5, 6.0,
    6.5, 7.0, 7.5, 8.0, 8.5, 9.0, 9.5, 10.0,
];

/// Look up the dBu value for an encoded level
pub fn translate_level(encoded: i64) -> Result<f32, ProtocolError> {
    usize::try_from(encoded)
        .ok()
        .and_then(|idx| DBU_TABLE.get(idx).copied())
        .ok_or(ProtocolError::LevelOutOfDomain(encoded))
}

/// Same lookup with NaN as the out-of-domain sentinel
pub fn translate_level_or_nan(encoded: i64) -> f32 {
    translate_level(encoded).unwrap_or(f32::NAN)
}

/// Render a dBu value for display (`-inf`, or one decimal place)
pub fn format_dbu(value: f32) -> String {
    if value == f32::NEG_INFINITY {
        "-inf".to_string()
    } else {
        format!("{:.1}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_boundaries() {
        assert_eq!(translate_level(0), Ok(f32::NEG_INFINITY));
        assert_eq!(translate_level(127), Ok(10.0));
        assert_eq!(translate_level(UNITY_LEVEL as i64), Ok(0.0));
    }

    #[test]
    fn test_out_of_domain() {
        assert_eq!(translate_level(128), Err(ProtocolError::LevelOutOfDomain(128)));
        assert_eq!(translate_level(-1), Err(ProtocolError::LevelOutOfDomain(-1)));
        assert!(translate_level_or_nan(300).is_nan());
        assert_eq!(translate_level_or_nan(42), DBU_TABLE[42]);
    }

    #[test]
    fn test_table_is_monotonic() {
        for pair in DBU_TABLE.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_format_dbu() {
        assert_eq!(format_dbu(f32::NEG_INFINITY), "-inf");
        assert_eq!(format_dbu(-12.5), "-12.5");
        assert_eq!(format_dbu(0.0), "0.0");
    }
}
