//! DSCP name lookup for the `--dscp` CLI flag. Maps the commonly used
//! Differentiated Services markings to their TOS byte (DSCP value << 2).

use network_commons::error::CommonError;

/// Resolves a DSCP codepoint name (case-insensitive) to the TOS byte that should
/// be written into a packet's IP header.
pub fn tos_byte_for_name(name: &str) -> Result<u8, CommonError> {
    let dscp = match name.to_ascii_uppercase().as_str() {
        "CS0" | "DEFAULT" => 0,
        "CS1" => 8,
        "AF11" => 10,
        "AF12" => 12,
        "AF13" => 14,
        "CS2" => 16,
        "AF21" => 18,
        "AF22" => 20,
        "AF23" => 22,
        "CS3" => 24,
        "AF31" => 26,
        "AF32" => 28,
        "AF33" => 30,
        "CS4" => 32,
        "AF41" => 34,
        "AF42" => 36,
        "AF43" => 38,
        "CS5" => 40,
        "EF" => 46,
        "CS6" => 48,
        "CS7" => 56,
        other => return Err(CommonError::Generic(format!("unknown DSCP name: {}", other))),
    };
    Ok(dscp << 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ef_maps_to_the_well_known_tos_byte() {
        assert_eq!(tos_byte_for_name("ef").unwrap(), 0xB8);
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!(tos_byte_for_name("bogus").is_err());
    }
}
