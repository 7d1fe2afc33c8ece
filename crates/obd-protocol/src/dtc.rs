//! Diagnostic Trouble Code Decoding (mode 03)

const SYSTEMS: [char; 4] = ['P', 'C', 'B', 'U'];

/// Format one two-byte trouble code, e.g. `[0x01, 0x33]` => `P0133`
pub fn format_code(hi: u8, lo: u8) -> String {
    let system = SYSTEMS[usize::from(hi >> 6)];
    let digit = (hi >> 4) & 0x03;
    format!("{}{}{:X}{:02X}", system, digit, hi & 0x0F, lo)
}

/// Decode a mode 03 payload into trouble codes.
///
/// CAN adapters prefix the pairs with a count byte, which shows up as an odd
/// payload length and is skipped. All-zero pairs are padding.
pub fn decode_codes(payload: &[u8]) -> Vec<String> {
    let pairs = if payload.len() % 2 == 1 {
        &payload[1..]
    } else {
        payload
    };

    pairs
        .chunks_exact(2)
        .filter(|pair| pair[0] != 0 || pair[1] != 0)
        .map(|pair| format_code(pair[0], pair[1]))
        .collect()
}
