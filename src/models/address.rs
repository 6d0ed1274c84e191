/// Check that `address` is `0x` followed by exactly 40 hex digits.
///
/// Case is not normalized: both `0xAB..` and `0xab..` are valid, and callers
/// store and compare the string exactly as received.
pub fn is_valid_address(address: &str) -> bool {
    let Some(digits) = address.strip_prefix("0x") else {
        return false;
    };

    digits.len() == 40 && digits.chars().all(|c| c.is_ascii_hexdigit())
}
