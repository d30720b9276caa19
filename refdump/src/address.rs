/// Parse a hexadecimal address, as printed by a debugger.
///
/// Surrounding whitespace and a `0x` or `0X` prefix are ignored.
/// Returns 0, which is never the address of an allocation,
/// if the text is not a hexadecimal number that fits in a word.
///
/// ```
/// # use refdump::hex_to_address;
/// assert_eq!(hex_to_address("0x7f00dead"), 0x7f00dead);
/// assert_eq!(hex_to_address("BEEF"), 0xbeef);
/// assert_eq!(hex_to_address("0xnope"), 0);
/// ```
pub fn hex_to_address(text: &str) -> usize
{
    let text = text.trim();
    let digits = text.strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);

    // from_str_radix would also accept a leading sign.
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return 0;
    }

    usize::from_str_radix(digits, 16).unwrap_or(0)
}

#[cfg(test)]
mod tests
{
    use {super::*, proptest::proptest};

    #[test]
    fn rejects_non_hex()
    {
        for text in ["", "0x", "+10", "-10", "0x-1", "12 34", "0x0x10", "g"] {
            assert_eq!(hex_to_address(text), 0, "{text:?}");
        }
    }

    #[test]
    fn accepts_whitespace_and_prefixes()
    {
        assert_eq!(hex_to_address("  0x10\n"), 0x10);
        assert_eq!(hex_to_address("0XaB"), 0xab);
        assert_eq!(hex_to_address("000ff"), 0xff);
    }

    #[test]
    fn overflow_is_zero()
    {
        let too_long = "1".repeat(2 * std::mem::size_of::<usize>() + 1);
        assert_eq!(hex_to_address(&too_long), 0);
    }

    proptest!
    {
        #[test]
        fn parses_formatted_addresses(address: usize)
        {
            assert_eq!(hex_to_address(&format!("{address:#x}")), address);
            assert_eq!(hex_to_address(&format!("{address:X}")), address);
        }
    }
}
