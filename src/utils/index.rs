/// Render an atomic-unit amount as a fixed-point decimal string.
///
/// Integer arithmetic only, so large balances keep every digit.
pub fn format_token_amount(amount: u64, decimals: u32) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let scale = 10u64.pow(decimals);
    format!(
        "{}.{:0width$}",
        amount / scale,
        amount % scale,
        width = decimals as usize
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_fixed_fraction() {
        assert_eq!(format_token_amount(1_500_000_000_000, 12), "1.500000000000");
        assert_eq!(format_token_amount(42, 12), "0.000000000042");
        assert_eq!(format_token_amount(u64::MAX, 12), "18446744.073709551615");
        assert_eq!(format_token_amount(7, 0), "7");
    }
}
