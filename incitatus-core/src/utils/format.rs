//! Number rendering shared by notifications and command replies.

/// Fame with a unit suffix: `1.50 k`, `2.35 m`, `1.00 b`; raw below 1000.
pub fn format_fame(value: u64) -> String {
    let v = value as f64;
    if v >= 1e9 {
        format!("{:.2} b", v / 1_000_000_000.0)
    } else if v >= 1e6 {
        format!("{:.2} m", v / 1_000_000.0)
    } else if v >= 1e3 {
        format!("{:.2} k", v / 1_000.0)
    } else {
        value.to_string()
    }
}

/// Silver amount with `.` as the thousands separator: `1.234.567`.
pub fn format_coin(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out
}

/// Seconds with one decimal and no trailing zeros: `12.5`, `3`.
pub fn format_seconds(seconds: f64) -> String {
    let fixed = format!("{seconds:.1}");
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}
