const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Renders a byte count with 1024-based units and two decimals.
pub fn format_size(bytes: u64) -> String {
    scale(bytes as f64)
}

pub fn format_speed(bytes_per_second: f64) -> String {
    format!("{}/s", scale(bytes_per_second))
}

fn scale(value: f64) -> String {
    let mut value = value.max(0.0);
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.2} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.2} PB")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_use_binary_units() {
        assert_eq!(format_size(0), "0.00 B");
        assert_eq!(format_size(1023), "1023.00 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024 * 1024), "5.00 GB");
    }

    #[test]
    fn huge_sizes_stop_at_petabytes() {
        assert_eq!(format_size(1u64 << 50), "1.00 PB");
        assert_eq!(format_size(1u64 << 60), "1024.00 PB");
    }

    #[test]
    fn speed_appends_per_second() {
        assert_eq!(format_speed(2_097_152.0), "2.00 MB/s");
        assert_eq!(format_speed(0.0), "0.00 B/s");
    }
}
