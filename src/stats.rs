//! Memory statistics of loaded textures.

use std::fmt::Write as _;

/// Receiver of per-texture size records.
pub trait StatsSink {
    fn add_entry(&mut self, name: &str, bytes: usize);
}

/// Size record of one texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedSizeEntry {
    pub name: String,
    pub bytes: usize,
}

/// Default [`StatsSink`], collecting entries and their total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub textures: Vec<NamedSizeEntry>,
    pub total_bytes: usize,
}

impl StatsSink for RenderStats {
    fn add_entry(&mut self, name: &str, bytes: usize) {
        self.total_bytes += bytes;
        self.textures.push(NamedSizeEntry {
            name: name.to_string(),
            bytes,
        });
    }
}

impl RenderStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Human-readable listing, largest textures first.
    #[must_use]
    pub fn report(&self) -> String {
        let mut entries: Vec<_> = self.textures.iter().collect();
        entries.sort_by(|a, b| b.bytes.cmp(&a.bytes).then_with(|| a.name.cmp(&b.name)));

        let mut out = String::new();
        let _ = writeln!(
            out,
            "Textures: {} ({})",
            entries.len(),
            format_bytes(self.total_bytes)
        );
        for entry in entries {
            let _ = writeln!(out, "  {:<40} {}", entry.name, format_bytes(entry.bytes));
        }
        out
    }
}

/// Formats a byte count with a binary unit, e.g. `1.50M`.
#[must_use]
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "K", "M", "G"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}B")
    } else {
        format!("{value:.2}{}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_and_orders_entries() {
        let mut stats = RenderStats::new();
        stats.add_entry("small.png", 16);
        stats.add_entry("large.exr", 3 << 20);
        assert_eq!(stats.total_bytes, (3 << 20) + 16);

        let report = stats.report();
        let large = report.find("large.exr").expect("listed");
        let small = report.find("small.png").expect("listed");
        assert!(large < small);
        assert!(report.starts_with("Textures: 2 (3.00M)"));
    }

    #[test]
    fn byte_units() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(1536), "1.50K");
    }
}
