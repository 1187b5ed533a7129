use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

/// Parse a port list for cross-product scans into a deduplicated list of TCP ports.
///
/// Supported formats per line:
/// - single port number: `80`
/// - inclusive range: `8000-8010`
/// - comments: everything after `#` is ignored
/// - whitespace and blank lines are ignored
pub fn parse_ports_str(s: &str) -> Result<Vec<u16>> {
    let mut out: Vec<u16> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for (line_no, line) in entries(s) {
        if let Some((a, b)) = line.split_once('-') {
            let start = parse_port_str(a.trim())
                .with_context(|| format!("line {line_no}: invalid start in range: {a}"))?;
            let end = parse_port_str(b.trim())
                .with_context(|| format!("line {line_no}: invalid end in range: {b}"))?;
            if start > end {
                bail!("line {line_no}: invalid range {start}-{end} (start > end)");
            }
            for p in start..=end {
                if seen.insert(p) {
                    out.push(p);
                }
            }
            continue;
        }

        let p = parse_port_str(line)
            .with_context(|| format!("line {line_no}: invalid port value: {line}"))?;
        if seen.insert(p) {
            out.push(p);
        }
    }

    Ok(out)
}

/// Parse a port list for pairwise scans: exactly one port per entry, order and
/// duplicates preserved so that entry `i` lines up with host `i`.
pub fn parse_port_lines(s: &str) -> Result<Vec<u16>> {
    entries(s)
        .map(|(line_no, line)| {
            parse_port_str(line).with_context(|| format!("line {line_no}: invalid port value: {line}"))
        })
        .collect()
}

/// Load a port list from a file path, expanding ranges unless `pairwise` is set.
pub fn load_ports_from_path(path: impl AsRef<Path>, pairwise: bool) -> Result<Vec<u16>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read ports file: {}", path.as_ref().display()))?;
    if pairwise {
        parse_port_lines(&content)
    } else {
        parse_ports_str(&content)
    }
}

/// Non-empty, comment-stripped lines with their 1-based line numbers.
pub(crate) fn entries(s: &str) -> impl Iterator<Item = (usize, &str)> {
    s.lines().enumerate().filter_map(|(idx, raw_line)| {
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        (!line.is_empty()).then_some((idx + 1, line))
    })
}

fn parse_port_str(s: &str) -> Result<u16> {
    let val: u32 = s.parse::<u32>().map_err(|e| anyhow::anyhow!(e))?;
    if val == 0 || val > 65535 {
        bail!("port out of range: {val}");
    }
    Ok(val as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_ports() {
        let input = "80\n22\n   443  \n";
        let ports = parse_ports_str(input).unwrap();
        assert_eq!(ports, vec![80, 22, 443]);
    }

    #[test]
    fn parse_ranges_and_dedup() {
        let input = "8000-8002\n80\n8001\n";
        let ports = parse_ports_str(input).unwrap();
        assert_eq!(ports, vec![8000, 8001, 8002, 80]);
    }

    #[test]
    fn pairwise_lines_keep_duplicates() {
        let ports = parse_port_lines("80\n# skip\n80\n443 # https\n").unwrap();
        assert_eq!(ports, vec![80, 80, 443]);
    }

    #[test]
    fn pairwise_lines_reject_ranges() {
        assert!(parse_port_lines("8000-8002\n").is_err());
    }

    #[test]
    fn invalid_values_error() {
        let input = "70000\n";
        assert!(parse_ports_str(input).is_err());
        assert!(parse_ports_str("9-3\n").is_err());
    }
}
