use crate::backend::ComputeBackend;
use crate::curve::{flatten_points, flatten_scalars, random_instance};
use crate::gpu::{GpuBackend, GpuContext, GpuExecutor};
use crate::msm::naive_msm_with;
use crate::plan::{MsmConfig, WorkgroupVariant};
use anyhow::Result;
use std::path::Path;
use std::time::Instant;

/// log2 of the instance sizes
const CASES: &[u32] = &[10, 12, 14, 16];
const SEED: u64 = 0x6d73_6d;

struct CaseResult {
    points: usize,
    time_secs: f64,
    rate: f64,
}

pub fn run(
    gpu_index: u32,
    backend: GpuBackend,
    workgroup: WorkgroupVariant,
    save_to_markdown: bool,
) -> Result<()> {
    println!("Naive MSM Benchmark Suite");
    println!("=========================\n");

    let ctx = pollster::block_on(GpuContext::new(gpu_index, backend))?;
    let device_name = ctx.device_name().to_string();
    let executor = GpuExecutor::new(ctx);
    let config = MsmConfig {
        workgroup,
        ..MsmConfig::default()
    };

    println!("GPU: {}", executor.name());
    println!("Workgroup size: {}\n", workgroup.size());

    println!("{:<10} {:>12} {:>16}", "Points", "Time", "Rate");
    println!("{}", "-".repeat(40));

    let mut results = Vec::with_capacity(CASES.len());

    for &log_size in CASES {
        let count = 1usize << log_size;
        let (points, scalars) = random_instance(count, SEED);
        let points = flatten_points(&points);
        let scalars = flatten_scalars(&scalars);

        let t0 = Instant::now();
        pollster::block_on(naive_msm_with(&executor, &points, &scalars, &config))?;
        let time_secs = t0.elapsed().as_secs_f64();
        let rate = count as f64 / time_secs;

        println!(
            "{:<10} {:>10.2}ms {:>12.2}K/s",
            format!("2^{log_size}"),
            time_secs * 1000.0,
            rate / 1_000.0
        );

        results.push(CaseResult {
            points: count,
            time_secs,
            rate,
        });
    }

    if save_to_markdown {
        let version = env!("CARGO_PKG_VERSION");
        save_to_file(&device_name, version, &results)?;
        println!("\nResults saved to BENCHMARKS.md");
    }

    Ok(())
}

fn save_to_file(device_name: &str, version: &str, results: &[CaseResult]) -> Result<()> {
    let benchmarks_path = Path::new("BENCHMARKS.md");
    let existing = if benchmarks_path.exists() {
        std::fs::read_to_string(benchmarks_path)?
    } else {
        String::new()
    };

    let new_content = generate_markdown(device_name, version, results, &existing);
    std::fs::write(benchmarks_path, new_content)?;
    Ok(())
}

fn generate_markdown(
    device_name: &str,
    version: &str,
    results: &[CaseResult],
    existing: &str,
) -> String {
    let section_header = format!("### {device_name}");
    let new_section = format_gpu_section(device_name, version, results);

    if existing.is_empty() {
        format_fresh_file(&new_section)
    } else if let Some((start, end)) = find_gpu_section(existing, &section_header) {
        let mut out = String::with_capacity(existing.len());
        out.push_str(&existing[..start]);
        out.push_str(&new_section);
        out.push_str(&existing[end..]);
        out
    } else if let Some(pos) = find_insert_position(existing) {
        let mut out = String::with_capacity(existing.len() + new_section.len());
        out.push_str(&existing[..pos]);
        out.push_str(&new_section);
        out.push('\n');
        out.push_str(&existing[pos..]);
        out
    } else {
        let mut out = existing.to_string();
        out.push_str("\n## Results\n\n");
        out.push_str(&new_section);
        out
    }
}

fn format_fresh_file(gpu_section: &str) -> String {
    let mut out = String::new();
    out.push_str("# Benchmark Results\n\n");
    out.push_str("Run benchmarks on your hardware:\n\n");
    out.push_str("```bash\nnaive-msm --benchmark --save-benchmark\n```\n\n");
    out.push_str("## Results\n\n");
    out.push_str(gpu_section);
    out
}

fn format_gpu_section(device_name: &str, version: &str, results: &[CaseResult]) -> String {
    let mut s = format!("### {device_name}\n\n");
    s.push_str("| Points | Time | Rate |\n");
    s.push_str("|--------|------|------|\n");
    for r in results {
        s.push_str(&format!(
            "| {} | {:.2}ms | {:.2} K/s |\n",
            format_count(r.points as u64),
            r.time_secs * 1000.0,
            r.rate / 1_000.0
        ));
    }
    s.push_str(&format!("\n*Version: {version}*\n\n"));
    s
}

fn format_count(count: u64) -> String {
    let s = count.to_string();
    let bytes = s.as_bytes();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, &b) in bytes.iter().enumerate() {
        if i > 0 && (bytes.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(b as char);
    }
    result
}

/// Byte range of an existing device section, from its ### header up to the
/// next ### or ## header
fn find_gpu_section(content: &str, section_header: &str) -> Option<(usize, usize)> {
    let mut search_from = 0;
    while let Some(pos) = content[search_from..].find(section_header) {
        let start = search_from + pos;
        let after_header = start + section_header.len();

        let at_line_start = start == 0 || content.as_bytes()[start - 1] == b'\n';
        let at_line_end =
            after_header >= content.len() || content.as_bytes()[after_header] == b'\n';

        if at_line_start && at_line_end {
            let rest = &content[after_header..];
            let end = [rest.find("\n### "), rest.find("\n## ")]
                .into_iter()
                .flatten()
                .min()
                .map(|p| after_header + p + 1)
                .unwrap_or(content.len());

            return Some((start, end));
        }

        search_from = after_header;
    }
    None
}

fn find_insert_position(content: &str) -> Option<usize> {
    let marker = "## Results\n\n";
    content.find(marker).map(|pos| pos + marker.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_results() -> Vec<CaseResult> {
        vec![
            CaseResult {
                points: 1024,
                time_secs: 0.05,
                rate: 20_480.0,
            },
            CaseResult {
                points: 65_536,
                time_secs: 1.6,
                rate: 40_960.0,
            },
        ]
    }

    #[test]
    fn generates_fresh_file() {
        let content = generate_markdown("Test GPU", "0.1.0", &sample_results(), "");
        assert!(content.contains("# Benchmark Results"));
        assert!(content.contains("### Test GPU"));
        assert!(content.contains("*Version: 0.1.0*"));
        assert!(content.contains("| 65,536 | 1600.00ms | 40.96 K/s |"));
    }

    #[test]
    fn replaces_existing_gpu_section() {
        let existing = "\
# Benchmark Results

## Results

### Old GPU

| Points | Time | Rate |
|--------|------|------|
| 1,024 | 90.00ms | 11.38 K/s |

*Version: 0.0.1*

### Other GPU

| Points | Time | Rate |
|--------|------|------|
| 1,024 | 80.00ms | 12.80 K/s |

*Version: 0.0.1*
";

        let content = generate_markdown("Old GPU", "0.1.0", &sample_results(), existing);
        assert!(content.contains("*Version: 0.1.0*"));
        assert!(content.contains("### Other GPU"));
        assert!(content.contains("12.80 K/s"));
        assert!(!content.contains("11.38 K/s"));
        assert_eq!(content.matches("### Old GPU").count(), 1);
    }

    #[test]
    fn inserts_new_section_first() {
        let existing = "\
# Benchmark Results

## Results

### Existing GPU

*Version: 0.0.1*
";

        let content = generate_markdown("New GPU", "0.1.0", &sample_results(), existing);
        let new_pos = content.find("### New GPU").unwrap();
        let existing_pos = content.find("### Existing GPU").unwrap();
        assert!(new_pos < existing_pos);
    }

    #[test]
    fn does_not_match_substring_gpu_header() {
        let existing = "\
## Results

### GPU ABC

*Version: 0.0.1*
";

        let content = generate_markdown("GPU A", "0.1.0", &sample_results(), existing);
        assert!(content.contains("### GPU A\n"));
        assert!(content.contains("### GPU ABC"));
    }

    #[test]
    fn formats_counts_with_separators() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_024), "1,024");
        assert_eq!(format_count(1_048_576), "1,048,576");
    }
}
