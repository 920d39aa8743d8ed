//! Parsers for `nvidia-smi` output.

/// One row of `nvidia-smi pmon -s u -c 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmonRow {
    pub gpu: String,
    pub pid: u32,
    pub sm_percent: u32,
    pub mem_percent: u32,
}

/// One row of `nvidia-smi --query-compute-apps=pid,used_memory,gpu_index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeAppRow {
    pub pid: u32,
    pub used_memory_mib: u64,
    pub gpu: String,
}

/// Parses `pmon` output.
///
/// Expected columns: `gpu pid type sm mem enc dec [jpg ofa] command`. Header
/// lines start with `#`; idle GPUs are reported with `-` as pid and skipped.
/// Utilization columns that are `-` (not sampled) count as 0.
pub fn parse_pmon(output: &str) -> Vec<PmonRow> {
    let mut rows = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 8 {
            continue;
        }

        let Ok(pid) = parts[1].parse::<u32>() else {
            continue;
        };

        rows.push(PmonRow {
            gpu: parts[0].to_string(),
            pid,
            sm_percent: parts[3].parse().unwrap_or(0),
            mem_percent: parts[4].parse().unwrap_or(0),
        });
    }

    rows
}

/// Parses `--query-compute-apps` CSV output (`noheader,nounits`).
pub fn parse_compute_apps(output: &str) -> Vec<ComputeAppRow> {
    let mut rows = Vec::new();

    for line in output.lines() {
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        if parts.len() < 3 {
            continue;
        }

        let (Ok(pid), Ok(used_memory_mib)) = (parts[0].parse::<u32>(), parts[1].parse::<u64>())
        else {
            continue;
        };

        rows.push(ComputeAppRow {
            pid,
            used_memory_mib,
            gpu: parts[2].to_string(),
        });
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    const PMON: &str = "\
# gpu         pid   type     sm    mem    enc    dec    jpg    ofa    command
# Idx           #    C/G      %      %      %      %      %      %    name
    0       2584     C     87     41      -      -      -      -    python3
    0       3056     G      -      -      -      -      -      -    Xorg
    1          -     -      -      -      -      -      -      -    -
    1       4100     C     12      3      -      -      -      -    python3
";

    #[test]
    fn test_parse_pmon() {
        let rows = parse_pmon(PMON);
        assert_eq!(rows.len(), 3);

        assert_eq!(
            rows[0],
            PmonRow {
                gpu: "0".to_string(),
                pid: 2584,
                sm_percent: 87,
                mem_percent: 41,
            }
        );
        // Unsampled utilization reads as zero
        assert_eq!(rows[1].sm_percent, 0);
        assert_eq!(rows[1].mem_percent, 0);
        assert_eq!(rows[2].gpu, "1");
        assert_eq!(rows[2].pid, 4100);
    }

    #[test]
    fn test_parse_pmon_older_format() {
        // Drivers before jpg/ofa columns print 8 columns
        let output = "# gpu pid type sm mem enc dec command\n    0  77  C  5  1  0  0  app\n";
        let rows = parse_pmon(output);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pid, 77);
        assert_eq!(rows[0].sm_percent, 5);
    }

    #[test]
    fn test_parse_pmon_empty_and_short_lines() {
        assert!(parse_pmon("").is_empty());
        assert!(parse_pmon("0 123 C 5\n").is_empty());
    }

    #[test]
    fn test_parse_compute_apps() {
        let output = "2584, 10240, 0\n4100, 512, 1\nnot, a, row\n\n7, 1\n";
        let rows = parse_compute_apps(output);

        assert_eq!(
            rows,
            vec![
                ComputeAppRow {
                    pid: 2584,
                    used_memory_mib: 10240,
                    gpu: "0".to_string(),
                },
                ComputeAppRow {
                    pid: 4100,
                    used_memory_mib: 512,
                    gpu: "1".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_compute_apps_not_supported() {
        // Some GPUs report the column as unavailable
        let rows = parse_compute_apps("2584, [N/A], 0\n");
        assert!(rows.is_empty());
    }
}
