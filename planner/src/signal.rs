use std::path::Path;

use mission_types::{Coordinate, SignalServerConfig};
use tokio::io::AsyncReadExt;
use tracing::error;

/// Row-major dBm matrix, dimensions fixed by the PPM header.
pub type CoverageMatrix = Vec<Vec<f64>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rgb {
    r: u8,
    g: u8,
    b: u8,
}

/// Parse a DCF colour→dBm table: `<dbm>:<r>,<g>,<b>` per line, leading
/// whitespace and blank lines permitted (§6.4).
fn parse_dcf(text: &str) -> Vec<(Rgb, f64)> {
    let mut entries = Vec::new();
    for raw_line in text.lines() {
        let line = raw_line.trim_start();
        if line.is_empty() {
            continue;
        }
        let Some((dbm_str, rgb_str)) = line.split_once(':') else {
            continue;
        };
        let Ok(dbm) = dbm_str.trim().parse::<f64>() else {
            continue;
        };
        let parts: Vec<&str> = rgb_str.trim().split(',').map(str::trim).collect();
        if parts.len() != 3 {
            continue;
        }
        let (Ok(r), Ok(g), Ok(b)) = (
            parts[0].parse::<u16>(),
            parts[1].parse::<u16>(),
            parts[2].parse::<u16>(),
        ) else {
            continue;
        };
        entries.push((
            Rgb {
                r: r as u8,
                g: g as u8,
                b: b as u8,
            },
            dbm,
        ));
    }
    entries
}

/// Nearest colour under L∞ ≤ 1 on every channel; `-120.0` dBm if no match.
fn find_dbm(colormap: &[(Rgb, f64)], c: Rgb) -> f64 {
    for (cc, dbm) in colormap {
        if (c.r as i16 - cc.r as i16).abs() <= 1
            && (c.g as i16 - cc.g as i16).abs() <= 1
            && (c.b as i16 - cc.b as i16).abs() <= 1
        {
            return *dbm;
        }
    }
    -120.0
}

/// Parse a PPM-P6 binary raster plus its DCF colour table into a dBm
/// matrix (§4.2, §6.4). Every failure logs and returns `None` rather than
/// panicking — this runs against externally produced files.
pub async fn read_coverage_file(ppm_path: &Path, dcf_path: &Path) -> Option<CoverageMatrix> {
    let raw = match tokio::fs::read(ppm_path).await {
        Ok(b) => b,
        Err(e) => {
            error!("cannot open PPM file {}: {e}", ppm_path.display());
            return None;
        }
    };

    let dcf_text = match tokio::fs::read_to_string(dcf_path).await {
        Ok(t) => t,
        Err(e) => {
            error!("cannot open DCF file {}: {e}", dcf_path.display());
            return None;
        }
    };
    let colormap = parse_dcf(&dcf_text);
    if colormap.is_empty() {
        error!("DCF file {} produced an empty colour map", dcf_path.display());
        return None;
    }

    let mut cursor = std::io::Cursor::new(raw.as_slice());
    let mut magic = [0u8; 2];
    if cursor.read_exact(&mut magic).await.is_err() || &magic != b"P6" {
        error!("error in PPM version, only accept P6");
        return None;
    }

    // Header: whitespace-separated `cols rows maxval`, skipping `#` comments.
    let (cols, rows) = match read_ppm_header(&raw) {
        Some(v) => v,
        None => {
            error!("malformed PPM header in {}", ppm_path.display());
            return None;
        }
    };

    let body_start = raw.len() - cols * rows * 3;
    let body = &raw[body_start..];
    if body.len() != cols * rows * 3 {
        error!("error reading PPM, EOF unexpected");
        return None;
    }

    let mut matrix = vec![vec![-120.0; cols]; rows];
    for row in 0..rows {
        for col in 0..cols {
            let idx = (row * cols + col) * 3;
            let c = Rgb {
                r: body[idx],
                g: body[idx + 1],
                b: body[idx + 2],
            };
            matrix[row][col] = find_dbm(&colormap, c);
        }
    }
    Some(matrix)
}

/// Returns `(cols, rows)` and leaves the caller to compute the body offset
/// by taking the raster's tail, since we already have the whole file in
/// memory (simpler than tracking a byte cursor through a binary body).
fn read_ppm_header(raw: &[u8]) -> Option<(usize, usize)> {
    let mut pos = 2; // past "P6"
    let skip_ws_and_comments = |raw: &[u8], pos: &mut usize| {
        loop {
            while *pos < raw.len() && raw[*pos].is_ascii_whitespace() {
                *pos += 1;
            }
            if *pos < raw.len() && raw[*pos] == b'#' {
                while *pos < raw.len() && raw[*pos] != b'\n' {
                    *pos += 1;
                }
            } else {
                break;
            }
        }
    };
    let read_token = |raw: &[u8], pos: &mut usize| -> Option<usize> {
        skip_ws_and_comments(raw, pos);
        let start = *pos;
        while *pos < raw.len() && !raw[*pos].is_ascii_whitespace() {
            *pos += 1;
        }
        std::str::from_utf8(&raw[start..*pos]).ok()?.parse().ok()
    };

    let cols = read_token(raw, &mut pos)?;
    let rows = read_token(raw, &mut pos)?;
    let _maxval = read_token(raw, &mut pos)?;
    Some((cols, rows))
}

/// Parse the tool's first stdout line, `lat|lon|lat|lon` (max, max, min, min).
pub fn parse_bounds(line: &str) -> Vec<f64> {
    line.split('|').filter(|t| !t.is_empty()).filter_map(|t| t.parse().ok()).collect()
}

/// Convert a dBm matrix into candidate coverage coordinates above
/// `threshold`, interpolating linearly from the raster's geographic bounds.
pub fn matrix_to_points(
    matrix: &CoverageMatrix,
    lat_max: f64,
    lat_min: f64,
    lon_min: f64,
    lon_max: f64,
    threshold: f64,
) -> Vec<Coordinate> {
    if matrix.is_empty() {
        return Vec::new();
    }
    let rows = matrix.len();
    let cols = matrix[0].len();
    let lat_step = (lat_max - lat_min) / rows as f64;
    let lon_step = (lon_max - lon_min) / cols as f64;

    let mut points = Vec::new();
    for (row, row_values) in matrix.iter().enumerate() {
        for (col, &value) in row_values.iter().enumerate() {
            if value >= threshold {
                points.push(Coordinate::new(
                    lat_max - row as f64 * lat_step,
                    lon_min + col as f64 * lon_step,
                ));
            }
        }
    }
    points
}

/// Invoke the external RF tool via shell, then parse its raster output into
/// candidate coverage coordinates (§4.2 Signal acquisition).
pub async fn calculate_signal(
    executable_path: &Path,
    signal_server_conf: &SignalServerConfig,
    threshold: f64,
) -> Vec<Coordinate> {
    let Some(mut cmd) = signal_server_conf.to_command(executable_path) else {
        error!("error creating signal-server command");
        return Vec::new();
    };
    cmd.push_str(" > output.txt 2>&1");

    tracing::info!("executing signal-server command: {cmd}");
    let status = tokio::process::Command::new("sh").arg("-c").arg(&cmd).status().await;
    match status {
        Ok(s) if s.success() => tracing::info!("signal-server command executed successfully"),
        Ok(s) => {
            error!("signal-server command exited with {s}");
            return Vec::new();
        }
        Err(e) => {
            error!("error executing signal-server command: {e}");
            return Vec::new();
        }
    }

    let output_txt = executable_path.join("output.txt");
    let line = match tokio::fs::read_to_string(&output_txt).await {
        Ok(text) => match text.lines().next() {
            Some(l) => l.to_string(),
            None => {
                error!("error getting signal-server output");
                return Vec::new();
            }
        },
        Err(e) => {
            error!("cannot open {}: {e}", output_txt.display());
            return Vec::new();
        }
    };

    let values = parse_bounds(&line);
    if values.len() != 4 {
        error!("error decoding signal-server output: {line}");
        return Vec::new();
    }

    let dcf_path = executable_path.join(format!("{}.dcf", signal_server_conf.output_file));
    let ppm_path = executable_path.join(format!("{}.ppm", signal_server_conf.output_file));

    let Some(matrix) = read_coverage_file(&ppm_path, &dcf_path).await else {
        error!("error reading coverage file");
        return Vec::new();
    };

    let points = matrix_to_points(&matrix, values[0], values[2], values[3], values[1], threshold);
    if points.is_empty() {
        error!("error parsing matrix into a vector");
    }
    points
}

/// Write the candidate coverage points to `<executable_path>/coverage_map.csv`
/// (`lat,lon,coverage` header, 6-decimal rows). Every listed point already
/// cleared the signal threshold, so `coverage` is always `1` — this is a
/// flat marker file, not a graded heatmap (§2, §6.4, §6.6).
pub async fn write_coverage_csv(executable_path: &Path, points: &[Coordinate]) {
    let mut out = String::from("lat,lon,coverage\n");
    for p in points {
        out.push_str(&format!("{:.6},{:.6},1\n", p.lat, p.lon));
    }

    let path = executable_path.join("coverage_map.csv");
    if let Err(e) = tokio::fs::write(&path, out).await {
        error!("cannot write coverage map {}: {e}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dcf_parses_leading_whitespace_and_blank_lines() {
        let text = "\n  -50:10,20,30\n-90:0,0,0\n";
        let map = parse_dcf(text);
        assert_eq!(map.len(), 2);
        assert_eq!(map[0].1, -50.0);
    }

    #[test]
    fn find_dbm_tolerates_off_by_one_each_channel() {
        let map = vec![(Rgb { r: 10, g: 20, b: 30 }, -55.0)];
        assert_eq!(find_dbm(&map, Rgb { r: 11, g: 19, b: 31 }), -55.0);
        assert_eq!(find_dbm(&map, Rgb { r: 13, g: 20, b: 30 }), -120.0);
    }

    #[test]
    fn bounds_parse_skips_empty_tokens() {
        let values = parse_bounds("45.1|9.2|44.9|9.0|");
        assert_eq!(values, vec![45.1, 9.2, 44.9, 9.0]);
    }

    #[test]
    fn matrix_to_points_respects_threshold() {
        let matrix = vec![vec![-40.0, -100.0], vec![-30.0, -90.0]];
        let points = matrix_to_points(&matrix, 1.0, 0.0, 0.0, 1.0, -50.0);
        assert_eq!(points.len(), 2);
    }

    #[tokio::test]
    async fn coverage_csv_has_header_and_six_decimal_rows() {
        let dir = std::env::temp_dir().join(format!("signal-csv-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let points = vec![Coordinate::new(45.1, 9.2), Coordinate::new(45.123456789, 9.0)];
        write_coverage_csv(&dir, &points).await;

        let contents = tokio::fs::read_to_string(dir.join("coverage_map.csv")).await.unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some("lat,lon,coverage"));
        assert_eq!(lines.next(), Some("45.100000,9.200000,1"));
        assert_eq!(lines.next(), Some("45.123457,9.000000,1"));
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
