use crate::pipeline::RunSummary;
use ascii_table::{Align, AsciiTable};

pub fn size_to_human_readable(mut size: f64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", size, UNITS[unit])
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}

/// Render a run summary as two tables: totals, then per-worker share.
pub fn summary_table(summary: &RunSummary) -> String {
    let mut totals = AsciiTable::default();
    totals.column(0).set_header("Metric").set_align(Align::Left);
    totals.column(1).set_header("Value").set_align(Align::Right);

    let secs = summary.elapsed.as_secs_f64();
    let throughput = if secs > 0.0 {
        format!("{}/s", size_to_human_readable(summary.bytes_hashed as f64 / secs))
    } else {
        "-".to_string()
    };
    let rows = vec![
        vec!["File size".to_string(), size_to_human_readable(summary.file_size as f64)],
        vec!["Chunks".to_string(), summary.chunks.to_string()],
        vec!["Bytes hashed".to_string(), size_to_human_readable(summary.bytes_hashed as f64)],
        vec!["Throttle pauses".to_string(), summary.throttle_pauses.to_string()],
        vec!["Memory reclaims".to_string(), summary.reclaims.to_string()],
        vec!["Elapsed".to_string(), format!("{:.2?}", summary.elapsed)],
        vec!["Throughput".to_string(), throughput],
    ];

    let mut per_worker = AsciiTable::default();
    per_worker.column(0).set_header("Worker").set_align(Align::Left);
    per_worker.column(1).set_header("Chunks").set_align(Align::Right);
    per_worker.column(2).set_header("Bytes").set_align(Align::Right);
    let worker_rows: Vec<Vec<String>> = summary
        .workers
        .iter()
        .map(|w| {
            vec![
                w.id.to_string(),
                w.chunks.to_string(),
                size_to_human_readable(w.bytes as f64),
            ]
        })
        .collect();

    format!("{}\n{}", totals.format(rows), per_worker.format(worker_rows))
}
