use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::attack::runner::RunReport;
use crate::stats::TestRecord;

pub fn save_record(record: &TestRecord, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, record).context("serializing result")?;
    out.flush().context("writing result")?;
    info!(path = %path.display(), "results saved");
    Ok(())
}

pub fn summary(report: &RunReport) -> String {
    let r = &report.result;
    let bar = "=".repeat(60);
    let mut s = String::new();
    let _ = writeln!(s, "\n{bar}\nCRASH TEST RESULTS\n{bar}");
    match &report.verdict {
        Some(v) => {
            let _ = writeln!(s, "\nCRASH DETECTED!");
            let _ = writeln!(s, "   Method:    {}", v.method);
            let _ = writeln!(s, "   Recovered: {}", if v.recovered { "yes" } else { "no" });
        }
        None => {
            let _ = writeln!(s, "\nNo crash detected ({:?})", report.state);
        }
    }
    let _ = writeln!(s, "   Rounds:    {}", report.rounds);

    let _ = writeln!(s, "\n{bar}\n{}\n{bar}", r.test_name);
    let _ = writeln!(s, "  Duration:       {:.1}s", r.duration_seconds);
    let _ = writeln!(s, "  Requests:       {}", r.requests_sent);
    let _ = writeln!(s, "  Responses:      {}", r.responses_received);
    let _ = writeln!(s, "  Success Rate:   {:.1}%", r.success_rate_percent);
    let _ = writeln!(s, "  Timeouts:       {}", r.timeouts);
    let _ = writeln!(s, "  Conn Failures:  {}", r.connection_failures);
    let _ = writeln!(s, "  Unresponsive:   {}", r.device_unresponsive_events);
    let _ = writeln!(s, "  Possible Crash: {}", r.possible_crashes);
    if r.possible_crashes > 0 {
        let _ = writeln!(
            s,
            "\n  !! DEVICE MAY HAVE CRASHED {} TIME(S)",
            r.possible_crashes
        );
    }
    s
}

pub fn print_summary(report: &RunReport) {
    print!("{}", summary(report));
}
