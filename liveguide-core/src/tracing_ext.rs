use std::fmt;

use is_terminal::IsTerminal;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::fmt::time::FormatTime;

pub fn init_tracing(format: &str) {
    match format {
        "json" => init_json_tracing(),
        _ => init_text_tracing(),
    }
}

fn init_json_tracing() {
    tracing_subscriber::fmt()
        .json()
        .with_timer(HrTime)
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(is_terminal())
        .init();
}

fn init_text_tracing() {
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::rfc_3339())
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(is_terminal())
        .init();
}

fn is_terminal() -> bool {
    std::io::stdout().is_terminal()
}

// Unix time with nanoseconds.
struct HrTime;

impl FormatTime for HrTime {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let ts = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        write_hr_time(w, ts)
    }
}

fn write_hr_time<W: fmt::Write>(w: &mut W, ts: i64) -> fmt::Result {
    const NANOS_IN_SEC: i64 = 1_000_000_000;
    let secs = ts / NANOS_IN_SEC;
    let nanos = ts % NANOS_IN_SEC;
    write!(w, "{}.{:09}", secs, nanos)
}

// <coverage:exclude>
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_hr_time() {
        let mut s = String::new();
        write_hr_time(&mut s, 1_700_000_000_000_000_042).unwrap();
        assert_eq!(s, "1700000000.000000042");

        let mut s = String::new();
        write_hr_time(&mut s, 999_999_999).unwrap();
        assert_eq!(s, "0.999999999");
    }
}
// </coverage:exclude>
