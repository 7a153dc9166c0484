/// Formats a presentation time in microseconds as `HH:MM:SS.mmm`.
pub fn time_str(micros: i64) -> String {
    let sign = if micros < 0 { "-" } else { "" };
    let ms = micros.unsigned_abs() / 1000;
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let milliseconds = ms % 1000;

    format!(
        "{sign}{hours:0width$}:{minutes:02}:{seconds:02}.{milliseconds:03}",
        width = if hours >= 100 { 0 } else { 2 }
    )
}

#[test]
fn formats_hours_minutes_seconds() {
    assert_eq!(time_str(0), "00:00:00.000");
    assert_eq!(time_str(3_723_040_000), "01:02:03.040");
    assert_eq!(time_str(-40_000), "-00:00:00.040");
}
