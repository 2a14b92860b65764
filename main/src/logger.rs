/// Initialize the logger used for plain CLI invocations. The bootstrap
/// never comes through here; it logs JSON lines over the daemon's log pipe.
pub fn init() {
    use std::io::Write;

    let mut builder = env_logger::Builder::new();
    builder.parse_filters("meridian=debug");

    builder.format(|buf, record| {
        let timestamp = buf.timestamp_millis();
        writeln!(
            buf,
            "{}: {:<5} {}: {}",
            timestamp,
            record.level(),
            record.module_path().unwrap_or_default(),
            record.args()
        )
    });

    builder.init()
}
