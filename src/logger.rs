use chrono::Local;
use fern::Dispatch;
use log::LevelFilter;

/// Maps the `-v` count of the command line onto a log level.
///
/// 0 keeps the tool silent, 1 reports trimmed hosts and discarded reservations,
/// 2 follows the parser state machine and 3 dumps every collected record.
pub fn level_for_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Off,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Initializes the global logger.
///
/// This function should be called once at the very beginning of the
/// application's `main` function. All output goes to stderr, stdout is
/// reserved for the capacity report.
///
/// The level is derived from `verbosity` unless `RUST_LOG` is set.
/// Example: `RUST_LOG=debug torque-maui-capacity --server pbs01`
pub fn init(verbosity: u8) {
    let log_level_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|level| level.parse::<LevelFilter>().ok())
        .unwrap_or_else(|| level_for_verbosity(verbosity));

    let base_config = Dispatch::new().level(log_level_filter).level_for("serde", LevelFilter::Warn);

    let console_config = Dispatch::new()
        .format(|out, message, record| {
            let colors = fern::colors::ColoredLevelConfig::new()
                .error(fern::colors::Color::Red)
                .warn(fern::colors::Color::Yellow)
                .info(fern::colors::Color::Green)
                .debug(fern::colors::Color::Blue)
                .trace(fern::colors::Color::BrightBlack);

            out.finish(format_args!(
                "[{} {} {}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .chain(std::io::stderr());

    base_config.chain(console_config).apply().unwrap_or_else(|e| {
        eprintln!("Failed to apply logger configuration: {}", e);
    });

    log::debug!("Logger initialized with level {}.", log_level_filter);
}
