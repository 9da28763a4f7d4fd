use std::fs;

const LOG_FILE: &str = "fx-overlay.log";

pub fn setup(is_debug: bool) -> Result<(), fern::InitError> {
    let level = if is_debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let log_dir = data::data_path(None);
    fs::create_dir_all(&log_dir)?;
    let log_file = fern::log_file(log_dir.join(LOG_FILE))?;

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ));
        })
        .level(level)
        .level_for("hyper", log::LevelFilter::Warn)
        .level_for("hyper_util", log::LevelFilter::Warn)
        .level_for("rustls", log::LevelFilter::Warn)
        .level_for("tokio_rustls", log::LevelFilter::Warn)
        .chain(std::io::stdout())
        .chain(log_file)
        .apply()?;

    Ok(())
}
