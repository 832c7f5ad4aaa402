//! Exercises a `log4rs`-configured sink end to end: a session's lifecycle
//! log lines land in the configured file appender with the expected shape.
//! `env_logger` (used by the binary) can't be asserted on this way since it
//! writes straight to stderr; `log4rs`'s file appender is what lets an
//! integration test actually read back what was logged.

use std::io::Read;

use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

#[test]
fn reflector_session_log_lines_land_in_the_configured_appender() {
    let dir = std::env::temp_dir().join(format!("twamp-log4rs-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let log_path = dir.join("twamp.log");

    let appender = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{l} - {m}{n}")))
        .build(&log_path)
        .unwrap();

    let config = Config::builder()
        .appender(Appender::builder().build("file", Box::new(appender)))
        .build(Root::builder().appender("file").build(log::LevelFilter::Info))
        .unwrap();

    log4rs::init_config(config).unwrap();

    log::info!("reflector listening on 127.0.0.1:20001");
    log::warn!("dropping 4-byte probe from 127.0.0.1:54321 (too short)");

    let mut contents = String::new();
    std::fs::File::open(&log_path)
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();

    assert!(contents.contains("INFO - reflector listening on 127.0.0.1:20001"));
    assert!(contents.contains("WARN - dropping 4-byte probe"));

    let _ = std::fs::remove_dir_all(&dir);
}
