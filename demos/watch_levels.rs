use squeezegauge::{ConnectionState, Consumer, GaugeConfig, GaugeError, GaugeReader, Reading};
use std::{env, thread, time::Duration};

/// Prints what a display would show.
struct ConsoleDisplay;

impl Consumer for ConsoleDisplay {
    fn on_sample(&mut self, reading: &Reading) {
        match &reading.level {
            Some(level) => println!(
                "Value: {:>5} | {:<18} | {}",
                reading.sample.value as i64, level.label, level.asset
            ),
            None => println!("Value: {:>5} | (unclassified)", reading.sample.value as i64),
        }
    }

    fn on_state_change(&mut self, state: ConnectionState, port: Option<&str>) {
        match port {
            Some(port) => println!("Status: {} ({})", state, port),
            None => println!("Status: {}", state),
        }
    }

    fn on_error(&mut self, message: &str) {
        println!("Warning: {}", message);
    }
}

fn main() -> Result<(), GaugeError> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .env()
        .init()
        .map_err(|e| GaugeError::Config(e.to_string()))?;

    let config = match env::args().nth(1) {
        Some(path) => GaugeConfig::load(path)?,
        None => GaugeConfig::default(),
    };

    let mut reader = GaugeReader::start(config)?;
    let stop = reader.stop_handle();
    ctrlc::set_handler(move || stop.request())
        .map_err(|e| GaugeError::ThreadComm(e.to_string()))?;

    println!("Press Ctrl+C to stop.");
    let mut display = ConsoleDisplay;
    while reader.is_running() {
        reader.deliver_pending(&mut display);
        thread::sleep(Duration::from_millis(20));
    }
    reader.deliver_pending(&mut display);

    reader.stop()?;
    println!(
        "Program finished. {} samples, {} malformed lines, {} reconnects.",
        reader.stats().samples(),
        reader.stats().malformed(),
        reader.stats().reconnects()
    );
    Ok(())
}
