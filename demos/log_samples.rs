use chrono::Local;
use csv::Writer;
use squeezegauge::{Event, GaugeConfig, GaugeReader, Reading};
use std::{
    fs::File,
    io::{self, Write},
    time::{Duration, Instant},
};

fn write_csv_record(wtr: &mut Writer<File>, reading: &Reading, seq: u64) -> Result<(), csv::Error> {
    let (label, asset) = match &reading.level {
        Some(level) => (level.label.as_str(), level.asset.as_str()),
        None => ("", ""),
    };
    wtr.write_record([
        seq.to_string(),
        reading.sample.received_at.to_rfc3339(),
        reading.sample.value.to_string(),
        label.to_string(),
        asset.to_string(),
    ])?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()?;

    let config = match std::env::args().nth(1) {
        Some(path) => GaugeConfig::load(path)?,
        None => GaugeConfig::default(),
    };
    let mut reader = GaugeReader::start(config)?;

    // --- CSV Setup ---
    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
    let csv_filename = format!("gauge_data_{}.csv", timestamp);
    let mut wtr = Writer::from_path(&csv_filename)?;
    println!("Writing data to {}", csv_filename);
    wtr.write_record(["seq", "received_at", "value", "level", "asset"])?;

    // --- Graceful Shutdown Setup ---
    let stop = reader.stop_handle();
    ctrlc::set_handler(move || stop.request())?;
    println!("Press Ctrl+C to stop recording.");

    // --- Status & Loop Setup ---
    let mut sample_count = 0u64;
    let mut last_status_time = Instant::now();
    let mut samples_since_update = 0u64;
    let mut status = String::from("Starting");
    let status_interval = Duration::from_millis(500);

    loop {
        match reader.recv_timeout(Duration::from_millis(10)) {
            Ok(Some(notification)) => match notification.event {
                Event::Sample(reading) => {
                    sample_count += 1;
                    samples_since_update += 1;
                    write_csv_record(&mut wtr, &reading, notification.seq)?;
                }
                Event::StateChanged { state, .. } => status = state.to_string(),
                Event::Error(message) => log::warn!("{}", message),
            },
            Ok(None) => {}
            // Worker finished and every notification has been written
            Err(_) => break,
        }

        // --- Status Update ---
        let now = Instant::now();
        if now.duration_since(last_status_time) >= status_interval {
            let elapsed_secs = now.duration_since(last_status_time).as_secs_f64();
            let rate = samples_since_update as f64 / elapsed_secs;

            print!(
                "\rStatus | {:<30} | Rate: {:>6.2} Hz | Samples: {:>8} | Dropped: {:>5}",
                status,
                rate,
                sample_count,
                reader.dropped_count()
            );
            io::stdout().flush()?;

            last_status_time = now;
            samples_since_update = 0;
        }
    }

    // --- Finalization ---
    wtr.flush()?;
    reader.stop()?;

    println!("\n\nFinished recording.");
    println!("Wrote {} samples to {}", sample_count, csv_filename);
    println!("Malformed lines: {}", reader.stats().malformed());
    println!("Total samples dropped: {}", reader.dropped_count());
    Ok(())
}
