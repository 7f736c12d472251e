use std::env;
use std::io;
use std::path;
use std::process::ExitCode;

use chromdata::prelude::*;

fn describe(path: &path::Path) -> io::Result<bool> {
    let outcome = FormatDispatcher::default().import_path(path);
    println!("Path: {}", path.display());
    println!("Format: {}", outcome.format);
    println!(
        "State: {} after {:0.3} seconds, {} bytes",
        outcome.state,
        outcome.elapsed.as_secs_f64(),
        outcome.bytes_read
    );
    if let Some(error) = outcome.error.as_ref() {
        println!("Error: {error}");
    }
    let done = outcome.is_done();
    let Some(record) = outcome.record else {
        return Ok(done);
    };
    for (name, value) in record.header.iter() {
        if !value.is_absent() {
            println!("  {name}: {value:?}");
        }
    }
    println!("Flags: {}", record.flags);
    println!(
        "Points: {} ({} / {})",
        record.len(),
        record.units.intensity,
        record.units.time
    );
    if let Some((start, end)) = record.time_range() {
        println!("Time range: {start:0.4} - {end:0.4}");
    }
    if let Some((time, value)) = record.apex() {
        println!("Apex: {value:0.4} at {time:0.4}");
    }
    if record.is_multichannel() {
        println!(
            "Channels: {} ({})",
            record.channel_count(),
            record.units.channel
        );
    }
    Ok(done)
}

fn main() -> io::Result<ExitCode> {
    let paths: Vec<path::PathBuf> = env::args().skip(1).map(path::PathBuf::from).collect();
    if paths.is_empty() {
        eprintln!("Please pass one or more chromatogram file paths");
        return Ok(ExitCode::FAILURE);
    }
    let mut all_done = true;
    for path in paths.iter() {
        all_done &= describe(path)?;
    }
    Ok(if all_done {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
