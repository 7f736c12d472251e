use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time;

use clap::Parser;

use chromdata::io::{BatchImporter, DetailLevel, ImportOptions, ProgressEvent};

/// Import chromatogram files in parallel and report what was read
#[derive(Parser, Debug)]
struct App {
    /// The files to import
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Only read the total signal of multi-channel files
    #[arg(short, long, default_value_t = false)]
    lazy: bool,

    /// Only read file headers
    #[arg(short, long, default_value_t = false)]
    metadata_only: bool,

    /// Keep only scans of this MS level
    #[arg(long)]
    ms_level: Option<u8>,

    /// Decimal places m/z channels are rounded to
    #[arg(long, default_value_t = chromdata::chromatogram::MZ_PRECISION)]
    mz_precision: u32,
}

impl App {
    fn options(&self) -> ImportOptions {
        let detail_level = if self.metadata_only {
            DetailLevel::MetadataOnly
        } else if self.lazy {
            DetailLevel::Lazy
        } else {
            DetailLevel::Full
        };
        ImportOptions::default()
            .detail_level(detail_level)
            .ms_level(self.ms_level)
            .mz_precision(self.mz_precision)
    }
}

fn main() -> io::Result<()> {
    env_logger::init();
    let app = App::parse();
    let start = time::Instant::now();
    let finished = AtomicUsize::new(0);

    let importer = BatchImporter::new(app.options());
    let outcomes = importer.import_paths(&app.paths, |event: &ProgressEvent| {
        let n = finished.fetch_add(1, Ordering::SeqCst) + 1;
        eprintln!(
            "[{n}/{}] {} {} ({} bytes, {:0.3} seconds)",
            event.total,
            event.path.display(),
            event.state,
            event.bytes,
            event.elapsed.as_secs_f64()
        );
    });

    let mut failed = 0;
    for outcome in outcomes.iter() {
        match outcome.record.as_ref() {
            Some(record) => println!(
                "{}\t{}\t{}\t{} points\t{} channels\t{}",
                outcome.source,
                outcome.format,
                outcome.state,
                record.len(),
                record.channel_count(),
                record.flags
            ),
            None => println!("{}\t{}\t{}", outcome.source, outcome.format, outcome.state),
        }
        if !outcome.is_done() {
            failed += 1;
        }
    }
    eprintln!(
        "Imported {} files ({failed} failed) in {:0.3} seconds",
        outcomes.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
