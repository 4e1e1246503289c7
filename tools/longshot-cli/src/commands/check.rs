//! Check system capabilities.

use longshot_common::config::{config_file_path, AppConfig};
use longshot_media::source::command_exists;
use longshot_media::{FfmpegFrameSource, FrameSource};

pub fn run(config: &AppConfig, write_config: bool) -> anyhow::Result<()> {
    println!("Longshot System Check");
    println!("{}", "=".repeat(50));

    let mut ready = true;
    for (binary, purpose) in [("ffmpeg", "frame decoding"), ("ffprobe", "video probing")] {
        if command_exists(binary) {
            println!("[OK] {binary} found ({purpose})");
        } else {
            ready = false;
            println!("[MISSING] {binary} not found on PATH ({purpose})");
        }
    }
    let source = FfmpegFrameSource::new();
    println!("     Frame source: {} (available: {})", source.name(), source.is_available());

    println!();
    let config_path = config_file_path();
    if write_config {
        config.save()?;
        println!("[OK] Wrote config to {}", config_path.display());
    } else if config_path.exists() {
        println!("[OK] Config: {}", config_path.display());
    } else {
        println!("[OK] Config: defaults ({} not present)", config_path.display());
    }
    println!("     Data directory: {}", config.data_dir.display());
    println!("     Worker slots: {}", config.queue.max_concurrency);
    println!(
        "     Max source size: {} MB",
        config.queue.max_source_bytes / (1024 * 1024)
    );

    match super::open_store(config) {
        Ok(_) => println!("[OK] Task database: {}", config.database_path().display()),
        Err(e) => {
            ready = false;
            println!("[FAIL] {e:#}");
        }
    }

    println!();
    if ready {
        println!("All required capabilities are available. Longshot is ready.");
    } else {
        println!("Some required capabilities are missing. Install ffmpeg or fix the paths above.");
    }

    Ok(())
}
