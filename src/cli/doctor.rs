//! Environment readiness check.

use crate::automation::chromium::find_chromium;
use crate::config;
use anyhow::Result;

/// Check Chromium availability and the output directory.
pub async fn run() -> Result<()> {
    println!("Magpie Doctor");
    println!("=============");
    println!();

    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!();

    let chromium = find_chromium();
    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!("[!!] Chromium NOT found. Install Chrome/Chromium or set MAGPIE_CHROMIUM_PATH."),
    }

    let output_dir = config::default_output_dir();
    if output_dir.exists() {
        println!("[OK] Output directory exists: {}", output_dir.display());
    } else {
        println!(
            "[--] Output directory will be created on first run: {}",
            output_dir.display()
        );
    }

    println!();
    if chromium.is_some() {
        println!("Ready.");
    } else {
        println!("Not ready: no browser available.");
    }
    Ok(())
}
