use std::path::PathBuf;
use std::time::Instant;

use thermal_cli::io::{load_frame, save_frame};
use thermal_cli::thermal_sift::SiftBuilder;
use thermal_cli::{OverlayConfig, OverlayPipeline};

fn main() {
    // thermal image, reference image, output path
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: {} THERMAL REFERENCE [OUTPUT]", args[0]);
        std::process::exit(2);
    }
    let thermal = load_frame(&PathBuf::from(&args[1])).expect("Failed to load thermal image");
    let reference = load_frame(&PathBuf::from(&args[2])).expect("Failed to load reference image");
    let output = args.get(3).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("overlay.jpg"));

    // Precise preset, capped at 4000 features
    let sift = SiftBuilder::new(reference.width(), reference.height())
        .preset_precise()
        .max_features(4000);
    println!("{}", sift.summary());
    let config = OverlayConfig {
        sift: sift.to_config(),
        ..OverlayConfig::default()
    };
    let pipeline = OverlayPipeline::new(config).expect("Settings are valid");

    let t0 = Instant::now();
    let result = pipeline.align("demo", &reference, &thermal);
    let elapsed = t0.elapsed();
    println!("Time taken: {:.2?}", elapsed);

    match result {
        Ok(overlay) => {
            println!("Good matches: {}", overlay.match_count);
            println!("RANSAC inliers: {}", overlay.inlier_count);
            println!("Homography: {:?}", overlay.homography.to_row_major());
            save_frame(&output, &overlay.composite).expect("Failed to save overlay");
            println!("Saved overlay as {}", output.display());
        }
        Err(failure) => {
            println!("Alignment failed before {}: {}", failure.stage, failure.error);
            if let Some(debug) = failure.debug_matches {
                let path = output.with_file_name("debug_matches.jpg");
                save_frame(&path, &debug).expect("Failed to save match visualization");
                println!("Saved match visualization as {}", path.display());
            }
        }
    }
}
