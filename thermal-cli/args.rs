use std::path::PathBuf;

use crate::{OverlayError, PipelineResult};

pub const USAGE: &str = "\
Usage: thermal-overlay [OPTIONS] [INPUT_DIR] [OUTPUT_DIR]

Registers every <ID>_T thermal image onto its <ID>_Z reference image and writes
<ID>_overlay images to OUTPUT_DIR.

Arguments:
  INPUT_DIR             Directory with image pairs [default: input-images]
  OUTPUT_DIR            Directory for overlays [default: output-images]

Options:
  -c, --config FILE     Settings file (.toml or .json)
  -l, --log-level LEVEL Log level or filter spec [default: info]
      --log-dir DIR     Also write a rotating log file to DIR
  -h, --help            Print this help";

/// Command line arguments of `thermal-overlay`
#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub help: bool,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            config: None,
            log_level: "info".to_string(),
            log_dir: None,
            input_dir: PathBuf::from("input-images"),
            output_dir: PathBuf::from("output-images"),
            help: false,
        }
    }
}

impl CliArgs {
    /// Parse arguments, excluding the program name
    pub fn parse<I>(args: I) -> PipelineResult<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = CliArgs::default();
        let mut positional = Vec::new();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) if flag.starts_with("--") => (flag.to_string(), Some(value.to_string())),
                _ => (arg.clone(), None),
            };
            let mut value = |name: &str| {
                inline
                    .clone()
                    .or_else(|| args.next())
                    .ok_or_else(|| OverlayError::Config(format!("{} requires a value", name)))
            };
            match flag.as_str() {
                "-h" | "--help" => parsed.help = true,
                "-c" | "--config" => parsed.config = Some(PathBuf::from(value(&flag)?)),
                "-l" | "--log-level" => parsed.log_level = value(&flag)?,
                "--log-dir" => parsed.log_dir = Some(PathBuf::from(value(&flag)?)),
                _ if flag.starts_with('-') && flag.len() > 1 => {
                    return Err(OverlayError::Config(format!("unknown option {}", flag)));
                }
                _ => positional.push(arg),
            }
        }

        let mut positional = positional.into_iter();
        if let Some(input) = positional.next() {
            parsed.input_dir = PathBuf::from(input);
        }
        if let Some(output) = positional.next() {
            parsed.output_dir = PathBuf::from(output);
        }
        if let Some(extra) = positional.next() {
            return Err(OverlayError::Config(format!("unexpected argument {}", extra)));
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> PipelineResult<CliArgs> {
        CliArgs::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]).unwrap();
        assert_eq!(args, CliArgs::default());
        assert_eq!(args.input_dir, PathBuf::from("input-images"));
        assert_eq!(args.output_dir, PathBuf::from("output-images"));
        assert_eq!(args.log_level, "info");
    }

    #[test]
    fn test_options_and_positionals() {
        let args = parse(&["--config", "run.toml", "in", "-l", "debug", "out", "--log-dir=logs"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("run.toml")));
        assert_eq!(args.log_level, "debug");
        assert_eq!(args.log_dir, Some(PathBuf::from("logs")));
        assert_eq!(args.input_dir, PathBuf::from("in"));
        assert_eq!(args.output_dir, PathBuf::from("out"));
        assert!(!args.help);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse(&["--config"]), Err(OverlayError::Config(_))));
        assert!(matches!(parse(&["--verbose"]), Err(OverlayError::Config(_))));
        assert!(matches!(parse(&["a", "b", "c"]), Err(OverlayError::Config(_))));
        assert!(parse(&["-h"]).unwrap().help);
    }
}
