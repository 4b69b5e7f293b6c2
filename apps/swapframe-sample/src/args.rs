//! Command line parsing.

use std::time::Duration;

use anyhow::{bail, Context};
use swapframe_app::{AppConfig, PresentPreference, Variant};

/// Build the app configuration from the arguments after the program name.
pub fn parse(args: &[String]) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::new("swapframe sample");
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--variant" => {
                let value = value_of(&mut iter, arg)?;
                let variant: Variant = value.parse()?;
                config = config.with_variant(variant);
            }
            "--frames" => {
                let value = value_of(&mut iter, arg)?;
                let frames = value
                    .parse()
                    .with_context(|| format!("invalid frame count: {value}"))?;
                config = config.with_frame_limit(frames);
            }
            "--size" => {
                let value = value_of(&mut iter, arg)?;
                let (width, height) = parse_size(value)?;
                config = config.with_size(width, height);
            }
            "--fifo" => config = config.with_present(PresentPreference::Fifo),
            "--fence-timeout-ms" => {
                let value = value_of(&mut iter, arg)?;
                let ms = value
                    .parse()
                    .with_context(|| format!("invalid timeout: {value}"))?;
                config = config.with_fence_timeout(Duration::from_millis(ms));
            }
            "--validation" => config = config.with_validation(true),
            "--no-validation" => config = config.with_validation(false),
            other => bail!("unknown argument: {other} (see --help)"),
        }
    }

    Ok(config)
}

fn value_of<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str) -> anyhow::Result<&'a str> {
    iter.next()
        .map(String::as_str)
        .with_context(|| format!("{flag} expects a value"))
}

fn parse_size(value: &str) -> anyhow::Result<(u32, u32)> {
    let Some((width, height)) = value.split_once('x') else {
        bail!("invalid size: {value} (expected WxH)");
    };
    let width: u32 = width.parse().with_context(|| format!("invalid width: {width}"))?;
    let height: u32 = height
        .parse()
        .with_context(|| format!("invalid height: {height}"))?;
    if width == 0 || height == 0 {
        bail!("window size must be non-zero: {value}");
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn no_arguments_gives_defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.variant, Variant::ClearPass);
        assert_eq!(config.present, PresentPreference::LowLatency);
        assert_eq!(config.frame_limit, None);
        assert_eq!((config.width, config.height), (1280, 720));
    }

    #[test]
    fn parses_every_option() {
        let config = parse(&args(&[
            "--variant",
            "image-clear",
            "--frames",
            "120",
            "--size",
            "800x600",
            "--fifo",
            "--fence-timeout-ms",
            "250",
            "--no-validation",
        ]))
        .unwrap();

        assert_eq!(config.variant, Variant::ImageClear);
        assert_eq!(config.frame_limit, Some(120));
        assert_eq!((config.width, config.height), (800, 600));
        assert_eq!(config.present, PresentPreference::Fifo);
        assert_eq!(config.fence_timeout, Some(Duration::from_millis(250)));
        assert!(!config.validation);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(&args(&["--frames"])).is_err());
        assert!(parse(&args(&["--frames", "many"])).is_err());
        assert!(parse(&args(&["--variant", "wireframe"])).is_err());
        assert!(parse(&args(&["--size", "0x10"])).is_err());
        assert!(parse(&args(&["--size", "640"])).is_err());
        assert!(parse(&args(&["--turbo"])).is_err());
    }
}
