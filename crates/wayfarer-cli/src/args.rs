//! Command-line argument parsing.

use anyhow::{anyhow, bail, Context, Result};
use wayfarer_core::{GeoLevel, LocationContext};

pub const USAGE: &str = "\
Usage:
  wayfarer stream  --lat <deg> --lon <deg> [location names]
  wayfarer replay  <capture-file> --lat <deg> --lon <deg> [location names]
  wayfarer show
  wayfarer clear-cache

Location names:
  --country <name> --admin-area <name> --sub-admin-area <name>
  --locality <name> --sub-locality <name>
";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Stream(LocationContext),
    Replay { path: String, location: LocationContext },
    Show,
    ClearCache,
    Help,
}

fn level_flag(flag: &str) -> Option<GeoLevel> {
    match flag {
        "--country" => Some(GeoLevel::Country),
        "--admin-area" => Some(GeoLevel::AdminArea),
        "--sub-admin-area" => Some(GeoLevel::SubAdminArea),
        "--locality" => Some(GeoLevel::Locality),
        "--sub-locality" => Some(GeoLevel::SubLocality),
        _ => None,
    }
}

fn parse_location(args: &[String]) -> Result<LocationContext> {
    let mut lat = None;
    let mut lon = None;
    let mut names = Vec::new();

    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let value = iter
            .next()
            .ok_or_else(|| anyhow!("Missing value for {}", flag))?;
        match flag.as_str() {
            "--lat" => lat = Some(value.parse::<f64>().with_context(|| format!("Invalid latitude: {}", value))?),
            "--lon" => lon = Some(value.parse::<f64>().with_context(|| format!("Invalid longitude: {}", value))?),
            other => match level_flag(other) {
                Some(level) => names.push((level, value.clone())),
                None => bail!("Unknown option: {}", other),
            },
        }
    }

    let (Some(lat), Some(lon)) = (lat, lon) else {
        bail!("Both --lat and --lon are required");
    };
    let mut location = LocationContext::new(lat, lon);
    for (level, name) in names {
        location.set_name(level, name);
    }
    Ok(location)
}

/// Parse arguments, excluding the program name.
pub fn parse(args: &[String]) -> Result<Command> {
    let Some((command, rest)) = args.split_first() else {
        return Ok(Command::Help);
    };

    match command.as_str() {
        "stream" => Ok(Command::Stream(parse_location(rest)?)),
        "replay" => {
            let (path, rest) = rest
                .split_first()
                .ok_or_else(|| anyhow!("replay needs a capture file"))?;
            Ok(Command::Replay {
                path: path.clone(),
                location: parse_location(rest)?,
            })
        }
        "show" => Ok(Command::Show),
        "clear-cache" => Ok(Command::ClearCache),
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => bail!("Unknown command: {}", other),
    }
}
