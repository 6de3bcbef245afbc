//! Control commands read from stdin, one per line

use std::str::FromStr;

use anyhow::{anyhow, bail, Context};

/// One control-surface command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Stop,
    /// Set one band's gain in dB
    Gain { band: usize, gain_db: f32 },
    /// Print every band's gain
    Gains,
    /// Return every band to 0dB
    Flat,
    Status,
    /// Print the newest spectrum peak
    Spectrum,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  start              open the stream
  stop               close the stream
  gain <band> <db>   set a band gain (clamped to the configured bounds)
  gains              show all band gains
  flat               set every band to 0dB
  status             lifecycle state and stream counters
  spectrum           newest spectrum peak
  help               this text
  quit               stop and exit";

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or_else(|| anyhow!("empty command"))?;

        let command = match name.to_ascii_lowercase().as_str() {
            "start" => Command::Start,
            "stop" => Command::Stop,
            "gain" => {
                let band = words
                    .next()
                    .context("usage: gain <band> <db>")?
                    .parse()
                    .context("band must be a non-negative integer")?;
                let gain_db = words
                    .next()
                    .context("usage: gain <band> <db>")?
                    .parse()
                    .context("gain must be a number of dB")?;
                Command::Gain { band, gain_db }
            }
            "gains" => Command::Gains,
            "flat" => Command::Flat,
            "status" => Command::Status,
            "spectrum" => Command::Spectrum,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => bail!("unknown command '{}' (try 'help')", other),
        };

        if words.next().is_some() {
            bail!("too many arguments for '{}'", name);
        }
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_commands() {
        assert_eq!("start".parse::<Command>().unwrap(), Command::Start);
        assert_eq!("  STOP ".parse::<Command>().unwrap(), Command::Stop);
        assert_eq!("exit".parse::<Command>().unwrap(), Command::Quit);
        assert_eq!("?".parse::<Command>().unwrap(), Command::Help);
    }

    #[test]
    fn test_gain_command() {
        assert_eq!(
            "gain 2 -6.5".parse::<Command>().unwrap(),
            Command::Gain { band: 2, gain_db: -6.5 }
        );
        assert!("gain".parse::<Command>().is_err());
        assert!("gain 2".parse::<Command>().is_err());
        assert!("gain -1 3".parse::<Command>().is_err());
        assert!("gain 1 loud".parse::<Command>().is_err());
        assert!("gain 1 2 3".parse::<Command>().is_err());
    }

    #[test]
    fn test_unknown_and_empty() {
        assert!("".parse::<Command>().is_err());
        let err = "play".parse::<Command>().unwrap_err();
        assert!(err.to_string().contains("play"));
    }
}
