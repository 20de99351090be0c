use anyhow::{Context, bail};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use inquire::{CustomType, Select, Text};
use meteo_core::{Config, DateRange, GeocodeCandidate, Location, WeatherService};
use std::path::PathBuf;
use tracing::{error, warn};

use crate::output::{self, Choice};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "meteo", version, about = "Current and historical temperatures, cached locally")]
pub struct Cli {
    /// Log cache and network activity to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search for a location by name.
    Search {
        /// Place name, e.g. "Paris".
        query: String,
    },

    /// Show current temperature and local time.
    Current {
        /// Place name or "lat, lon".
        #[arg(allow_hyphen_values = true)]
        location: String,

        /// Pick among several matches instead of taking the first.
        #[arg(long)]
        choose: bool,
    },

    /// Show hourly temperatures between two dates.
    History {
        /// One or more place names or "lat, lon" pairs.
        #[arg(required = true)]
        locations: Vec<String>,

        /// First day, YYYY-MM-DD.
        #[arg(long)]
        start: NaiveDate,

        /// Last day, YYYY-MM-DD; yesterday if absent.
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Print every hourly sample, not just the summary.
        #[arg(long)]
        hourly: bool,
    },

    /// Edit settings interactively.
    Configure,

    /// Print where the config file lives.
    ConfigPath,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::ConfigPath => {
                println!("{}", Config::config_file_path()?.display());
                Ok(())
            }
            command => {
                let config = Config::load()?;
                let service = WeatherService::open(&config)
                    .await
                    .context("Failed to open the weather cache")?;

                let result = dispatch(&service, command).await;
                service.close().await;
                result
            }
        }
    }
}

async fn dispatch(service: &WeatherService, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Search { query } => {
            let candidates = service.search(&query).await?;
            print!("{}", output::render_candidates(&query, &candidates));
        }
        Command::Current { location, choose } => {
            let Some(place) = resolve(service, &location, choose).await? else {
                println!("No results for '{location}'.");
                return Ok(());
            };

            let now = Utc::now();
            let current = match service.current(place.location, now).await {
                Ok(current) => Some(current),
                Err(err) => {
                    error!(location = %place.location, error = %err, "could not fetch current conditions");
                    None
                }
            };
            print!("{}", output::render_current(&place, current.as_ref(), now));
        }
        Command::History { locations, start, end, hourly } => {
            let end = end.unwrap_or_else(|| default_end(start, Utc::now().date_naive()));
            let range = DateRange::new(start, end)?;
            let now = Utc::now();

            for input in &locations {
                let place = match resolve(service, input, false).await {
                    Ok(Some(place)) => place,
                    Ok(None) => {
                        println!("No results for '{input}'.");
                        continue;
                    }
                    Err(err) => {
                        println!("Skipping '{input}': {err}");
                        continue;
                    }
                };

                match service.history(place.location, range, now).await {
                    Ok(samples) => {
                        print!("{}", output::render_history(&place, &range, &samples, hourly))
                    }
                    Err(err) => {
                        warn!(location = %place.location, %range, error = %err, "no historical data");
                        println!("{}: {}", Choice(place), output::NOT_AVAILABLE);
                    }
                }
            }
        }
        Command::Configure | Command::ConfigPath => {
            bail!("command does not use the weather service")
        }
    }

    Ok(())
}

/// Coordinates are used as given; anything else goes through location search.
async fn resolve(
    service: &WeatherService,
    input: &str,
    choose: bool,
) -> anyhow::Result<Option<GeocodeCandidate>> {
    if looks_like_coordinates(input) {
        let location: Location = input.parse()?;
        return Ok(Some(GeocodeCandidate {
            display_name: location.to_string(),
            location,
        }));
    }

    let mut candidates = service.search(input).await?;
    if candidates.is_empty() {
        return Ok(None);
    }

    if choose && candidates.len() > 1 {
        let options: Vec<Choice> = candidates.into_iter().map(Choice).collect();
        let Choice(picked) = Select::new("Select a location", options).prompt()?;
        return Ok(Some(picked));
    }

    Ok(Some(candidates.swap_remove(0)))
}

/// Yesterday, the last day the archive has complete, unless `start` is later.
fn default_end(start: NaiveDate, today: NaiveDate) -> NaiveDate {
    today.pred_opt().unwrap_or(today).max(start)
}

fn looks_like_coordinates(input: &str) -> bool {
    input.split_once(',').is_some_and(|(lat, lon)| {
        lat.trim().parse::<f64>().is_ok() && lon.trim().parse::<f64>().is_ok()
    })
}

fn configure() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    let current_db = config.database_path()?;
    let db = Text::new("Cache database path:")
        .with_default(&current_db.display().to_string())
        .prompt()?;
    let db = PathBuf::from(db.trim());
    if db != current_db {
        config.database_path = Some(db);
    }

    config.current_window_minutes = CustomType::<u64>::new("Minutes a current reading stays fresh:")
        .with_default(config.current_window_minutes)
        .prompt()?;

    config.geocoding_results = CustomType::<u8>::new("Search results to show:")
        .with_default(config.geocoding_results)
        .prompt()?;

    config.retry.max_retries = CustomType::<u32>::new("Retries on transient API errors:")
        .with_default(config.retry.max_retries)
        .prompt()?;

    config.save()?;
    println!("Saved configuration to {}", Config::config_file_path()?.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_are_detected() {
        assert!(looks_like_coordinates("48.85, 2.35"));
        assert!(looks_like_coordinates("-33.9,151.2"));
        assert!(looks_like_coordinates("100, 2"));
        assert!(!looks_like_coordinates("Paris"));
        assert!(!looks_like_coordinates("Paris, France"));
    }

    #[test]
    fn history_ends_yesterday_by_default() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let yesterday = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();

        assert_eq!(default_end(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), today), yesterday);
        assert_eq!(default_end(yesterday, today), yesterday);
        assert_eq!(default_end(today, today), today);
    }

    #[test]
    fn history_requires_a_start_date() {
        let err = Cli::try_parse_from(["meteo", "history", "Paris"]).unwrap_err();
        assert!(err.to_string().contains("--start"));
    }

    #[test]
    fn history_accepts_several_locations() {
        let cli = Cli::try_parse_from([
            "meteo", "history", "Paris", "51.5, -0.12", "--start", "2023-01-01", "--end", "2023-01-07",
        ])
        .unwrap();

        match cli.command {
            Command::History { locations, start, end, hourly } => {
                assert_eq!(locations, vec!["Paris", "51.5, -0.12"]);
                assert_eq!(start, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
                assert_eq!(end, NaiveDate::from_ymd_opt(2023, 1, 7));
                assert!(!hourly);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn malformed_dates_are_rejected() {
        assert!(Cli::try_parse_from(["meteo", "history", "Paris", "--start", "01/02/2023"]).is_err());
    }

    #[test]
    fn current_accepts_southern_coordinates() {
        let cli = Cli::try_parse_from(["meteo", "current", "-33.87, 151.21", "--choose"]).unwrap();
        match cli.command {
            Command::Current { location, choose } => {
                assert_eq!(location, "-33.87, 151.21");
                assert!(choose);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn verbose_flag_is_global() {
        let cli = Cli::try_parse_from(["meteo", "current", "Paris", "-v"]).unwrap();
        assert!(cli.verbose);
    }
}
