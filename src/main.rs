use clap::{Parser, Subcommand};
use dialoguer::{Input, Password};
use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use streamx::{
    AppState, CachedLookup, CatalogLookup, Category, Config, DiscoverFilters, FileStore,
    IdentifierResolver, KeyValueStore, KinoBdClient, MediaType, PlaybackRequest, Resolution,
    StreamXError, TitleDetails, TitleIdentifiers, TitleSummary, TmdbClient, WatchlistEntry,
    plan_playback, validate_login_form, validate_signup_form,
};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "streamx", version, about = "Browse titles, keep a watchlist and find players")]
struct Args {
    /// Configuration file (defaults to <config dir>/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for accounts and watchlists
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and sign in
    Signup {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Sign in to an existing account
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Sign out
    Logout,
    /// Show the signed-in account
    Whoami,
    /// Manage the watchlist of the signed-in account
    Watchlist {
        #[command(subcommand)]
        action: WatchlistAction,
    },
    /// Trending titles
    Trending {
        /// all, movie or tv
        #[arg(long, default_value = "all")]
        media_type: String,
        /// day or week
        #[arg(long, default_value = "week")]
        window: String,
    },
    /// Curated lists such as popular or top rated
    Browse {
        #[arg(value_enum)]
        category: Category,
        #[arg(long, value_enum, default_value = "movie")]
        media_type: MediaType,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Find titles by genre, year and rating
    Discover {
        #[arg(long, value_enum, default_value = "movie")]
        media_type: MediaType,
        /// Genre id; repeat to require several
        #[arg(long = "genre")]
        genres: Vec<u64>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        min_rating: Option<f64>,
        /// Sort order, e.g. vote_average.desc (defaults to popularity.desc)
        #[arg(long)]
        sort_by: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// List genre ids and names
    Genres {
        #[arg(long, value_enum, default_value = "movie")]
        media_type: MediaType,
    },
    /// Search movies and series
    Search {
        query: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Show details, cast and related titles
    Details {
        tmdb_id: u64,
        #[arg(long, value_enum, default_value = "movie")]
        media_type: MediaType,
    },
    /// Resolve the Kinopoisk id of a title
    Resolve {
        #[command(flatten)]
        title: TitleArgs,
    },
    /// List the players available for a title
    Play {
        /// TMDB id; details are fetched when an API key is configured
        tmdb_id: Option<u64>,
        #[arg(long, value_enum, default_value = "movie")]
        media_type: MediaType,
        /// Index of the player to open
        #[arg(long, default_value_t = 0)]
        source: usize,
        #[command(flatten)]
        title: TitleArgs,
    },
}

#[derive(Subcommand)]
enum WatchlistAction {
    /// Show saved titles
    List,
    /// Save a title
    Add {
        tmdb_id: u64,
        #[arg(long, value_enum, default_value = "movie")]
        media_type: MediaType,
        /// Save without asking TMDB for details
        #[arg(long)]
        title: Option<String>,
    },
    /// Remove a saved title
    Remove { tmdb_id: u64 },
}

#[derive(clap::Args)]
struct TitleArgs {
    #[arg(long)]
    kp_id: Option<String>,
    #[arg(long)]
    imdb_id: Option<String>,
    #[arg(long = "title")]
    name: Option<String>,
    #[arg(long)]
    year: Option<i32>,
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    tracing_subscriber::registry()
        .with(log_filter(verbose, quiet, env.as_deref()))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

/// `-q`/`-v` win; otherwise `RUST_LOG` is used as given, with `info` when it
/// is unset or invalid
fn log_filter(verbose: bool, quiet: bool, env: Option<&str>) -> EnvFilter {
    if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        env.and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    }
}

fn run(args: Args) -> Result<(), StreamXError> {
    let config = Config::load(args.config.as_deref())?;

    let store: Arc<dyn KeyValueStore> = match args.data_dir.as_ref().or(config.data_dir.as_ref()) {
        Some(dir) => Arc::new(FileStore::at(dir)?),
        None => Arc::new(FileStore::open()?),
    };

    let mut app = AppState::restore(Arc::clone(&store));

    match args.command {
        Commands::Signup { name, email } => {
            let name = prompt_or(name, "Name")?;
            let email = prompt_or(email, "Email")?;
            let password = prompt_password(true)?;
            validate_signup_form(&name, &email, &password)?;

            let session = app.signup(&name, &email, &password)?;
            println!("Welcome, {}!", session.name);
        }
        Commands::Login { email } => {
            let email = prompt_or(email, "Email")?;
            let password = prompt_password(false)?;
            validate_login_form(&email, &password)?;

            let session = app.login(&email, &password)?;
            println!("Signed in as {} <{}>", session.name, session.email);
        }
        Commands::Logout => {
            app.logout();
            println!("Signed out.");
        }
        Commands::Whoami => match app.session() {
            Some(session) => println!("{} <{}>", session.name, session.email),
            None => println!("Not signed in."),
        },
        Commands::Watchlist { action } => run_watchlist(&mut app, &config, action)?,
        Commands::Trending { media_type, window } => {
            let tmdb = TmdbClient::new(&config.tmdb, config.request_timeout())?;
            let page = tmdb.trending(&media_type, &window)?;
            print_titles(&page.results);
        }
        Commands::Browse {
            category,
            media_type,
            page,
        } => {
            let tmdb = TmdbClient::new(&config.tmdb, config.request_timeout())?;
            let page = tmdb.by_category(media_type, category, page)?;
            print_titles(&page.results);
        }
        Commands::Discover {
            media_type,
            genres,
            year,
            min_rating,
            sort_by,
            page,
        } => {
            let tmdb = TmdbClient::new(&config.tmdb, config.request_timeout())?;
            let filters = DiscoverFilters {
                sort_by,
                genre_ids: genres,
                year,
                min_rating,
            };
            let page = tmdb.discover(media_type, &filters, page)?;
            print_titles(&page.results);
        }
        Commands::Genres { media_type } => {
            let tmdb = TmdbClient::new(&config.tmdb, config.request_timeout())?;
            for genre in tmdb.genres(media_type)? {
                println!("{:>8}  {}", genre.id, genre.name);
            }
        }
        Commands::Details { tmdb_id, media_type } => {
            let tmdb = TmdbClient::new(&config.tmdb, config.request_timeout())?;
            let details = tmdb.details(media_type, tmdb_id)?;
            print_details(&tmdb, &details, app.watchlist().is_in_watchlist(tmdb_id));
        }
        Commands::Search { query, page } => {
            let tmdb = TmdbClient::new(&config.tmdb, config.request_timeout())?;
            let page = tmdb.search_multi(&query, page)?;
            let titles: Vec<TitleSummary> = page
                .results
                .into_iter()
                .filter(|t| t.media_type.as_deref() != Some("person"))
                .collect();
            print_titles(&titles);
        }
        Commands::Resolve { title } => {
            let resolver = resolver(&config, Arc::clone(&store))?;
            let resolution = resolver.resolve(&TitleIdentifiers {
                kinopoisk_id: title.kp_id,
                imdb_id: title.imdb_id,
                title: title.name,
                year: title.year,
            });

            match resolution {
                Resolution::Found {
                    kinopoisk_id,
                    strategy,
                } => {
                    println!("Kinopoisk id: {} (via {:?})", kinopoisk_id, strategy);
                    match resolver.lookup().film_info(&kinopoisk_id) {
                        Ok(Some(film)) => {
                            let name = film
                                .name_russian
                                .filter(|n| !n.is_empty())
                                .or(film.name_original)
                                .unwrap_or_default();
                            match film.year {
                                Some(year) => println!("  {} ({})", name, year),
                                None => println!("  {}", name),
                            }
                        }
                        Ok(None) => {}
                        Err(e) => tracing::warn!(error = %e, "Failed to fetch film info"),
                    }
                }
                Resolution::NotFound => println!("No sources found for this title."),
            }
        }
        Commands::Play {
            tmdb_id,
            media_type,
            source,
            title,
        } => {
            let mut request = match (tmdb_id, config.tmdb.api_key.is_some()) {
                (Some(id), true) => {
                    let tmdb = TmdbClient::new(&config.tmdb, config.request_timeout())?;
                    PlaybackRequest::from(&tmdb.details(media_type, id)?)
                }
                _ => PlaybackRequest {
                    tmdb_id,
                    ..PlaybackRequest::default()
                },
            };
            request.kinopoisk_id = title.kp_id.or(request.kinopoisk_id);
            request.imdb_id = title.imdb_id.or(request.imdb_id);
            request.year = title.year.or(request.year);
            if let Some(name) = title.name {
                request.title = name;
            }

            let resolver = resolver(&config, Arc::clone(&store))?;
            let plan = plan_playback(&resolver, &request);

            match &plan.kinobd {
                Some(embed) => {
                    println!("KinoBD player (Kinopoisk {}):", embed.kinopoisk_id);
                    println!("  {}", embed.mount_html());
                    println!("  <script src=\"{}\" async></script>", embed.script_url());
                }
                None => println!("KinoBD player unavailable: no Kinopoisk id found."),
            }
            println!();

            let mut selector = plan.sources?;
            let load = selector.select(source)?;
            for (index, available) in selector.available().iter().enumerate() {
                let marker = if index == load.index { '>' } else { ' ' };
                println!(
                    "{} [{}] {} {} - {} ({}, {})",
                    marker,
                    index,
                    available.kind.icon(),
                    available.kind.name(),
                    available.kind.description(),
                    available.kind.quality(),
                    available.kind.voiceovers()
                );
            }
            println!();
            println!("Open: {}", load.url);
        }
    }

    Ok(())
}

fn run_watchlist(app: &mut AppState, config: &Config, action: WatchlistAction) -> Result<(), StreamXError> {
    if app.session().is_none() {
        println!("Sign in to use the watchlist.");
        return Ok(());
    }

    match action {
        WatchlistAction::List => {
            if app.watchlist().is_empty() {
                println!("Your watchlist is empty.");
            }
            for entry in app.watchlist().entries() {
                println!("{:>8}  {}", entry.id, entry.display_title());
            }
        }
        WatchlistAction::Add {
            tmdb_id,
            media_type,
            title,
        } => {
            let entry = match title {
                Some(title) => WatchlistEntry {
                    media_type: Some(media_type.as_str().to_string()),
                    ..WatchlistEntry::new(tmdb_id, title)
                },
                None => {
                    let tmdb = TmdbClient::new(&config.tmdb, config.request_timeout())?;
                    let details = tmdb.details(media_type, tmdb_id)?;
                    WatchlistEntry {
                        media_type: Some(media_type.as_str().to_string()),
                        name: details.name.clone(),
                        poster_path: details.poster_path.clone(),
                        vote_average: details.vote_average,
                        release_date: details.release_date.clone(),
                        first_air_date: details.first_air_date.clone(),
                        ..WatchlistEntry::new(tmdb_id, details.display_title())
                    }
                }
            };

            let shown = entry.display_title().to_string();
            if app.watchlist_mut().add_to_watchlist(entry)? {
                println!("Added {} to your watchlist.", shown);
            } else {
                println!("{} is already in your watchlist.", shown);
            }
        }
        WatchlistAction::Remove { tmdb_id } => {
            app.watchlist_mut().remove_from_watchlist(tmdb_id)?;
            println!("Removed {} from your watchlist.", tmdb_id);
        }
    }

    Ok(())
}

fn resolver(
    config: &Config,
    store: Arc<dyn KeyValueStore>,
) -> Result<IdentifierResolver<CachedLookup<KinoBdClient>>, StreamXError> {
    let kinobd = KinoBdClient::new(config.kinobd.base_url.clone(), config.request_timeout())?;
    Ok(IdentifierResolver::new(CachedLookup::new(kinobd, store)))
}

fn print_titles(titles: &[TitleSummary]) {
    if titles.is_empty() {
        println!("Nothing found.");
    }
    for title in titles {
        let year = title
            .release_year()
            .map(|y| format!(" ({})", y))
            .unwrap_or_default();
        let rating = title
            .vote_average
            .map(|r| format!("  ★ {:.1}", r))
            .unwrap_or_default();
        println!(
            "{:>8}  {}{}{}",
            title.id,
            title.display_title(),
            year,
            rating
        );
    }
}

fn print_details(tmdb: &TmdbClient, details: &TitleDetails, saved: bool) {
    match details.release_year() {
        Some(year) => println!("{} ({})", details.display_title(), year),
        None => println!("{}", details.display_title()),
    }

    let genres: Vec<&str> = details.genres.iter().map(|g| g.name.as_str()).collect();
    if !genres.is_empty() {
        println!("  {}", genres.join(", "));
    }
    if let Some(rating) = details.vote_average {
        println!("  ★ {:.1}", rating);
    }
    if let Some(runtime) = details.runtime.filter(|&m| m > 0) {
        println!("  {} min", runtime);
    }
    if let Some(seasons) = details.number_of_seasons {
        println!("  {} seasons", seasons);
    }
    let directors: Vec<&str> = details.credits.with_job("Director").collect();
    if !directors.is_empty() {
        println!("  Directed by {}", directors.join(", "));
    }
    let cast: Vec<&str> = details.credits.cast.iter().take(5).map(|c| c.name.as_str()).collect();
    if !cast.is_empty() {
        println!("  Starring {}", cast.join(", "));
    }
    if let Some(overview) = details.overview.as_deref().filter(|o| !o.is_empty()) {
        println!();
        println!("{}", overview);
    }
    println!();

    println!("Poster: {}", tmdb.image_url(details.poster_path.as_deref(), "w500"));
    if let Some(trailer) = details.trailer_url() {
        println!("Trailer: {}", trailer);
    }
    if saved {
        println!("In your watchlist.");
    }

    for (label, related) in [("Similar", &details.similar), ("Recommended", &details.recommendations)] {
        let Some(page) = related.as_ref().filter(|p| !p.results.is_empty()) else {
            continue;
        };
        println!();
        println!("{}:", label);
        print_titles(&page.results[..page.results.len().min(5)]);
    }
}

fn prompt_or(value: Option<String>, label: &str) -> Result<String, StreamXError> {
    match value {
        Some(value) => Ok(value),
        None => Input::<String>::new()
            .with_prompt(label)
            .allow_empty(true)
            .interact_text()
            .map_err(prompt_error),
    }
}

fn prompt_password(confirm: bool) -> Result<String, StreamXError> {
    let mut prompt = Password::new().with_prompt("Password").allow_empty_password(true);
    if confirm {
        prompt = prompt.with_confirmation("Repeat password", "Passwords do not match");
    }
    prompt.interact().map_err(prompt_error)
}

fn prompt_error(e: dialoguer::Error) -> StreamXError {
    StreamXError::Io(io::Error::from(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn test_log_filter_respects_env_level() {
        let filter = log_filter(false, false, Some("debug"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));

        let filter = log_filter(false, false, Some("warn,streamx=trace"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn test_log_filter_defaults_and_flags() {
        assert_eq!(log_filter(false, false, None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(log_filter(true, false, Some("warn")).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(log_filter(false, true, Some("trace")).max_level_hint(), Some(LevelFilter::ERROR));
    }

    #[test]
    fn test_cli_parses_discover() {
        let args = Args::try_parse_from([
            "streamx", "discover", "--media-type", "tv", "--genre", "18", "--genre", "80", "--year", "2019",
        ])
        .unwrap();

        match args.command {
            Commands::Discover {
                media_type, genres, year, ..
            } => {
                assert_eq!(media_type, MediaType::Tv);
                assert_eq!(genres, vec![18, 80]);
                assert_eq!(year, Some(2019));
            }
            _ => panic!("expected discover"),
        }
    }
}
