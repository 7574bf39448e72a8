use chrono::{DateTime, Local, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use log::{LevelFilter, error, info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use streamkit::deps::{self, LibraryInstaller, Libraries, SearchPaths};
use streamkit::fetcher::{MergeEvent, MergeState};
use streamkit::selection::SelectionResult;
use streamkit::telemetry::Sample;
use streamkit::utils::{format_file_size, format_time};
use streamkit::{CatalogProvider, FfmpegMuxer, Muxer, ProviderError, YtDlpProvider};
use tubegrab::{
    AppConfig, AppError, AppPaths, BatchRunner, BatchSummary, ConfigStore, DownloadContext,
    DownloadHistoryEntry, HistoryStore, JsonFile, PreparedItem, Session,
    SessionEvent, Target, classify, read_batch_file,
};
use tubegrab::logs::{self, Tee};

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "tubegrab", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(
        long = "verbosity",
        short,
        global = true,
        value_parser = clap::builder::PossibleValuesParser::new([
            "info", "debug", "error", "none", "full"
        ])
    )]
    pub verbosity: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Download a video or a playlist.
    Download {
        /// A video or playlist URL, or a bare id.
        target: String,

        /// A menu token such as `3` or `A1`; empty for the highest quality.
        #[arg(long, short)]
        quality: Option<String>,

        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Print the available qualities and exit.
        #[arg(long = "list-only", action = clap::ArgAction::SetTrue)]
        list_only: bool,
    },
    /// Download every URL listed in a file, one per line.
    Batch {
        file: PathBuf,

        #[arg(long, short)]
        quality: Option<String>,

        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Show or edit the download history.
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Show the latest download of a video id.
        #[arg(long)]
        find: Option<String>,

        /// First day to list (YYYY-MM-DD).
        #[arg(long)]
        since: Option<NaiveDate>,

        /// Last day to list (YYYY-MM-DD).
        #[arg(long)]
        until: Option<NaiveDate>,

        /// Remove every entry of a video id.
        #[arg(long)]
        remove: Option<String>,

        #[arg(long, action = clap::ArgAction::SetTrue)]
        clear: bool,
    },
    /// Show or change settings.
    Config {
        #[arg(long, action = clap::ArgAction::SetTrue)]
        show: bool,

        #[arg(long, action = clap::ArgAction::SetTrue)]
        reset: bool,

        #[arg(long = "download-dir")]
        download_dir: Option<PathBuf>,

        /// `highest`, a menu token, or an empty string to be asked every time.
        #[arg(long)]
        quality: Option<String>,

        #[arg(long)]
        ffmpeg: Option<PathBuf>,

        #[arg(long)]
        ytdlp: Option<PathBuf>,

        #[arg(
            long = "log-level",
            value_parser = clap::builder::PossibleValuesParser::new([
                "info", "debug", "error", "none", "full"
            ])
        )]
        log_level: Option<String>,

        #[arg(long = "playlist-folders")]
        playlist_folders: Option<bool>,

        #[arg(long = "show-info")]
        show_info: Option<bool>,
    },
    /// Find or install yt-dlp and ffmpeg.
    Setup,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Cli::parse();
    let paths = AppPaths::detect()?;
    let mut config = ConfigStore::open(&paths);

    let verbosity = args
        .verbosity
        .clone()
        .unwrap_or_else(|| config.get().log_level.clone());
    let multi = init_logging(&verbosity, &paths.logs_dir())?;

    match args.command {
        Command::Download {
            target,
            quality,
            output,
            list_only,
        } => {
            let session = open_session(&paths, config.get(), &multi).await?;
            download(&session, config.get(), &multi, &target, quality, output, list_only).await
        }
        Command::Batch {
            file,
            quality,
            output,
        } => {
            let session = open_session(&paths, config.get(), &multi).await?;
            batch(&session, config.get(), &multi, file, quality, output).await
        }
        Command::History {
            limit,
            find,
            since,
            until,
            remove,
            clear,
        } => {
            let history = HistoryStore::open(JsonFile::new(paths.history_file()));
            show_history(&history, limit, find, since, until, remove, clear)
        }
        Command::Config {
            show,
            reset,
            download_dir,
            quality,
            ffmpeg,
            ytdlp,
            log_level,
            playlist_folders,
            show_info,
        } => {
            if reset {
                config.reset_to_defaults()?;
            }

            let mut updated = config.get().clone();
            if let Some(dir) = download_dir {
                updated.default_download_directory = dir;
            }
            if let Some(quality) = quality {
                updated.default_quality = quality;
            }
            if let Some(path) = ffmpeg {
                updated.custom_ffmpeg_path = Some(path);
            }
            if let Some(path) = ytdlp {
                updated.custom_ytdlp_path = Some(path);
            }
            if let Some(level) = log_level {
                updated.log_level = level;
            }
            if let Some(enabled) = playlist_folders {
                updated.auto_create_playlist_folder = enabled;
            }
            if let Some(enabled) = show_info {
                updated.show_video_info_before_download = enabled;
            }

            let changed = &updated != config.get();
            if changed {
                config.save(updated)?;
                println!("Configuration saved to: {}", config.path());
            }
            if show || !(changed || reset) {
                println!("{}", serde_json::to_string_pretty(config.get())?);
            }
            Ok(())
        }
        Command::Setup => {
            let libraries = locate_libraries(&paths, config.get(), &multi).await;
            for (name, path) in [("yt-dlp", &libraries.ytdlp), ("ffmpeg", &libraries.ffmpeg)] {
                match path {
                    Some(path) => {
                        let flag = if name == "ffmpeg" { "-version" } else { "--version" };
                        let version = deps::probe(path, flag).await.unwrap_or_default();
                        let version = deps::ffmpeg_version(&version).unwrap_or(version);
                        println!("{name}: {} ({version})", path.display());
                    }
                    None => println!("{name}: not available"),
                }
            }
            Ok(())
        }
    }
}

fn init_logging(verbosity: &str, logs_dir: &Path) -> CliResult<MultiProgress> {
    let level = match verbosity {
        "debug" => LevelFilter::Debug,
        "error" => LevelFilter::Error,
        "none" => LevelFilter::Off,
        "full" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    let mut builder = env_logger::Builder::new();
    if verbosity == "full" {
        builder.filter_level(level);
    } else {
        builder
            .filter_level(LevelFilter::Warn.min(level))
            .filter_module("tubegrab", level)
            .filter_module("streamkit", level);
    }
    let log_file = match logs::open_daily(logs_dir, Local::now().date_naive()) {
        Ok(file) => {
            builder
                .format_timestamp_secs()
                .target(env_logger::Target::Pipe(Box::new(Tee::new(std::io::stderr(), file))));
            None
        }
        Err(e) => {
            builder.format_timestamp(None);
            Some(e)
        }
    };
    let logger = builder.build();

    let multi = MultiProgress::new();
    LogWrapper::new(multi.clone(), logger).try_init()?;
    log::set_max_level(level);

    if let Some(e) = log_file {
        warn!("Logging to the console only, the log file could not be opened: {}", e);
    }

    Ok(multi)
}

fn spinner(multi: &MultiProgress, message: &str) -> ProgressBar {
    let pb = multi.add(ProgressBar::new_spinner());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb
}

fn make_progress_bar(size: u64) -> ProgressBar {
    let bar = ProgressBar::new(size);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} - {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━━╌"),
    );
    bar
}

async fn locate_libraries(paths: &AppPaths, config: &AppConfig, multi: &MultiProgress) -> Libraries {
    let search = SearchPaths::new(
        paths.libs_dir.clone(),
        config.custom_ytdlp_path.clone(),
        config.custom_ffmpeg_path.clone(),
    );
    let libraries = Libraries::locate(&search).await;
    if libraries.is_complete() {
        return libraries;
    }

    let pb = spinner(multi, "Installing missing tools...");
    let libraries = libraries
        .install_missing(&LibraryInstaller::new(paths.libs_dir.clone()))
        .await;
    pb.finish_and_clear();

    libraries
}

async fn open_session(paths: &AppPaths, config: &AppConfig, multi: &MultiProgress) -> CliResult<Session> {
    let libraries = locate_libraries(paths, config, multi).await;
    let ytdlp = libraries
        .ytdlp
        .ok_or("yt-dlp is not available: install it or set its path with `tubegrab config --ytdlp`")?;

    let provider: Arc<dyn CatalogProvider> = Arc::new(YtDlpProvider::new(ytdlp));
    let muxer = libraries
        .ffmpeg
        .map(|ffmpeg| Arc::new(FfmpegMuxer::new(ffmpeg)) as Arc<dyn Muxer>);
    if muxer.is_none() {
        warn!("ffmpeg is not available: qualities that need merging are disabled");
    }

    let history = Arc::new(HistoryStore::open(JsonFile::new(paths.history_file())));
    Ok(Session::new(provider, muxer, history))
}

/// Draws telemetry samples as progress bars.
struct ProgressReporter {
    multi: MultiProgress,
    bar: Option<ProgressBar>,
    merging: Option<ProgressBar>,
}

impl ProgressReporter {
    fn new(multi: &MultiProgress) -> Self {
        Self {
            multi: multi.clone(),
            bar: None,
            merging: None,
        }
    }

    fn update(&mut self, label: &str, sample: &Sample) {
        let multi = &self.multi;
        let bar = self
            .bar
            .get_or_insert_with(|| multi.add(make_progress_bar(sample.total_bytes)));

        bar.set_length(sample.total_bytes);
        bar.set_position(sample.bytes_so_far);
        bar.set_message(sample.describe(label));

        if sample.finished {
            bar.finish_and_clear();
            self.bar = None;
        }
    }

    fn on_event(&mut self, event: SessionEvent<'_>) {
        match event {
            SessionEvent::Selected(SelectionResult::Direct(encoding)) => {
                info!("Downloading {}", encoding)
            }
            SessionEvent::Selected(SelectionResult::MergePair { video, audio }) => {
                info!("Downloading {} and {}, then merging", video.quality_label(), audio.quality_label())
            }
            SessionEvent::Selected(SelectionResult::UseHighest) => {}
            SessionEvent::Transfer(sample) => self.update("Downloading", sample),
            SessionEvent::Merge(MergeEvent::Progress { stage, sample }) => {
                self.update(&stage.to_string(), sample)
            }
            SessionEvent::Merge(MergeEvent::State(MergeState::Merging)) => {
                self.merging = Some(spinner(&self.multi, "Merging video and audio..."));
            }
            SessionEvent::Merge(MergeEvent::State(MergeState::Done | MergeState::Failed)) => {
                for bar in [self.bar.take(), self.merging.take()].into_iter().flatten() {
                    bar.finish_and_clear();
                }
            }
            SessionEvent::Merge(MergeEvent::State(_)) => {}
        }
    }
}

/// A message for the categories a user can act on.
fn describe_failure(e: &AppError) -> String {
    let stage = e
        .pipeline()
        .and_then(|e| e.merge_stage())
        .map(|stage| format!(" (during {stage})"))
        .unwrap_or_default();

    match e.pipeline().and_then(|e| e.provider_cause()) {
        Some(ProviderError::Unavailable(_)) => {
            format!("This video is unavailable: it may be private, removed or region-blocked{stage}")
        }
        Some(ProviderError::Unplayable(_)) => {
            format!("This video cannot be downloaded: it may need a sign-in or be age-restricted{stage}")
        }
        Some(ProviderError::RateLimited(_)) => {
            format!("YouTube is limiting requests, please try again later{stage}")
        }
        Some(ProviderError::Network(_)) => {
            format!("A network error occurred, check your connection{stage}")
        }
        _ => e.to_string(),
    }
}

fn print_details(item: &PreparedItem) {
    let details = &item.details;
    println!("Title:    {}", details.title);
    println!("Channel:  {}", details.channel);
    if let Some(duration) = details.duration_secs {
        println!("Duration: {}", format_time(duration));
    }
    println!("URL:      {}", details.url);
}

fn print_menu(item: &PreparedItem) {
    let menu = item.menu();
    for entry in menu.render() {
        println!("  {:>4}  {}", entry.token, entry.label);
    }

    let hidden = menu.unaddressable_video_count();
    if hidden > 0 {
        println!("  ({hidden} video-only qualities hidden: there is no audio to merge them with)");
    }
}

fn prompt_token(item: &PreparedItem) -> CliResult<String> {
    let menu = item.menu();
    let mut input = String::new();

    loop {
        print!("Select a quality (Enter for highest): ");
        std::io::stdout().flush()?;
        input.clear();
        if std::io::stdin().read_line(&mut input)? == 0 {
            return Ok(String::new());
        }

        match menu.resolve(&input) {
            Ok(_) => return Ok(input.trim().to_string()),
            Err(e) => println!("{e}"),
        }
    }
}

async fn download(
    session: &Session,
    config: &AppConfig,
    multi: &MultiProgress,
    target: &str,
    quality: Option<String>,
    output: Option<PathBuf>,
    list_only: bool,
) -> CliResult<()> {
    let output_dir = output.unwrap_or_else(|| config.default_download_directory.clone());
    let quality = quality.or_else(|| config.default_token());
    let mut reporter = ProgressReporter::new(multi);
    let mut observer = |event: SessionEvent<'_>| reporter.on_event(event);

    match classify(target) {
        Target::SingleItem(media_id) => {
            let pb = spinner(multi, "Fetching video info...");
            let item = session.prepare(&media_id).await;
            pb.finish_and_clear();
            let item = item.inspect_err(|e| error!("{}", describe_failure(e)))?;

            if config.show_video_info_before_download || list_only {
                print_details(&item);
            }
            if list_only {
                print_menu(&item);
                return Ok(());
            }

            let token = match quality {
                Some(token) => token,
                None => {
                    print_menu(&item);
                    prompt_token(&item)?
                }
            };

            let outcome = session
                .download_prepared(&item, &token, &output_dir, &DownloadContext::single(), Some(&mut observer))
                .await
                .inspect_err(|e| error!("{}", describe_failure(e)))?;
            println!("{}: {}", item.details.title, outcome);
            Ok(())
        }
        Target::Playlist(playlist_id) => {
            if list_only {
                let playlist = session.provider().fetch_playlist(&playlist_id).await?;
                println!("{} ({} videos)", playlist.title, playlist.entries.len());
                for (position, entry) in playlist.entries.iter().enumerate() {
                    println!("  {:>4}  {}", position + 1, entry.title.as_deref().unwrap_or(&entry.id));
                }
                return Ok(());
            }

            let token = quality.unwrap_or_else(|| {
                info!("Playlists use one quality for every video, downloading the highest");
                String::new()
            });
            let runner = BatchRunner::new(session, token, output_dir)
                .with_playlist_folders(config.auto_create_playlist_folder);
            let outcomes = runner
                .run_playlist(&playlist_id, Some(&mut observer))
                .await
                .inspect_err(|e| error!("{}", describe_failure(e)))?;

            print_summary(&outcomes.into_iter().collect());
            Ok(())
        }
        Target::Invalid => Err(AppError::InvalidTarget(target.to_string()).into()),
    }
}

async fn batch(
    session: &Session,
    config: &AppConfig,
    multi: &MultiProgress,
    file: PathBuf,
    quality: Option<String>,
    output: Option<PathBuf>,
) -> CliResult<()> {
    let targets = read_batch_file(&file)?;
    if targets.is_empty() {
        println!("No URLs found in {}", file.display());
        return Ok(());
    }

    let output_dir = output.unwrap_or_else(|| config.default_download_directory.clone());
    let token = quality.or_else(|| config.default_token()).unwrap_or_default();
    let mut reporter = ProgressReporter::new(multi);
    let mut observer = |event: SessionEvent<'_>| reporter.on_event(event);

    println!("Found {} URLs in {}", targets.len(), file.display());
    let summary = BatchRunner::new(session, token, output_dir)
        .with_playlist_folders(config.auto_create_playlist_folder)
        .run(&targets, Some(&mut observer))
        .await;

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &BatchSummary) {
    println!(
        "Finished {} downloads: {} succeeded, {} skipped, {} failed",
        summary.total(),
        summary.succeeded,
        summary.skipped,
        summary.failed
    );
    for (item, reason) in &summary.failures {
        println!("  {}: {}", item, reason);
    }
}

fn print_entry(entry: &DownloadHistoryEntry) {
    let playlist = entry
        .playlist_title
        .as_deref()
        .map(|title| format!(" [playlist: {title}]"))
        .unwrap_or_default();

    println!(
        "{}  {}{}  ({}, {})  {}",
        entry.download_date.format("%Y-%m-%d %H:%M"),
        entry.video_title,
        playlist,
        entry.quality,
        format_file_size(entry.file_size_bytes),
        entry.file_path.display()
    );
}

fn show_history(
    history: &HistoryStore,
    limit: usize,
    find: Option<String>,
    since: Option<NaiveDate>,
    until: Option<NaiveDate>,
    remove: Option<String>,
    clear: bool,
) -> CliResult<()> {
    if clear {
        history.clear()?;
        println!("Download history cleared");
        return Ok(());
    }

    if let Some(video_id) = remove {
        let removed = history.remove(&video_id)?;
        println!("Removed {removed} entries for {video_id}");
        return Ok(());
    }

    if let Some(video_id) = find {
        match history.find_by_media_id(&video_id) {
            Some(entry) => print_entry(&entry),
            None => println!("No download found for {video_id}"),
        }
        return Ok(());
    }

    let entries = if since.is_some() || until.is_some() {
        let start = since
            .map(|day| day.and_time(NaiveTime::MIN).and_utc())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let end = match until {
            Some(day) => day
                .and_hms_nano_opt(23, 59, 59, 999_999_999)
                .ok_or("invalid --until date")?
                .and_utc(),
            None => DateTime::<Utc>::MAX_UTC,
        };
        history.list_by_date_range(start, end)
    } else {
        history.list(Some(limit))
    };

    if entries.is_empty() {
        println!("No downloads yet");
    }
    for entry in &entries {
        print_entry(entry);
    }
    println!("{} of {} entries ({})", entries.len(), history.len(), history.location());

    Ok(())
}
