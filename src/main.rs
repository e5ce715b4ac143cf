//! tweetkeep - searchable archive of one X timeline
//!
//! Main entry point for the tweetkeep command-line tool.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::time::Duration;

use tweetkeep::cli::{self, Cli, Commands, OutputFormat};
use tweetkeep::logging::init_cli_logging;
use tweetkeep::{
    Archive, ArchiveError, CONTENT_DIVIDER_WIDTH, Config, HttpUpstream, ListKind, Record, SortKey,
    Storage, VALID_CONFIG_KEYS, VALID_LIST_KINDS, VALID_ORDER_FIELDS, cache, format_error,
    format_number, format_optional_date, format_relative_date, format_unknown_value_error, ranking,
};

fn main() {
    let cli = Cli::parse();
    let config = resolve_config(&cli);

    init_cli_logging(config.output.quiet, cli.verbose, config.output.colors);
    if !config.output.colors {
        colored::control::set_override(false);
    }

    if let Err(err) = run(&cli, config) {
        report_error(&err);
        std::process::exit(1);
    }
}

/// Layer CLI flags over file and environment configuration.
fn resolve_config(cli: &Cli) -> Config {
    let mut config = match &cli.config {
        Some(path) => Config::load_with(Some(path)),
        None => Config::load(),
    };

    if let Some(db) = &cli.db {
        config.paths.db = Some(db.clone());
    }
    if let Some(handle) = &cli.handle {
        config.account.handle = handle.trim_start_matches('@').to_string();
    }
    if cli.quiet {
        config.output.quiet = true;
    }
    if cli.no_color {
        config.output.colors = false;
    }
    config
}

fn run(cli: &Cli, mut config: Config) -> Result<()> {
    let format = cli
        .format
        .unwrap_or_else(|| OutputFormat::from_config(&config.output.format));

    match &cli.command {
        Commands::Sync(args) | Commands::Reconcile(args) => {
            if let Some(deadline) = args.deadline {
                config.upstream.deadline_secs = deadline;
            }
            if matches!(cli.command, Commands::Sync(_)) {
                cmd_sync(config, format)
            } else {
                cmd_reconcile(config, format)
            }
        }
        Commands::Search(args) => cmd_search(config, format, args),
        Commands::List(args) => cmd_list(config, format, args),
        Commands::Show(args) => cmd_show(config, format, args),
        Commands::Profile(args) => cmd_profile(config, format, args),
        Commands::ToggleDelete(args) => cmd_toggle_delete(config, format, args),
        Commands::Import(args) => cmd_import(config, format, args),
        Commands::Stats => cmd_stats(config, format),
        Commands::Config(args) => cmd_config(cli, &config, args),
        Commands::Completions(args) => {
            cmd_completions(args);
            Ok(())
        }
    }
}

fn report_error(err: &anyhow::Error) {
    if let Some(archive_err) = err.downcast_ref::<ArchiveError>() {
        let suggestions: Vec<&str> = archive_err.suggestion().into_iter().collect();
        eprintln!("{}", format_error(&archive_err.to_string(), "", &suggestions));
    } else {
        eprintln!("{err:#}");
    }
}

fn open_archive(config: Config, create: bool) -> Result<Archive<Storage, HttpUpstream>> {
    let db_path = config.db_path();
    let store = if create {
        Storage::open(&db_path)?
    } else {
        Storage::open_existing(&db_path)?
    };
    let upstream = HttpUpstream::new(&config.upstream)?;
    let cache = cache::from_config(&config.cache);
    Ok(Archive::new(store, upstream, cache, config))
}

fn spinner(format: OutputFormat, quiet: bool, message: &'static str) -> ProgressBar {
    if quiet || format != OutputFormat::Text {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn print_json<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> Result<()> {
    let json = if format == OutputFormat::JsonPretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}

fn cmd_sync(config: Config, format: OutputFormat) -> Result<()> {
    let quiet = config.output.quiet;
    let mut archive = open_archive(config, true)?;

    let pb = spinner(format, quiet, "Fetching new items...");
    let result = archive.sync();
    pb.finish_and_clear();
    let records = result?;

    if format.is_json() {
        #[derive(Serialize)]
        struct SyncOutput<'a> {
            stored: usize,
            records: &'a [Record],
        }
        return print_json(
            &SyncOutput {
                stored: records.len(),
                records: &records,
            },
            format,
        );
    }

    if !quiet {
        if records.is_empty() {
            println!("{}", "Archive is up to date".green());
        } else {
            println!(
                "{} Archived {} new item(s) for @{}",
                "✓".green(),
                format_number(to_i64(records.len())).cyan(),
                archive.config().account.handle
            );
        }
    }
    Ok(())
}

fn cmd_reconcile(config: Config, format: OutputFormat) -> Result<()> {
    let quiet = config.output.quiet;
    let mut archive = open_archive(config, true)?;

    let pb = spinner(format, quiet, "Checking archived items upstream...");
    let result = archive.reconcile();
    pb.finish_and_clear();
    let report = result?;

    if format.is_json() {
        return print_json(&report, format);
    }

    if !quiet {
        println!("{}", "Reconciliation".bold().cyan());
        println!("{}", "─".repeat(40));
        println!("  {:<20} {:>10}", "Checked:", format_number(to_i64(report.checked)));
        println!("  {:<20} {:>10}", "Refreshed:", format_number(to_i64(report.refreshed)));
        println!("  {:<20} {:>10}", "Marked deleted:", format_number(to_i64(report.deleted)));
        println!("  {:<20} {:>10}", "Dropped:", format_number(to_i64(report.dropped)));
        println!("  {:<20} {:>10}", "Lookups:", format_number(to_i64(report.lookups)));
    }
    Ok(())
}

fn cmd_search(config: Config, format: OutputFormat, args: &cli::SearchArgs) -> Result<()> {
    let order: SortKey = args.order.parse().map_err(|_| {
        anyhow::anyhow!(format_unknown_value_error(
            "order field",
            args.order.trim_start_matches(['-', '+']),
            VALID_ORDER_FIELDS
        ))
    })?;

    let archive = open_archive(config, false)?;
    let records = archive.search(&args.query, order, args.page)?;

    if format == OutputFormat::Text && !records.is_empty() {
        println!(
            "{} results for \"{}\" (page {}, {}):\n",
            records.len().to_string().cyan(),
            args.query.bold(),
            args.page.max(1),
            order
        );
    }
    print_records(&records, format, args.page)
}

fn cmd_list(config: Config, format: OutputFormat, args: &cli::ListArgs) -> Result<()> {
    let kind: ListKind = args.kind.parse().map_err(|_| {
        anyhow::anyhow!(format_unknown_value_error(
            "list kind",
            &args.kind,
            VALID_LIST_KINDS
        ))
    })?;

    let archive = open_archive(config, false)?;
    let records = archive.list(kind, args.page)?;
    print_records(&records, format, args.page)
}

fn print_records(records: &[Record], format: OutputFormat, page: usize) -> Result<()> {
    match format {
        OutputFormat::Json | OutputFormat::JsonPretty => print_json(records, format),
        OutputFormat::Compact => {
            for r in records {
                println!(
                    "{}\t{}\t{}\t{}",
                    r.id_str,
                    r.favorites,
                    r.retweets,
                    truncate(&r.text.replace('\n', " "), 100)
                );
            }
            Ok(())
        }
        OutputFormat::Text => {
            if records.is_empty() {
                println!("{}", "No results found.".yellow());
                return Ok(());
            }
            let first = ranking::page_offset(page);
            for (i, r) in records.iter().enumerate() {
                print_record(first + i + 1, r);
            }
            Ok(())
        }
    }
}

fn print_record(num: usize, record: &Record) {
    let mut header = format!(
        "{}. {} {} {}",
        num.to_string().dimmed(),
        record.id_str.dimmed(),
        format!("♥ {}", format_number(record.favorites)).red(),
        format!("⟲ {}", format_number(record.retweets)).green()
    );
    if record.deleted {
        header.push_str(&format!(" {}", "DELETED".on_red()));
    }
    println!("{header}");

    for line in textwrap::wrap(&record.text, 78) {
        println!("   {line}");
    }

    if record.created.timestamp() > 0 {
        println!(
            "   {}",
            record.created.format("%Y-%m-%d %H:%M").to_string().dimmed()
        );
    }
    println!();
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len.saturating_sub(3);
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn cmd_show(config: Config, format: OutputFormat, args: &cli::ShowArgs) -> Result<()> {
    let archive = open_archive(config, false)?;
    let record = archive.record(args.id)?;

    if format.is_json() {
        return print_json(&record, format);
    }

    println!("{}", "─".repeat(CONTENT_DIVIDER_WIDTH));
    println!("{}", record.text);
    println!("{}", "─".repeat(CONTENT_DIVIDER_WIDTH));
    println!("  {:<12} {}", "ID:".dimmed(), record.id_str);
    println!("  {:<12} {}", "URL:".dimmed(), record.url);
    println!(
        "  {:<12} {}",
        "Created:".dimmed(),
        record.created.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "  {:<12} {}",
        "Checked:".dimmed(),
        format_relative_date(record.updated)
    );
    println!(
        "  {:<12} {} favorites, {} reposts (ratio {:.3})",
        "Engagement:".dimmed(),
        format_number(record.favorites),
        format_number(record.retweets),
        record.ratio
    );
    if record.deleted {
        println!("  {:<12} {}", "Status:".dimmed(), "deleted upstream".red());
    }
    for media in &record.media {
        println!(
            "  {:<12} {} {}",
            "Media:".dimmed(),
            media.media_type,
            media.media_url
        );
    }
    Ok(())
}

fn cmd_profile(config: Config, format: OutputFormat, args: &cli::ProfileArgs) -> Result<()> {
    let quiet = config.output.quiet;
    let mut archive = open_archive(config, true)?;

    let pb = spinner(format, quiet || !args.refresh, "Fetching profile...");
    let result = if args.refresh {
        archive.refresh_profile()
    } else {
        archive.profile()
    };
    pb.finish_and_clear();
    let profile = result?;

    if format.is_json() {
        return print_json(&profile, format);
    }

    let verified = if profile.verified { " ✓" } else { "" };
    println!(
        "{} {}{}",
        profile.name.bold(),
        format!("@{}", profile.handle).dimmed(),
        verified.cyan()
    );
    if !profile.description.is_empty() {
        for line in textwrap::wrap(&profile.description, 78) {
            println!("   {line}");
        }
    }
    println!("{}", "─".repeat(40));
    println!("  {:<20} {:>10}", "Followers:", format_number(profile.followers));
    println!("  {:<20} {:>10}", "Following:", format_number(profile.following));
    println!("  {:<20} {:>10}", "Items:", format_number(profile.item_count));
    println!("{}", "─".repeat(40));
    if !profile.location.is_empty() {
        println!("  Location: {}", profile.location);
    }
    if !profile.link.is_empty() {
        println!("  Link:     {}", profile.link.cyan());
    }
    println!("  Profile:  {}", profile.url);
    println!(
        "  Updated:  {}",
        format_relative_date(profile.updated).dimmed()
    );
    Ok(())
}

fn cmd_toggle_delete(config: Config, format: OutputFormat, args: &cli::ShowArgs) -> Result<()> {
    let mut archive = open_archive(config, false)?;
    let deleted = archive.toggle_deleted(args.id)?;

    if format.is_json() {
        #[derive(Serialize)]
        struct ToggleOutput {
            id: i64,
            deleted: bool,
        }
        return print_json(&ToggleOutput { id: args.id, deleted }, format);
    }

    if deleted {
        println!("{} Record {} marked deleted", "✓".green(), args.id);
    } else {
        println!("{} Record {} restored", "✓".green(), args.id);
    }
    Ok(())
}

fn cmd_import(config: Config, format: OutputFormat, args: &cli::ImportArgs) -> Result<()> {
    if !args.path.exists() {
        anyhow::bail!("Export path does not exist: {}", args.path.display());
    }

    let quiet = config.output.quiet;
    let mut archive = open_archive(config, true)?;

    let pb = spinner(format, quiet, "Importing export...");
    let result = archive.import(&args.path, args.offline);
    pb.finish_and_clear();
    let report = result?;

    if format.is_json() {
        return print_json(&report, format);
    }

    if !quiet {
        println!(
            "{} Imported {} of {} item(s) ({} skipped)",
            "✓".green(),
            format_number(to_i64(report.stored)).cyan(),
            format_number(to_i64(report.parsed)),
            format_number(to_i64(report.skipped))
        );
        if report.existing > 0 {
            println!(
                "  {} item(s) already archived, left unchanged",
                format_number(to_i64(report.existing))
            );
        }
        if args.offline {
            println!(
                "  {}",
                "Run 'tweetkeep reconcile' to verify the imported items upstream.".dimmed()
            );
        }
    }
    Ok(())
}

fn cmd_stats(config: Config, format: OutputFormat) -> Result<()> {
    let archive = open_archive(config, false)?;
    let stats = archive.stats()?;

    if format.is_json() {
        return print_json(&stats, format);
    }

    println!("{}", "Archive Statistics".bold().cyan());
    println!("{}", "─".repeat(40));
    println!("  {:<20} {:>10}", "Records:", format_number(stats.records_count));
    println!("  {:<20} {:>10}", "Active:", format_number(stats.active_count));
    println!("  {:<20} {:>10}", "Deleted:", format_number(stats.deleted_count));
    println!("{}", "─".repeat(40));

    if let (Some(first), Some(last)) = (stats.first_created, stats.last_created) {
        println!("  First item:  {}", first.format("%Y-%m-%d").to_string().green());
        println!("  Last item:   {}", last.format("%Y-%m-%d").to_string().green());
    }
    println!("  Profile:     {}", format_optional_date(stats.profile_updated));
    Ok(())
}

fn cmd_config(cli: &Cli, config: &Config, args: &cli::ConfigArgs) -> Result<()> {
    if let Some(assignment) = &args.set {
        let (key, value) = assignment
            .split_once('=')
            .context("expected key=value, e.g. account.handle=jack")?;
        let key = key.trim();
        if !VALID_CONFIG_KEYS.contains(&key) {
            anyhow::bail!(format_unknown_value_error("config key", key, VALID_CONFIG_KEYS));
        }

        let path = cli
            .config
            .clone()
            .or_else(Config::user_config_path)
            .context("could not determine the config directory")?;
        let mut file_config = Config::load_from_file(&path).unwrap_or_default();
        file_config.set_value(key, value.trim())?;
        file_config.save_to(&path)?;

        if !config.output.quiet {
            println!("{} Set {} in {}", "✓".green(), key.bold(), path.display());
        }
        return Ok(());
    }

    let rendered = toml::to_string_pretty(&config.redacted())?;
    if args.show {
        println!("{rendered}");
    } else {
        println!("{}", "Effective configuration".bold().cyan());
        println!("{}", "─".repeat(40));
        println!("{rendered}");
        println!("  Database: {}", config.db_path().display());
        if let Some(path) = cli.config.clone().or_else(Config::user_config_path) {
            println!("  Config:   {}", path.display());
        }
    }
    Ok(())
}

fn cmd_completions(args: &cli::CompletionsArgs) {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "tweetkeep", &mut io::stdout());
}
