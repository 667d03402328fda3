use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use trovu_core::env::{Resolution, Resolver};
use trovu_core::fetch::HttpFetcher;
use trovu_core::namespaces::NamespaceKind;
use trovu_core::settings::{Settings, load_settings};
use trovu_core::shortcuts::{ShortcutKey, find_reachable};

#[derive(Debug, Parser)]
#[command(
    name = "trovu",
    version,
    about = "Resolve keyword-shortcut namespaces into a merged lookup table"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Settings TOML file")]
    settings: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "LOCALE",
        help = "Override the detected system locale (e.g. de-CH)"
    )]
    locale: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Populate the environment and print it")]
    Env(EnvArgs),
    #[command(about = "Print the merged shortcut table")]
    Shortcuts(ShortcutsArgs),
    #[command(about = "Look up the reachable definition for a keyword")]
    Lookup(LookupArgs),
}

#[derive(Debug, Args)]
struct EnvArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(long, help = "Print the environment as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct ShortcutsArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(long, value_name = "KEYWORD", help = "Only show this keyword")]
    keyword: Option<String>,
    #[arg(long, help = "Include unreachable (shadowed) definitions")]
    all: bool,
}

#[derive(Debug, Args)]
struct LookupArgs {
    #[command(flatten)]
    common: CommonArgs,
    keyword: String,
    argument_count: u32,
}

#[derive(Debug, Args)]
struct CommonArgs {
    #[arg(
        long,
        default_value = "",
        value_name = "FRAGMENT",
        help = "URL fragment carrying the environment parameters"
    )]
    fragment: String,
    #[arg(long, help = "Bypass HTTP caches when fetching shortcut files")]
    reload: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let settings = resolve_settings(cli.settings.as_deref())?;

    match cli.command {
        Commands::Env(args) => run_env(&settings, cli.locale, args),
        Commands::Shortcuts(args) => run_shortcuts(&settings, cli.locale, args),
        Commands::Lookup(args) => run_lookup(&settings, cli.locale, args),
    }
}

fn resolve_settings(path: Option<&std::path::Path>) -> Result<Settings> {
    match path {
        Some(path) => load_settings(path),
        None => Ok(Settings::default()),
    }
}

fn resolve(settings: &Settings, locale: Option<String>, common: &CommonArgs) -> Result<Resolution> {
    let fetcher = HttpFetcher::from_settings(settings)?;
    let mut resolver = Resolver::new(&fetcher, settings);
    if locale.is_some() {
        resolver = resolver.with_locale(locale);
    }
    resolver.resolve_fragment(&common.fragment, common.reload)
}

fn run_env(settings: &Settings, locale: Option<String>, args: EnvArgs) -> Result<()> {
    let resolution = resolve(settings, locale, &args.common)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&resolution.env)?);
        return Ok(());
    }

    let env = &resolution.env;
    println!("environment");
    println!("language: {}", env.language);
    println!("country: {}", env.country);
    println!("github: {}", env.github.as_deref().unwrap_or("<none>"));
    println!("debug: {}", env.debug);
    println!("query: {}", env.query.as_deref().unwrap_or("<none>"));
    println!(
        "default_keyword: {}",
        env.default_keyword.as_deref().unwrap_or("<none>")
    );
    println!("status: {}", env.status.as_deref().unwrap_or("<none>"));
    println!("fragment: {}", env.param_str());
    println!("namespaces.count: {}", env.namespaces.len());
    for namespace in &env.namespaces {
        println!(
            "namespace: {} ({}) {} shortcuts",
            namespace.name,
            format_kind(namespace.kind),
            namespace.shortcuts.len()
        );
    }
    print_diagnostics(&resolution);
    Ok(())
}

fn run_shortcuts(settings: &Settings, locale: Option<String>, args: ShortcutsArgs) -> Result<()> {
    let resolution = resolve(settings, locale, &args.common)?;

    let mut printed = 0usize;
    for namespace in &resolution.env.namespaces {
        for shortcut in namespace.shortcuts.values() {
            if !args.all && !shortcut.reachable {
                continue;
            }
            if let Some(keyword) = &args.keyword {
                if &shortcut.keyword != keyword {
                    continue;
                }
            }
            println!(
                "{} {}  namespace={} reachable={} url={}",
                shortcut.keyword,
                format_count(shortcut.argument_count),
                shortcut.namespace,
                shortcut.reachable,
                shortcut.url
            );
            printed += 1;
        }
    }
    println!("shortcuts.count: {printed}");
    print_diagnostics(&resolution);
    Ok(())
}

fn run_lookup(settings: &Settings, locale: Option<String>, args: LookupArgs) -> Result<()> {
    let resolution = resolve(settings, locale, &args.common)?;
    let key = ShortcutKey {
        keyword: args.keyword,
        argument_count: args.argument_count,
    };

    let Some(shortcut) = find_reachable(&resolution.env.namespaces, &key) else {
        print_diagnostics(&resolution);
        bail!("no reachable shortcut for '{}'", key.raw());
    };

    println!("keyword: {}", shortcut.keyword);
    println!("argument_count: {}", format_count(shortcut.argument_count));
    println!("namespace: {}", shortcut.namespace);
    if !shortcut.title.is_empty() {
        println!("title: {}", shortcut.title);
    }
    println!("url: {}", shortcut.url);
    if shortcut.arguments.is_empty() {
        println!("arguments: <none>");
    } else {
        for argument in &shortcut.arguments {
            println!("argument: {argument}");
        }
    }
    print_diagnostics(&resolution);
    Ok(())
}

fn format_kind(kind: NamespaceKind) -> &'static str {
    match kind {
        NamespaceKind::Site => "site",
        NamespaceKind::User => "user",
    }
}

fn format_count(count: Option<u32>) -> String {
    count
        .map(|count| count.to_string())
        .unwrap_or_else(|| "?".to_string())
}

fn print_diagnostics(resolution: &Resolution) {
    if resolution.diagnostics.is_empty() {
        return;
    }
    println!("diagnostics:");
    for diagnostic in &resolution.diagnostics {
        println!("  - {diagnostic}");
    }
}
