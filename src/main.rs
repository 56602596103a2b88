use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use dlsys::sinks::{Md5CheckedSink, Outcome, PathSink, ProgressSink};
use dlsys::{DownloadConfig, DownloadHandler, DownloadSystem, ProxyAddr};

#[derive(Parser)]
#[command(name = "dlsys")]
#[command(about = "Concurrent, segmented HTTP downloader")]
#[command(version)]
struct Cli {
    #[arg(required = true, help = "URLs to download")]
    urls: Vec<String>,
    #[arg(short, long, default_value = ".", help = "Output directory")]
    output: PathBuf,
    #[arg(long, help = "Expected MD5 digest, one per URL in order")]
    md5: Vec<String>,
    #[arg(short, long, help = "JSON file with download defaults")]
    config: Option<PathBuf>,
    #[arg(long, help = "HTTP proxy as host:port")]
    proxy: Option<ProxyAddr>,
    #[arg(short, long, help = "Buffer and segment size in bytes")]
    buffer_size: Option<usize>,
    #[arg(long, help = "Never split downloads into ranges")]
    contiguous: bool,
    #[arg(long, help = "Max concurrent fetches per download")]
    max_fetches: Option<usize>,
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(cli: &Cli) -> Result<DownloadConfig, Box<dyn std::error::Error + Send + Sync>> {
    let mut config = match &cli.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => DownloadConfig::default(),
    };
    if cli.proxy.is_some() {
        config.proxy = cli.proxy.clone();
    }
    if let Some(buffer_size) = cli.buffer_size {
        config.buffer_size = buffer_size;
    }
    if cli.contiguous {
        config.force_contiguous = true;
    }
    if cli.max_fetches.is_some() {
        config.max_concurrent_fetches = cli.max_fetches;
    }
    Ok(config)
}

fn file_name(url: &str, index: usize) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("download-{}", index))
}

struct Job {
    name: String,
    progress: Arc<ProgressSink>,
    checked: Option<Arc<Md5CheckedSink>>,
}

fn queue(
    system: &DownloadSystem,
    output: &Path,
    index: usize,
    url: &str,
    md5: Option<&String>,
) -> Job {
    let name = file_name(url, index);
    let path = output.join(&name);

    let checked = md5.map(|md5| Arc::new(Md5CheckedSink::new(PathSink::new(&path), md5.as_str())));
    let inner: Arc<dyn DownloadHandler> = match &checked {
        Some(checked) => checked.clone(),
        None => Arc::new(PathSink::new(path)),
    };
    let progress = Arc::new(ProgressSink::new(name.clone(), inner));
    system.add_download(url, progress.clone());

    Job {
        name,
        progress,
        checked,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    dlsys::logging::init(cli.verbose)?;

    if !cli.md5.is_empty() && cli.md5.len() != cli.urls.len() {
        return Err("--md5 must be given once per URL".into());
    }
    std::fs::create_dir_all(&cli.output)?;

    let system = DownloadSystem::with_config(load_config(&cli)?)?;
    let jobs = cli
        .urls
        .iter()
        .enumerate()
        .map(|(i, url)| queue(&system, &cli.output, i, url, cli.md5.get(i)))
        .collect::<Vec<_>>();

    system.drain();

    let mut failures = 0;
    for job in &jobs {
        match job.progress.outcome() {
            Some(Outcome::Completed) => {
                if job.checked.as_ref().and_then(|c| c.verdict()) == Some(false) {
                    error!(name = %job.name, "checksum mismatch");
                    failures += 1;
                }
            }
            Some(Outcome::Failed(reason)) => {
                error!(name = %job.name, reason = %reason, "download failed");
                failures += 1;
            }
            None => {
                error!(name = %job.name, "download did not finish");
                failures += 1;
            }
        }
    }

    info!(total = jobs.len(), failures, "all downloads finished");
    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
